//! # Rich Text
//!
//! Post text carries its formatting out of band, as [`Facet`]s over UTF-8 byte ranges. On top
//! of the natively detected mentions, links and tags (see [`native`]), an edit may use markdown
//! links:
//!
//! ```text
//! see [the docs](https://example.com/docs)
//! ```
//!
//! which compile to the text `see the docs` with a link facet spanning `the docs`. Every range
//! refers to the final text, after all markdown has been stripped.
#[cfg(test)]
mod tests;

pub mod native;

use lazy_static::lazy_static;
use regex::Regex;

use crate::lexicon::{link_facet, Facet};
use crate::pds::Pds;
use crate::Error;

lazy_static! {
    static ref MARKDOWN_LINK: Regex = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap();
}

/// Text with its facets, ready to be written to a record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichText {
    pub text: String,
    pub facets: Vec<Facet>,
}

/// Rewrites every `[title](url)` to its bare title, returning the clean text and a link facet
/// per rewritten span. Unbalanced brackets are left verbatim.
pub fn strip_markdown(input: &str) -> RichText {
    let mut text = String::with_capacity(input.len());
    let mut facets = Vec::new();
    let mut last = 0;

    for caps in MARKDOWN_LINK.captures_iter(input) {
        let (Some(whole), Some(title), Some(url)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        text.push_str(&input[last..whole.start()]);
        let start = text.len();
        text.push_str(title.as_str());
        facets.push(link_facet(start, text.len(), url.as_str()));
        last = whole.end();
    }
    text.push_str(&input[last..]);

    RichText { text, facets }
}

/// Compiles edited text into its final form: markdown links are stripped, native facets are
/// detected on the result, and everything is ordered by starting offset.
///
/// A mention whose handle does not resolve fails the whole compilation.
#[tracing::instrument(skip_all, fields(len = input.len()))]
pub async fn compile<P>(input: &str, pds: &P) -> Result<RichText, Error>
where
    P: Pds + ?Sized,
{
    let RichText { text, facets: links } = strip_markdown(input);

    let mut facets = pds
        .detect_facets(&text)
        .await
        .map_err(Error::FacetDetection)?;
    tracing::debug!(
        native = facets.len(),
        markdown = links.len(),
        "Detected facets"
    );
    facets.extend(links);
    // stable, so a native facet stays ahead of a markdown one at the same offset
    facets.sort_by_key(|f| f.index.byte_start);

    Ok(RichText { text, facets })
}
