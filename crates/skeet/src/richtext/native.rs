//! Detection of the facets the protocol recognizes in plain text: `@handle` mentions, links
//! (bare domains with a known public suffix included) and `#tags`.
//!
//! Detection is done by the Bluesky SDK, so edited posts get the same facets the official
//! clients would produce. Mentions are resolved to DIDs against the public AppView through
//! `client`; one unresolvable handle fails the detection.
use atrium_api::xrpc::XrpcClient;
use bsky_sdk::rich_text::RichText;

use crate::lexicon::Facet;
use crate::pds::XrpcError;

/// Detects every native facet in `text`, ordered mentions first, then links, then tags.
pub async fn detect<C>(text: &str, client: C) -> Result<Vec<Facet>, XrpcError>
where
    C: XrpcClient + Send + Sync,
{
    let mut rich = RichText::new(text, None);
    rich.detect_facets(client).await?;
    Ok(rich.facets.unwrap_or_default())
}
