//! # Post References
//!
//! A post can be named two ways:
//! ```text
//! https://<host>/.../<owner>/post/<rkey>[?query][#fragment]
//! at://<authority>/app.bsky.feed.post/<rkey>
//! ```
//!
//! The owner or authority is either a DID (`did:...`), usable as is, or a handle which must be
//! resolved to a DID before the post can be read or written. Parsing yields a [`Locator`];
//! [`resolve`] turns that into the [`Canonical`] form the PDS accepts.
//!
//! ## Examples
//! * `https://bsky.app/profile/alice.bsky.social/post/3kabc` needs a handle lookup
//! * `https://bsky.app/profile/did:plc:xyz/post/3kabc` does not
//! * `at://did:plc:xyz/app.bsky.feed.post/3kabc`

use std::fmt;
use std::str::FromStr;

use atrium_api::types::string::{AtIdentifier, Did, Handle, Nsid, RecordKey};
use nom::{
    bytes::complete::{tag, take_till, take_till1},
    character::complete::char,
    sequence::tuple,
    IResult,
};
use thiserror::Error;
use url::Url;

use crate::lexicon::{POST_COLLECTION, POST_NSID};
use crate::pds::Pds;
use crate::Error;

const AT_SCHEME: &str = "at://";
const POST_SEGMENT: &str = "post";

/// A parsed, but not yet resolved, reference to a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A web permalink, e.g. from a browser address bar.
    WebPermalink { owner: AtIdentifier, rkey: RecordKey },
    /// A native `at://` URI.
    Native {
        authority: AtIdentifier,
        collection: Nsid,
        rkey: RecordKey,
    },
}

/// Who a [`Locator`] says owns the post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner<'a> {
    Did(&'a Did),
    Handle(&'a Handle),
}

/// The fully resolved address of a post: repository DID, collection and record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Canonical {
    repo: Did,
    collection: Nsid,
    rkey: RecordKey,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReferenceError {
    /// The input names no post, or names one without an owner or record key.
    #[error("Malformed post reference `{input}`: {reason}")]
    Malformed { input: String, reason: &'static str },
}

fn malformed(input: &str, reason: &'static str) -> ReferenceError {
    ReferenceError::Malformed {
        input: input.to_owned(),
        reason,
    }
}

fn owner(input: &str, token: &str) -> Result<AtIdentifier, ReferenceError> {
    token
        .parse()
        .map_err(|_| malformed(input, "the owner is neither a DID nor a handle"))
}

fn rkey(input: &str, token: &str) -> Result<RecordKey, ReferenceError> {
    token
        .parse()
        .map_err(|_| malformed(input, "not a valid record key"))
}

impl Locator {
    /// The owner, classified by whether it still needs resolving.
    pub fn owner(&self) -> Owner<'_> {
        let id = match self {
            Locator::WebPermalink { owner, .. } => owner,
            Locator::Native { authority, .. } => authority,
        };
        match id {
            AtIdentifier::Did(did) => Owner::Did(did),
            AtIdentifier::Handle(handle) => Owner::Handle(handle),
        }
    }

    pub fn rkey(&self) -> &RecordKey {
        match self {
            Locator::WebPermalink { rkey, .. } | Locator::Native { rkey, .. } => rkey,
        }
    }
}

fn permalink(input: &str) -> Result<Locator, ReferenceError> {
    let url = Url::parse(input).map_err(|_| malformed(input, "not a valid URL"))?;
    let segments: Vec<&str> = url.path_segments().map(Iterator::collect).unwrap_or_default();

    let post = segments
        .iter()
        .position(|s| *s == POST_SEGMENT)
        .ok_or_else(|| malformed(input, "no `post` segment"))?;

    let token = post
        .checked_sub(1)
        .and_then(|i| segments.get(i))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed(input, "no owner before `post`"))?;
    // the url parser has already split off any query or fragment
    let key = segments
        .get(post + 1)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed(input, "no record key after `post`"))?;

    Ok(Locator::WebPermalink {
        owner: owner(input, token)?,
        rkey: rkey(input, key)?,
    })
}

fn segment(input: &str) -> IResult<&str, &str> {
    take_till1(|c| c == '/' || c == '?' || c == '#')(input)
}

fn record_key(input: &str) -> IResult<&str, &str> {
    take_till(|c| c == '/' || c == '?' || c == '#')(input)
}

fn at_uri(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (rest, (_, authority, _, collection, _)) =
        tuple((tag(AT_SCHEME), segment, char('/'), segment, char('/')))(input)?;
    let (rest, key) = record_key(rest)?;
    Ok((rest, (authority, collection, key)))
}

fn native(input: &str) -> Result<Locator, ReferenceError> {
    let (_, (authority, collection, key)) = at_uri(input)
        .map_err(|_| malformed(input, "expected at://<authority>/<collection>/<rkey>"))?;

    if key.is_empty() {
        return Err(malformed(input, "empty record key"));
    }
    if collection != POST_COLLECTION {
        return Err(malformed(input, "not in the app.bsky.feed.post collection"));
    }

    Ok(Locator::Native {
        authority: owner(input, authority)?,
        collection: POST_NSID.clone(),
        rkey: rkey(input, key)?,
    })
}

impl FromStr for Locator {
    type Err = ReferenceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let locator = if s.starts_with(AT_SCHEME) {
            native(s)
        } else if s.starts_with("http://") || s.starts_with("https://") {
            permalink(s)
        } else {
            Err(malformed(s, "not a permalink or at:// URI"))
        }?;

        tracing::trace!(owner = ?locator.owner(), rkey = locator.rkey().as_str(), "{}", s);
        Ok(locator)
    }
}

impl<'a> TryFrom<&'a str> for Locator {
    type Error = ReferenceError;
    fn try_from(s: &'a str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::WebPermalink { owner, rkey } => write!(
                f,
                "https://bsky.app/profile/{}/post/{}",
                owner.as_ref(),
                rkey.as_str()
            ),
            Locator::Native {
                authority,
                collection,
                rkey,
            } => write!(
                f,
                "{AT_SCHEME}{}/{}/{}",
                authority.as_ref(),
                collection.as_str(),
                rkey.as_str()
            ),
        }
    }
}

impl Canonical {
    pub fn new(repo: Did, rkey: RecordKey) -> Self {
        Canonical {
            repo,
            collection: POST_NSID.clone(),
            rkey,
        }
    }

    #[must_use]
    /// The DID of the repository holding the post.
    pub fn repo(&self) -> &Did {
        &self.repo
    }

    #[must_use]
    pub fn collection(&self) -> &Nsid {
        &self.collection
    }

    #[must_use]
    pub fn rkey(&self) -> &RecordKey {
        &self.rkey
    }
}

impl From<&Canonical> for Locator {
    fn from(at: &Canonical) -> Self {
        Locator::Native {
            authority: at.repo.clone().into(),
            collection: at.collection.clone(),
            rkey: at.rkey.clone(),
        }
    }
}

impl fmt::Display for Canonical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{AT_SCHEME}{}/{}/{}",
            self.repo.as_str(),
            self.collection.as_str(),
            self.rkey.as_str()
        )
    }
}

/// Resolves a locator to its canonical form, looking up the owner's DID when it is a handle.
///
/// A failed lookup aborts with [`Error::ResolutionFailed`]; there is no fallback.
#[tracing::instrument(skip(pds), fields(%locator), err)]
pub async fn resolve<P>(locator: &Locator, pds: &P) -> Result<Canonical, Error>
where
    P: Pds + ?Sized,
{
    let repo = match locator.owner() {
        Owner::Did(did) => did.clone(),
        Owner::Handle(handle) => {
            let did = pds
                .resolve_handle(handle)
                .await
                .map_err(|source| Error::resolution(handle, source))?;
            tracing::debug!(handle = handle.as_str(), did = did.as_str(), "Resolved handle");
            did
        }
    };
    Ok(Canonical::new(repo, locator.rkey().clone()))
}
