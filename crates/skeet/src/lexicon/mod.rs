//! # Lexicon Types
//!
//! The record and view shapes exchanged with the PDS come from `atrium-api`, generated from the
//! `app.bsky` and `com.atproto` lexicons. This module re-exports the ones an edit touches and
//! adds the few conversions needed on top of them.
//!
//! The repository API carries records as open [`Unknown`] values. [`post_from_unknown`] and
//! [`post_into_unknown`] move a post in and out of that form. Fields this tool does not edit
//! (`langs`, `reply`, `labels`, ...) live on the typed record, and anything newer than the
//! generated types lands in its `extra_data`, so both survive a swap untouched.
pub use atrium_api::app::bsky::actor::defs::ProfileViewBasic as Author;
pub use atrium_api::app::bsky::embed::{defs, external, images, record, record_with_media};
pub use atrium_api::app::bsky::feed::defs::{PostView, PostViewEmbedRefs};
pub use atrium_api::app::bsky::feed::post::{
    Record as PostRecord, RecordData as PostRecordData, RecordEmbedRefs,
};
pub use atrium_api::app::bsky::richtext::facet::{self, Main as Facet};
pub use atrium_api::com::atproto::repo::strong_ref::Main as StrongRef;
pub use atrium_api::types::{BlobRef, Union, Unknown};

use atrium_api::record::KnownRecord;
use atrium_api::types::string::Nsid;
use atrium_api::types::{TryIntoUnknown, TypedBlobRef};
use lazy_static::lazy_static;
use thiserror::Error;

/// The collection every post lives in.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

lazy_static! {
    pub static ref POST_NSID: Nsid = POST_COLLECTION.parse().unwrap();
}

#[derive(Error, Debug)]
pub enum LexiconError {
    /// The record decoded, but as some other record type.
    #[error("The record is not an {POST_COLLECTION} record")]
    NotAPost,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// A value outside the AT Protocol data model, such as a float.
    #[error(transparent)]
    Data(#[from] atrium_api::error::Error),
}

/// Reads a post out of an open record value.
pub fn post_from_unknown(value: &Unknown) -> Result<PostRecord, LexiconError> {
    match serde_json::from_value(serde_json::to_value(value)?)? {
        KnownRecord::AppBskyFeedPost(post) => Ok(*post),
        _ => Err(LexiconError::NotAPost),
    }
}

/// Turns a post into the open value `applyWrites` expects, `$type` included.
pub fn post_into_unknown(post: PostRecord) -> Result<Unknown, LexiconError> {
    Ok(KnownRecord::from(post).try_into_unknown()?)
}

/// A facet linking `[byte_start, byte_end)` of the text to `uri`.
pub fn link_facet(byte_start: usize, byte_end: usize, uri: impl Into<String>) -> Facet {
    facet::MainData {
        features: vec![Union::Refs(facet::MainFeaturesItem::Link(Box::new(
            facet::LinkData { uri: uri.into() }.into(),
        )))],
        index: facet::ByteSliceData {
            byte_end,
            byte_start,
        }
        .into(),
    }
    .into()
}

/// The CID of a blob, whichever of the two blob ref forms it is in.
pub fn blob_cid(blob: &BlobRef) -> String {
    match blob {
        BlobRef::Typed(TypedBlobRef::Blob(blob)) => blob.r#ref.0.to_string(),
        BlobRef::Untyped(legacy) => legacy.cid.clone(),
    }
}
