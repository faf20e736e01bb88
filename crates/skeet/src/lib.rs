//! # Skeet
//!
//! In-place editing of published Bluesky posts.
//!
//! A post cannot be updated on the protocol level, so an edit is carried out as a swap: the
//! record is deleted and recreated under the very same record key in one atomic `applyWrites`
//! batch, leaving its URI and permalink intact. The pipeline runs:
//!
//! 1. [`reference`] parses a permalink or `at://` URI and resolves the owner to a DID
//! 2. the current record is fetched through the [`Pds`] seam
//! 3. [`richtext`] compiles the new text, including `[title](url)` markdown links, into facets
//! 4. [`embed`] reconciles the attachments, with [`blob`] uploading any new images
//! 5. [`swap`] rebuilds the record and commits the batch
//!
//! [`Editor`] ties the steps together.
pub mod blob;
pub mod editor;
pub mod embed;
mod error;
pub mod lexicon;
pub mod pds;
pub mod reference;
pub mod richtext;
pub mod swap;

pub use editor::{Editor, Post};
pub use error::Error;
pub use pds::{Pds, XrpcClient};
pub use reference::{Canonical, Locator};
