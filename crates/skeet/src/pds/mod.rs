//! # PDS Seam
//!
//! Every network interaction of an edit goes through the [`Pds`] trait: handle resolution,
//! reading the record and its hydrated view, uploading blobs, detecting facets and committing
//! the swap. The production implementation is [`XrpcClient`], an `atrium-api` agent over
//! `reqwest`; tests use an in-memory double.
mod xrpc;

pub use atrium_api::com::atproto::repo::get_record::Output as RecordOutput;
pub use xrpc::XrpcClient;

use std::fmt::{Debug, Display};

use async_trait::async_trait;
use atrium_api::types::string::{Did, Handle};
use atrium_api::xrpc::error::XrpcErrorKind;
use bsky_sdk::error::GenericXrpcError;
use config::Credentials;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lexicon::{BlobRef, Facet, LexiconError, PostView};
use crate::reference::Canonical;
use crate::swap::Batch;

/// The outbound operations an edit needs from the user's PDS.
#[async_trait]
pub trait Pds: Send + Sync {
    /// Signs in, keeping the session for subsequent calls.
    async fn create_session(&self, credentials: &Credentials) -> Result<Session, XrpcError>;
    /// Looks up the DID currently bound to `handle`.
    async fn resolve_handle(&self, handle: &Handle) -> Result<Did, XrpcError>;
    /// Reads the stored post record.
    async fn get_record(&self, at: &Canonical) -> Result<RecordOutput, XrpcError>;
    /// Reads the hydrated view of a post, `None` if the AppView does not know it.
    async fn get_post_view(&self, at: &Canonical) -> Result<Option<PostView>, XrpcError>;
    /// Commits a write batch atomically, in exactly one request.
    async fn apply_writes(&self, batch: &Batch) -> Result<(), XrpcError>;
    /// Uploads raw bytes, returning the blob ref to embed in a record.
    async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, XrpcError>;
    /// Finds the mentions, links and tags in `text`, resolving every mention to a DID.
    async fn detect_facets(&self, text: &str) -> Result<Vec<Facet>, XrpcError>;
    /// The DID of the signed in account, if any.
    async fn session_did(&self) -> Option<Did>;
}

/// The account a session was opened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub did: Did,
    pub handle: Handle,
}

#[derive(Error, Debug)]
pub enum XrpcError {
    /// The request needs a valid session and has none.
    #[error("Authentication required")]
    AuthRequired,
    /// The PDS reports the record, handle or endpoint as missing.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Any other error body returned by the PDS.
    #[error("{error} (HTTP {status}){}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Api {
        status: u16,
        error: String,
        message: Option<String>,
    },
    /// The request never got an answer, e.g. a dropped connection.
    #[error("Transport failure: {0}")]
    Transport(String),
    /// A request or response that does not fit its lexicon.
    #[error("Malformed exchange: {0}")]
    Malformed(String),
    /// A transparent wrapper for a [`reqwest::Error`]
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// A transparent wrapper for a [`url::ParseError`]
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Lexicon(#[from] LexiconError),
}

/// The `{error, message}` body XRPC uses for failures.
#[derive(Serialize, Deserialize, Debug, Default)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl XrpcError {
    pub(crate) fn from_body(status: u16, body: ErrorBody) -> Self {
        let ErrorBody { error, message } = body;
        match error.as_deref() {
            Some("AuthRequired" | "ExpiredToken" | "InvalidToken") => XrpcError::AuthRequired,
            _ if status == 401 => XrpcError::AuthRequired,
            Some("RecordNotFound" | "NotFound" | "HandleNotFound") => {
                XrpcError::NotFound(message.unwrap_or_else(|| "record not found".into()))
            }
            _ => XrpcError::Api {
                status,
                error: error.unwrap_or_else(|| "UnknownError".into()),
                message,
            },
        }
    }

    /// Whether the failure happened below the protocol, e.g. a dropped connection.
    pub fn is_transport(&self) -> bool {
        matches!(self, XrpcError::Http(_) | XrpcError::Transport(_))
    }
}

impl<E> From<atrium_api::xrpc::Error<E>> for XrpcError
where
    E: Debug + Display + Serialize,
{
    fn from(e: atrium_api::xrpc::Error<E>) -> Self {
        use atrium_api::xrpc::Error as Atrium;

        match e {
            Atrium::Authentication(_) => XrpcError::AuthRequired,
            Atrium::XrpcResponse(res) => {
                let body = match res.error {
                    Some(XrpcErrorKind::Undefined(body)) => ErrorBody {
                        error: body.error,
                        message: body.message,
                    },
                    // lexicon errors serialize as `{"error": .., "message": ..}`
                    Some(XrpcErrorKind::Custom(custom)) => serde_json::to_value(&custom)
                        .and_then(serde_json::from_value)
                        .unwrap_or_default(),
                    None => ErrorBody::default(),
                };
                XrpcError::from_body(res.status.as_u16(), body)
            }
            Atrium::HttpClient(e) => XrpcError::Transport(e.to_string()),
            Atrium::HttpRequest(e) => XrpcError::Transport(e.to_string()),
            e => XrpcError::Malformed(e.to_string()),
        }
    }
}

impl From<bsky_sdk::Error> for XrpcError {
    fn from(e: bsky_sdk::Error) -> Self {
        match e {
            bsky_sdk::Error::Xrpc(e) => match *e {
                // the SDK flattens the body into one `error: message` string
                GenericXrpcError::Response { status, error } => {
                    let (error, message) = match error.as_deref().map(|e| e.split_once(": ")) {
                        Some(Some((error, message))) => (Some(error.into()), Some(message.into())),
                        _ => (error, None),
                    };
                    XrpcError::from_body(status.as_u16(), ErrorBody { error, message })
                }
                GenericXrpcError::Other(reason) => XrpcError::Transport(reason),
            },
            e => XrpcError::Malformed(e.to_string()),
        }
    }
}
