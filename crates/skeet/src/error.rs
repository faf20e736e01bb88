use thiserror::Error;

use crate::embed::EmbedError;
use crate::lexicon::LexiconError;
use crate::pds::XrpcError;
use crate::reference::ReferenceError;

/// Everything that can abort an edit.
#[derive(Error, Debug)]
pub enum Error {
    /// The post reference could not be parsed.
    #[error(transparent)]
    MalformedReference(#[from] ReferenceError),
    /// The owner's handle could not be looked up.
    #[error("Could not resolve handle `{handle}`")]
    ResolutionFailed {
        handle: String,
        #[source]
        source: XrpcError,
    },
    /// Credentials are missing, or the PDS rejected them.
    #[error("Authentication required: no valid credentials or session")]
    AuthRequired,
    /// The target post does not exist.
    #[error("Post not found: {uri}")]
    RecordNotFound { uri: String },
    /// Only posts in the signed in account's repository can be edited.
    #[error("{repo} is not the signed in account ({session})")]
    NotOwner { repo: String, session: String },
    /// More images than a post can carry.
    #[error("A post can hold at most {max} images")]
    AttachmentLimitExceeded { max: usize },
    /// A single file failed to be prepared or uploaded.
    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },
    /// Mentions, links or tags could not be detected, e.g. a mentioned handle does not resolve.
    #[error("Could not detect facets in the new text")]
    FacetDetection(#[source] XrpcError),
    /// The stored record is not a post, or the rebuilt one cannot be encoded.
    #[error("Malformed post record")]
    Record(#[from] LexiconError),
    /// The delete+create batch was rejected.
    #[error("Failed to swap the post record")]
    SwapFailed(#[source] XrpcError),
    #[error(transparent)]
    Embed(EmbedError),
    #[error(transparent)]
    Xrpc(XrpcError),
}

impl Error {
    const SWAP_SUGGESTION: &'static str =
        "the batch is atomic, but check the post is still there before trying again";
    const FACET_SUGGESTION: &'static str =
        "check every @mention is a handle that exists, nothing has been changed";

    pub(crate) fn resolution(handle: &str, source: XrpcError) -> Self {
        match source {
            XrpcError::AuthRequired => Error::AuthRequired,
            source => Error::ResolutionFailed {
                handle: handle.to_owned(),
                source,
            },
        }
    }

    pub(crate) fn not_found(uri: impl ToString) -> Self {
        Error::RecordNotFound {
            uri: uri.to_string(),
        }
    }

    /// Whether the user may reasonably try the same command again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ResolutionFailed { .. } | Error::FacetDetection(_) => true,
            Error::Xrpc(e) => e.is_transport(),
            _ => false,
        }
    }

    /// Logs the error with whatever context helps the user act on it.
    pub fn warn(&self) {
        match self {
            Error::SwapFailed(source) => {
                tracing::error!(
                    message = %self,
                    reason = %source,
                    suggest = Error::SWAP_SUGGESTION
                )
            }
            Error::FacetDetection(source) => {
                tracing::warn!(
                    message = %self,
                    reason = %source,
                    suggest = Error::FACET_SUGGESTION
                )
            }
            Error::ResolutionFailed { handle, source } => {
                tracing::warn!(message = %self, %handle, reason = %source)
            }
            Error::NotOwner { repo, session } => {
                tracing::warn!(message = %self, %repo, %session)
            }
            _ => tracing::warn!(message = %self, retryable = self.is_retryable()),
        }
    }
}

impl From<EmbedError> for Error {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::AttachmentLimitExceeded { max } => Error::AttachmentLimitExceeded { max },
            e => Error::Embed(e),
        }
    }
}

impl From<XrpcError> for Error {
    fn from(e: XrpcError) -> Self {
        match e {
            XrpcError::AuthRequired => Error::AuthRequired,
            e => Error::Xrpc(e),
        }
    }
}
