//! # Blob Upload
//!
//! New images are reduced to fit the PDS blob limit (see [`reduce`]), uploaded, and handed
//! back as an [`Upload`] that can be turned into a paired display/record image for the embed
//! reconciler.

pub mod reduce;

pub use reduce::{shrink, BlobError, Reduced, MAX_BLOB_BYTES};

use std::num::NonZeroU64;

use crate::embed::{NewImage, ShownImage};
use crate::lexicon::{blob_cid, defs, images, BlobRef};
use crate::pds::{Pds, XrpcError};
use crate::Error;

/// A successfully uploaded image.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub blob: BlobRef,
    pub width: u32,
    pub height: u32,
    pub resized: bool,
}

impl Upload {
    fn aspect_ratio(&self) -> Option<defs::AspectRatio> {
        let width = NonZeroU64::new(self.width.into())?;
        let height = NonZeroU64::new(self.height.into())?;
        Some(defs::AspectRatioData { height, width }.into())
    }

    /// Builds the paired images for the reconciler. `local_url` stands in for the thumbnail
    /// until the AppView has processed the blob.
    pub fn into_image(self, alt: impl Into<String>, local_url: impl Into<String>) -> NewImage {
        let alt = alt.into();
        let local_url = local_url.into();
        let aspect_ratio = self.aspect_ratio();
        let view = images::ViewImageData {
            alt: alt.clone(),
            aspect_ratio: aspect_ratio.clone(),
            fullsize: local_url.clone(),
            thumb: local_url,
        };
        NewImage {
            display: ShownImage {
                view: view.into(),
                resized: self.resized,
            },
            record: images::ImageData {
                alt,
                aspect_ratio,
                image: self.blob,
            }
            .into(),
        }
    }
}

/// A local image waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub alt: String,
    /// Where the image can be previewed locally, e.g. a `file://` URL.
    pub local_url: String,
}

/// Uploads images to a [`Pds`].
#[derive(Debug)]
pub struct Uploader<'a, P: ?Sized> {
    pds: &'a P,
}

impl<'a, P> Uploader<'a, P>
where
    P: Pds + ?Sized,
{
    pub fn new(pds: &'a P) -> Self {
        Uploader { pds }
    }

    /// Reduces the image if it is too large, then uploads it.
    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()), err)]
    pub async fn upload_image(&self, bytes: Vec<u8>, mime: &str) -> Result<Upload, Error> {
        let owned = mime.to_owned();
        let reduced = tokio::task::spawn_blocking(move || shrink(bytes, &owned))
            .await
            .map_err(|e| Error::UploadFailed {
                reason: e.to_string(),
            })?
            .map_err(|e| Error::UploadFailed {
                reason: e.to_string(),
            })?;

        let Reduced {
            bytes,
            mime,
            width,
            height,
            resized,
        } = reduced;
        if resized {
            tracing::info!(len = bytes.len(), width, height, "Image was resized to fit");
        }

        let blob = self
            .pds
            .upload_blob(bytes, &mime)
            .await
            .map_err(|e| match e {
                XrpcError::AuthRequired => Error::AuthRequired,
                e => Error::UploadFailed {
                    reason: e.to_string(),
                },
            })?;
        tracing::debug!(cid = blob_cid(&blob), "Uploaded blob");

        Ok(Upload {
            blob,
            width,
            height,
            resized,
        })
    }
}
