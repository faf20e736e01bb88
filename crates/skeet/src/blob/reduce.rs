//! Client-side size reduction of images that exceed the blob limit.
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use thiserror::Error;

/// Largest blob, in bytes, the PDS accepts for an image.
pub const MAX_BLOB_BYTES: usize = 1_000_000;

const JPEG: &str = "image/jpeg";
const START_QUALITY: u8 = 90;
const RESET_QUALITY: u8 = 80;
const MIN_QUALITY: u8 = 50;
const QUALITY_STEP: u8 = 10;
const SCALE: f64 = 0.9;

#[derive(Error, Debug)]
pub enum BlobError {
    /// A transparent wrapper for a [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A transparent wrapper for a [`image::ImageError`]
    #[error(transparent)]
    Image(#[from] image::ImageError),
    /// Even a single pixel re-encoding did not fit.
    #[error("Could not reduce the image below {MAX_BLOB_BYTES} bytes")]
    Irreducible,
}

/// The bytes to upload, and what is known about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduced {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    /// Whether the image was re-encoded to fit.
    pub resized: bool,
}

fn scale(n: u32) -> u32 {
    ((f64::from(n) * SCALE) as u32).max(1)
}

fn encode(image: &RgbImage, quality: u8) -> Result<Vec<u8>, BlobError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(image)?;
    Ok(out)
}

/// Returns images at or under [`MAX_BLOB_BYTES`] untouched. Anything larger is re-encoded as
/// JPEG, first lowering the quality step by step, then repeatedly shrinking the dimensions by
/// a tenth, until it fits.
///
/// CPU bound; run it off the async executor.
pub fn shrink(bytes: Vec<u8>, mime: &str) -> Result<Reduced, BlobError> {
    if bytes.len() <= MAX_BLOB_BYTES {
        let (width, height) = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        return Ok(Reduced {
            bytes,
            mime: mime.to_owned(),
            width,
            height,
            resized: false,
        });
    }

    let source = image::load_from_memory(&bytes)?.to_rgb8();
    let (mut width, mut height) = source.dimensions();
    let mut quality = START_QUALITY;

    loop {
        let out = if (width, height) == source.dimensions() {
            encode(&source, quality)?
        } else {
            let frame = imageops::resize(&source, width, height, FilterType::Triangle);
            encode(&frame, quality)?
        };
        tracing::trace!(width, height, quality, len = out.len(), "Re-encoded");

        if out.len() <= MAX_BLOB_BYTES {
            tracing::debug!(
                from = bytes.len(),
                to = out.len(),
                width,
                height,
                quality,
                "Reduced image"
            );
            return Ok(Reduced {
                bytes: out,
                mime: JPEG.to_owned(),
                width,
                height,
                resized: true,
            });
        }

        if quality > MIN_QUALITY {
            quality -= QUALITY_STEP;
        } else if width == 1 && height == 1 {
            return Err(BlobError::Irreducible);
        } else {
            width = scale(width);
            height = scale(height);
            quality = RESET_QUALITY;
        }
    }
}
