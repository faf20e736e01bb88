use super::mime_type;
use crate::cli::logging::LogValue;
use crate::cli::session::{self, Auth};

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub(in super::super) struct Args {
    /// The image to upload
    file: PathBuf,
}

pub(super) async fn run(service: Option<&str>, args: Args) -> anyhow::Result<()> {
    let mime = mime_type(&args.file)?;
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;

    let editor = session::connect(service, Auth::Required).await?;
    let upload = editor.upload_image(bytes, mime).await?;

    let out = json!({
        "blob": upload.blob,
        "aspectRatio": { "width": upload.width, "height": upload.height },
        "resized": upload.resized,
    });
    println!("{}", out.as_json());
    Ok(())
}
