use super::mime_type;
use crate::cli::session::{self, Auth};

use anyhow::{bail, Context};
use clap::Parser;
use skeet::blob::Pending;
use skeet::embed::Attachments;
use skeet::swap::EmbedChange;
use skeet::{Error, Locator};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
pub(in super::super) struct Args {
    /// Permalink or at:// URI of the post
    post: Locator,

    /// The new text of the post
    #[arg(long, short, conflicts_with = "file")]
    text: Option<String>,

    /// Read the new text from a file
    #[arg(long, short, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Attach an image (repeatable, up to the free image slots)
    #[arg(long, short, value_name = "IMAGE")]
    attach: Vec<PathBuf>,

    /// Alt text for the attached images
    #[arg(long, default_value = "")]
    alt: String,

    /// Remove the image at this position, counting from 1 (repeatable)
    #[arg(long, value_name = "N")]
    remove_image: Vec<usize>,

    /// Remove the quoted post, keeping any media
    #[arg(long)]
    remove_quote: bool,

    /// Remove the link card, keeping any quoted post
    #[arg(long)]
    remove_external: bool,

    /// Remove all attachments before applying the other options
    #[arg(long)]
    clear_embed: bool,
}

impl Args {
    fn touches_embed(&self) -> bool {
        self.clear_embed
            || self.remove_quote
            || self.remove_external
            || !self.remove_image.is_empty()
            || !self.attach.is_empty()
    }
}

async fn read_images(paths: &[PathBuf], alt: &str) -> anyhow::Result<Vec<Pending>> {
    let mut pending = Vec::with_capacity(paths.len());
    for path in paths {
        let mime = mime_type(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let local_url = std::fs::canonicalize(path)
            .map(|p| format!("file://{}", p.display()))
            .unwrap_or_else(|_| path.display().to_string());
        pending.push(Pending {
            bytes,
            mime: mime.to_owned(),
            alt: alt.to_owned(),
            local_url,
        });
    }
    Ok(pending)
}

/// Applies the removal flags, highest position first so earlier positions stay valid.
fn apply_removals(args: &Args, attachments: &mut Attachments) -> Result<(), Error> {
    if args.clear_embed {
        attachments.clear();
    }
    let mut positions = args.remove_image.clone();
    positions.sort_unstable_by(|a, b| b.cmp(a));
    positions.dedup();
    for n in positions {
        let index = n.checked_sub(1).ok_or(skeet::embed::EmbedError::NoSuchImage {
            index: 0,
            count: attachments.image_count(),
        })?;
        attachments.remove_image(index)?;
    }
    if args.remove_quote {
        attachments.remove_quote();
    }
    if args.remove_external {
        attachments.remove_external();
    }
    Ok(())
}

pub(super) async fn run(service: Option<&str>, args: Args) -> anyhow::Result<()> {
    let editor = session::connect(service, Auth::Required).await?;
    let post = editor.get_post(&args.post).await?;

    let text = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?
            .trim_end()
            .to_owned(),
        (None, None) => post.text().to_owned(),
    };

    let change = if args.touches_embed() {
        let mut attachments = post.attachments.clone();
        apply_removals(&args, &mut attachments)?;

        let files = read_images(&args.attach, &args.alt).await?;
        let requested = files.len();
        let results = editor.upload_images(files, &mut attachments).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if requested > 0 && failed == requested {
            bail!("none of the {requested} images could be attached");
        }
        if failed > 0 {
            tracing::warn!(failed, requested, "Some images were not attached");
        }
        attachments.into_change()
    } else {
        EmbedChange::Keep
    };

    if text == post.text() && change == EmbedChange::Keep {
        tracing::warn!("Nothing to change");
        return Ok(());
    }

    let at = editor
        .edit_post(&Locator::from(&post.at), &text, change)
        .await?;
    tracing::info!(uri = %at, "Post edited");
    println!("{at}");
    Ok(())
}
