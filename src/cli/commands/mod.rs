mod edit;
mod login;
mod show;
mod upload;

use super::Args;

use anyhow::bail;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub(super) enum Commands {
    /// Show a post as it currently stands
    ///
    /// Accepts a web permalink or an at:// URI. Images are numbered
    /// from 1, matching `edit --remove-image`.
    #[command(verbatim_doc_comment)]
    Show(show::Args),
    /// Edit one of your posts in place
    ///
    /// The post is deleted and recreated under the same record key in a
    /// single atomic batch, so its URI and permalink stay the same.
    ///
    /// WARNING: the recreated record is a new version of the post. Editing
    /// resets all likes and reposts, and the post's date and time
    /// (`createdAt`) become the time of the edit.
    ///
    /// Text may contain markdown links, `[title](https://...)`, which are
    /// turned into link facets. Mentions, bare links and #tags are
    /// detected as usual.
    #[command(verbatim_doc_comment)]
    Edit(edit::Args),
    /// Upload an image and print its blob reference
    Upload(upload::Args),
    /// Verify and store the credentials used to sign in
    ///
    /// Use an app password, never your account password. Credentials
    /// set through the configuration file or the RESKEET_HANDLE and
    /// RESKEET_APP_PASSWORD environment variables take precedence over
    /// the stored ones.
    #[command(verbatim_doc_comment)]
    Login(login::Args),
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let service = args.service.as_deref();
    let res = match args.command {
        Commands::Show(args) => show::run(service, args).await,
        Commands::Edit(args) => edit::run(service, args).await,
        Commands::Upload(args) => upload::run(service, args).await,
        Commands::Login(args) => login::run(service, args).await,
    };
    if let Err(e) = &res {
        match e.downcast_ref::<skeet::Error>() {
            // already reported where the batch failed
            Some(skeet::Error::SwapFailed(_)) | None => (),
            Some(e) => e.warn(),
        }
    }
    res
}

/// The MIME type of an image file, judged by its extension.
fn mime_type(path: &Path) -> anyhow::Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    Ok(match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => bail!("{} is not a supported image type", path.display()),
    })
}
