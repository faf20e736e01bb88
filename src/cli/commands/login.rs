use crate::cli::session;

use anyhow::Context;
use clap::Parser;
use config::{CredentialStore, Credentials, FileStore};
use std::io::{BufRead, IsTerminal, Write};

#[derive(Parser, Debug)]
pub(in super::super) struct Args {
    /// Your handle (e.g. alice.bsky.social) or DID
    #[arg(long)]
    handle: String,

    /// An app password; read from stdin when omitted
    #[arg(long, env = "RESKEET_APP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

fn read_password() -> anyhow::Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("App password: ");
        std::io::stderr().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

pub(super) async fn run(service: Option<&str>, args: Args) -> anyhow::Result<()> {
    let password = match args.password {
        Some(p) => p,
        None => read_password()?,
    };
    if password.is_empty() {
        return Err(skeet::Error::AuthRequired.into());
    }
    let creds = Credentials::new(args.handle, password);

    let editor = skeet::Editor::new(session::client(service)?);
    let signed_in = editor.sign_in(&creds).await?;

    let store = FileStore::default_location()?;
    store
        .set(&creds)
        .with_context(|| format!("writing {}", store.path().display()))?;

    tracing::info!(path = %store.path().display(), "Stored credentials");
    println!(
        "Signed in as {} ({})",
        signed_in.handle.as_str(),
        signed_in.did.as_str()
    );
    Ok(())
}
