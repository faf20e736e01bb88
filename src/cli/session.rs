use anyhow::Context;
use config::{CredentialStore, Credentials, FileStore, CONFIG};
use skeet::{Editor, Pds, XrpcClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Auth {
    Required,
    /// Sign in when credentials exist, carry on anonymously otherwise.
    Optional,
}

/// Credentials from the configuration layers, falling back to the credential store.
pub(super) fn credentials() -> anyhow::Result<Option<Credentials>> {
    if let Some(creds) = CONFIG.credentials() {
        tracing::debug!(identifier = creds.identifier(), "Using configured credentials");
        return Ok(Some(creds));
    }
    let store = FileStore::default_location()?;
    store
        .get()
        .with_context(|| format!("reading {}", store.path().display()))
}

pub(super) fn client(service: Option<&str>) -> anyhow::Result<XrpcClient> {
    let service = service.unwrap_or_else(|| CONFIG.service());
    tracing::debug!(service, "Connecting");
    Ok(XrpcClient::new(service)?)
}

pub(super) async fn connect(
    service: Option<&str>,
    auth: Auth,
) -> anyhow::Result<Editor<XrpcClient>> {
    let editor = Editor::new(client(service)?);

    match (credentials()?, auth) {
        (Some(creds), _) => {
            editor.sign_in(&creds).await?;
        }
        (None, Auth::Required) => {
            tracing::warn!(
                suggest = "run `reskeet login` or set RESKEET_HANDLE and RESKEET_APP_PASSWORD",
                "No credentials found"
            );
            return Err(skeet::Error::AuthRequired.into());
        }
        (None, Auth::Optional) => {
            tracing::info!("No credentials found, continuing signed out")
        }
    }
    tracing::trace!(did = ?editor.pds().session_did().await);
    Ok(editor)
}
