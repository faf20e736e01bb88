//! # Credential Storage
//!
//! A handle and app password pair is the only durable state the editor needs. It is kept
//! behind the small [`CredentialStore`] capability so callers can inject whatever backing they
//! like; a TOML file in the platform data directory is provided for the CLI.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use etcetera::BaseStrategy;
use thiserror::Error;
use toml_edit::DocumentMut;

const HANDLE_KEY: &str = "handle";
const PASSWORD_KEY: &str = "app_password";

/// An identifier (handle or DID) paired with an app-scoped password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identifier: String,
    app_password: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, app_password: impl Into<String>) -> Self {
        Credentials {
            identifier: identifier.into(),
            app_password: app_password.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn app_password(&self) -> &str {
        &self.app_password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// A transparent wrapper for a [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A transparent wrapper for a [`toml_edit::TomlError`]
    #[error(transparent)]
    Toml(#[from] toml_edit::TomlError),
    /// The platform gave us no home directory to derive a default location from.
    #[error("Could not determine a data directory for the credential store")]
    NoDataDir,
    /// A thread panicked while holding the in-memory store.
    #[error("The in-memory credential store is poisoned")]
    Poisoned,
}

/// A get/set capability for persisted credentials.
pub trait CredentialStore {
    /// Returns the stored credentials, or `None` when either half is missing.
    fn get(&self) -> Result<Option<Credentials>, StoreError>;
    /// Replaces the stored credentials.
    fn set(&self, creds: &Credentials) -> Result<(), StoreError>;
}

/// Credentials kept in a small TOML document on disk.
///
/// Unrelated keys in the file survive a [`CredentialStore::set`], since the document is edited
/// in place rather than regenerated.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    /// The store at `<data_dir>/reskeet/credentials.toml`.
    pub fn default_location() -> Result<Self, StoreError> {
        let base = etcetera::choose_base_strategy().map_err(|_| StoreError::NoDataDir)?;
        Ok(FileStore::new(
            base.data_dir().join("reskeet").join("credentials.toml"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<DocumentMut>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s.parse()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl CredentialStore for FileStore {
    fn get(&self) -> Result<Option<Credentials>, StoreError> {
        let Some(doc) = self.read()? else {
            tracing::debug!(path = %self.path.display(), "No credential file");
            return Ok(None);
        };

        let handle = doc.get(HANDLE_KEY).and_then(|i| i.as_str());
        let password = doc.get(PASSWORD_KEY).and_then(|i| i.as_str());

        Ok(match (handle, password) {
            (Some(h), Some(p)) if !h.is_empty() && !p.is_empty() => Some(Credentials::new(h, p)),
            _ => None,
        })
    }

    fn set(&self, creds: &Credentials) -> Result<(), StoreError> {
        let mut doc = self.read()?.unwrap_or_default();
        doc[HANDLE_KEY] = toml_edit::value(creds.identifier());
        doc[PASSWORD_KEY] = toml_edit::value(creds.app_password());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(doc.to_string().as_bytes())?;

        tracing::debug!(
            path = %self.path.display(),
            handle = creds.identifier(),
            "Stored credentials"
        );
        Ok(())
    }
}

/// Credentials held only for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryStore(Mutex<Option<Credentials>>);

impl MemoryStore {
    pub fn with(creds: Credentials) -> Self {
        MemoryStore(Mutex::new(Some(creds)))
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Result<Option<Credentials>, StoreError> {
        let slot = self.0.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slot.clone())
    }

    fn set(&self, creds: &Credentials) -> Result<(), StoreError> {
        let mut slot = self.0.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = Some(creds.clone());
        Ok(())
    }
}
