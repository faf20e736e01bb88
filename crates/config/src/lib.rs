mod credentials;

pub use credentials::{CredentialStore, Credentials, FileStore, MemoryStore, StoreError};

use etcetera::BaseStrategy;
use serde::{Deserialize, Serialize};

use figment::{
    providers::{Env, Format, Toml},
    Figment, Metadata, Provider,
};

lazy_static::lazy_static! {
    /// Provide a lazyily instantiated static reference to
    /// a config object parsed from canonical locations
    /// so that applications have immutable access to it from
    /// anywhere without ever having to parse the config more
    /// than once.
    pub static ref CONFIG: Config = load_config();
}

/// The PDS used when nothing else is configured.
pub const DEFAULT_SERVICE: &str = "https://bsky.social";

const CONFIG_FILE: &str = "reskeet.toml";
const ENV_PREFIX: &str = "RESKEET_";

fn load_config() -> Config {
    Config::figment().extract().unwrap_or_else(|e| {
        tracing::warn!(message = "Ignoring unreadable configuration", error = %e);
        Config::default()
    })
}

#[derive(Deserialize, Serialize, Clone)]
pub struct Config {
    /// Base URL of the PDS serving XRPC requests.
    service: String,
    /// Handle or DID used to log in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    handle: Option<String>,
    /// App-scoped password paired with `handle`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_password: Option<String>,
}

impl Config {
    pub fn service(&self) -> &str {
        self.service.trim_end_matches('/')
    }

    /// Credentials given directly through the config layers, if both halves are present.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.handle, &self.app_password) {
            (Some(h), Some(p)) if !h.is_empty() && !p.is_empty() => {
                Some(Credentials::new(h.clone(), p.clone()))
            }
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service: DEFAULT_SERVICE.to_owned(),
            handle: None,
            app_password: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("service", &self.service)
            .field("handle", &self.handle)
            .field("app_password", &self.app_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    pub fn from<T: Provider>(provider: T) -> Result<Config, figment::Error> {
        Figment::from(provider).extract()
    }

    pub fn figment() -> Figment {
        let mut fig = Figment::from(Config::default());

        if let Ok(c) = etcetera::choose_base_strategy() {
            let config = c.config_dir().join(CONFIG_FILE);
            fig = fig.admerge(Toml::file(config));
        }

        fig.admerge(Env::prefixed(ENV_PREFIX))
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("reskeet CLI Config")
    }
    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}
