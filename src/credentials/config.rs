//! Credential backend configuration (the `[credentials]` table).

use serde::{Deserialize, Serialize};

use super::env::{EnvCredentialStore, DEFAULT_ENV_PREFIX};
use super::pass::{PassConfig, PassCredentialStore};
use super::CredentialStore;

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_string()
}

/// Which backend resolves the run's secrets.
///
/// ```toml
/// [credentials]
/// backend = "pass"
/// path = "amazon/seller-central"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// Password-store (pass) backend.
    Pass {
        #[serde(flatten)]
        config: PassConfig,
    },
    /// Environment variables with a common prefix.
    Env {
        #[serde(default = "default_env_prefix")]
        prefix: String,
    },
}

impl CredentialConfig {
    /// Build a credential store from this configuration.
    pub fn build(&self) -> Box<dyn CredentialStore> {
        match self {
            CredentialConfig::Pass { config } => {
                Box::new(PassCredentialStore::new(config.clone()))
            }
            CredentialConfig::Env { prefix } => Box::new(EnvCredentialStore::new(prefix.clone())),
        }
    }
}
