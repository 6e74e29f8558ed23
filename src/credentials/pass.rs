//! Password-store (pass) credential backend.
//!
//! Reads one pass entry holding every secret of a run. The first line is the
//! login password; other secrets are `field-name: value` lines.

use std::collections::HashMap;
use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::{keys, CredentialStore};

/// Configuration for a pass credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// The pass entry path (e.g., "amazon/seller-central").
    pub path: String,

    /// Mapping from logical key names to field names in the pass entry.
    /// If not specified, the logical key name is used as-is, except for
    /// `login_password` which falls back to the entry's first line.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

/// Credential store backed by password-store (pass).
pub struct PassCredentialStore {
    config: PassConfig,
}

impl PassCredentialStore {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }

    /// Get the field name in the pass entry for a logical key.
    fn field_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.config
            .fields
            .get(key)
            .map(|s| s.as_str())
            .unwrap_or(key)
    }

    fn read_entry(&self) -> Result<PassEntry> {
        let output = Command::new("pass")
            .arg("show")
            .arg(&self.config.path)
            .output()
            .context("Failed to run pass command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pass command failed: {}", stderr.trim());
        }

        let content = String::from_utf8(output.stdout).context("Invalid UTF-8 in pass output")?;

        Ok(PassEntry::parse(&content))
    }

    fn lookup(&self, entry: &PassEntry, key: &str) -> Option<String> {
        let field = self.field_name(key);
        entry.fields.get(field).cloned().or_else(|| {
            (key == keys::LOGIN_PASSWORD && field == key)
                .then(|| entry.password.clone())
                .flatten()
        })
    }
}

#[async_trait]
impl CredentialStore for PassCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let entry = self.read_entry()?;
        Ok(self.lookup(&entry, key).map(SecretString::from))
    }
}

/// Parsed pass entry.
#[derive(Debug, Default)]
struct PassEntry {
    /// The first line (traditionally the password).
    password: Option<String>,
    /// Additional fields in `name: value` format.
    fields: HashMap<String, String>,
}

impl PassEntry {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let password = lines
            .next()
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty());

        let fields = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(key, value)| (key.trim().to_string(), value.to_string()))
            .collect();

        Self { password, fields }
    }
}
