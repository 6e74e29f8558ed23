//! Login and challenge-provider credentials.
//!
//! Secrets come either inline from the config file (`[settings]`) or from a
//! credential backend (`[credentials]`):
//!
//! ```toml
//! [credentials]
//! backend = "pass"
//! path = "amazon/seller-central"
//!
//! [credentials.fields]
//! login_password = "password"
//! ```
//!
//! Every secret defaults to empty. An empty secret only fails once the
//! provider that needs it is actually called.

mod config;
mod env;
mod pass;

pub use config::CredentialConfig;
pub use env::EnvCredentialStore;
pub use pass::{PassConfig, PassCredentialStore};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

/// Logical credential keys resolved from a [`CredentialStore`].
pub mod keys {
    pub const LOGIN_EMAIL: &str = "login_email";
    pub const LOGIN_PASSWORD: &str = "login_password";
    pub const TWILIO_ACCOUNT_SID: &str = "twilio_account_sid";
    pub const TWILIO_AUTH_TOKEN: &str = "twilio_auth_token";
    pub const TWOCAPTCHA_API_KEY: &str = "twocaptcha_api_key";
}

/// A read-only key-value store for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by logical key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    /// Returns `Err` if there was an error accessing the backend.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;
}

pub(crate) fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

pub(crate) fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(SecretString::from(value))
}

/// Credentials for the OTP message source (Twilio).
#[derive(Debug, Deserialize)]
pub struct OtpSettings {
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub twilio_account_sid: SecretString,
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub twilio_auth_token: SecretString,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            twilio_account_sid: empty_secret(),
            twilio_auth_token: empty_secret(),
        }
    }
}

/// Credentials for the captcha-solving provider (2captcha).
#[derive(Debug, Deserialize)]
pub struct CaptchaSettings {
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub twocaptcha_api_key: SecretString,
}

impl Default for CaptchaSettings {
    fn default() -> Self {
        Self {
            twocaptcha_api_key: empty_secret(),
        }
    }
}

/// Everything needed to sign in and get past challenges.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Dashboard login email address or phone number.
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub login_email: SecretString,
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub login_password: SecretString,
    #[serde(default)]
    pub otp: OtpSettings,
    #[serde(default)]
    pub captcha: CaptchaSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            login_email: empty_secret(),
            login_password: empty_secret(),
            otp: OtpSettings::default(),
            captcha: CaptchaSettings::default(),
        }
    }
}

impl Settings {
    /// Resolve every logical key from a credential store. Missing keys stay empty.
    pub async fn from_store(store: &dyn CredentialStore) -> Result<Self> {
        let get = |key: &'static str| async move {
            Ok::<_, anyhow::Error>(store.get(key).await?.unwrap_or_else(empty_secret))
        };

        Ok(Self {
            login_email: get(keys::LOGIN_EMAIL).await?,
            login_password: get(keys::LOGIN_PASSWORD).await?,
            otp: OtpSettings {
                twilio_account_sid: get(keys::TWILIO_ACCOUNT_SID).await?,
                twilio_auth_token: get(keys::TWILIO_AUTH_TOKEN).await?,
            },
            captcha: CaptchaSettings {
                twocaptcha_api_key: get(keys::TWOCAPTCHA_API_KEY).await?,
            },
        })
    }

    /// True when login credentials are present.
    pub fn has_login(&self) -> bool {
        !self.login_email.expose_secret().is_empty()
            && !self.login_password.expose_secret().is_empty()
    }
}
