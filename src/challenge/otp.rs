//! One-time passcode lookup.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::credentials::{copy_secret, OtpSettings};
use crate::driver::pause;
use crate::error::ChallengeError;

const TWILIO_BASE_URL: &str = "https://api.twilio.com";

/// Marker the verification SMS carries right after the code.
const OTP_MARKER: &str = r" OTP.";

/// Extract the code from a verification message body.
///
/// The body must contain the marker somewhere after its first character; the
/// code is then the first space-separated word.
pub fn extract_otp_code(body: &str) -> Option<String> {
    let marker = Regex::new(OTP_MARKER).ok()?;
    let found = marker.find(body)?;
    if found.start() == 0 {
        return None;
    }
    body.split(' ')
        .next()
        .filter(|word| !word.is_empty())
        .map(str::to_string)
}

/// Where verification messages arrive.
#[async_trait]
pub trait OtpMessageSource: Send + Sync {
    /// Bodies of the most recent messages, newest first.
    async fn recent_messages(&self) -> Result<Vec<String>, ChallengeError>;
}

/// Polls an [`OtpMessageSource`] until a message carries a code.
pub struct OtpResolver<S> {
    source: S,
    initial_delay: Duration,
    retry_delay: Duration,
    attempts: u32,
}

impl<S: OtpMessageSource> OtpResolver<S> {
    pub fn new(source: S, initial_delay: Duration, retry_delay: Duration, attempts: u32) -> Self {
        Self {
            source,
            initial_delay,
            retry_delay,
            attempts: attempts.max(1),
        }
    }

    /// Look the code up, at most `attempts` times.
    ///
    /// Transport failures use up an attempt. Missing provider credentials
    /// fail immediately.
    pub async fn resolve(&self) -> Result<String, ChallengeError> {
        pause(self.initial_delay).await;

        for attempt in 1..=self.attempts {
            match self.source.recent_messages().await {
                Ok(bodies) => {
                    if let Some(code) = bodies.iter().find_map(|body| extract_otp_code(body)) {
                        tracing::info!(attempt, "OTP code received");
                        return Ok(code);
                    }
                    tracing::debug!(attempt, messages = bodies.len(), "No OTP message yet");
                }
                Err(e @ ChallengeError::MissingCredentials(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "OTP message lookup failed");
                }
            }

            if attempt < self.attempts {
                pause(self.retry_delay).await;
            }
        }

        Err(ChallengeError::OtpNotFound {
            attempts: self.attempts,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    body: String,
}

/// Twilio inbox of the number receiving verification SMS.
pub struct TwilioMessageSource {
    client: Client,
    base_url: String,
    account_sid: SecretString,
    auth_token: SecretString,
}

impl TwilioMessageSource {
    pub fn new(settings: &OtpSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: TWILIO_BASE_URL.to_string(),
            account_sid: copy_secret(&settings.twilio_account_sid),
            auth_token: copy_secret(&settings.twilio_auth_token),
        }
    }

    /// Override the API base URL (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl OtpMessageSource for TwilioMessageSource {
    async fn recent_messages(&self) -> Result<Vec<String>, ChallengeError> {
        let sid = self.account_sid.expose_secret();
        if sid.is_empty() {
            return Err(ChallengeError::MissingCredentials("twilio_account_sid"));
        }
        if self.auth_token.expose_secret().is_empty() {
            return Err(ChallengeError::MissingCredentials("twilio_auth_token"));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{sid}/Messages.json",
            self.base_url.trim_end_matches('/')
        );
        let page = self
            .client
            .get(&url)
            .query(&[("PageSize", "3"), ("Page", "0")])
            .basic_auth(sid, Some(self.auth_token.expose_secret()))
            .send()
            .await?
            .error_for_status()?
            .json::<MessagePage>()
            .await?;

        Ok(page.messages.into_iter().map(|m| m.body).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn extracts_first_word_when_marker_present() {
        assert_eq!(
            extract_otp_code("123456 is your Amazon OTP. Do not share it with anyone."),
            Some("123456".to_string())
        );
    }

    #[test]
    fn ignores_messages_without_marker() {
        assert_eq!(extract_otp_code("Your package has shipped."), None);
        assert_eq!(extract_otp_code(" OTP. at the very start"), None);
    }

    struct ScriptedSource {
        calls: Arc<AtomicU32>,
        bodies: Vec<String>,
    }

    #[async_trait]
    impl OtpMessageSource for ScriptedSource {
        async fn recent_messages(&self) -> Result<Vec<String>, ChallengeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.bodies.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_exactly_the_attempt_bound() {
        let calls = Arc::new(AtomicU32::new(0));
        let resolver = OtpResolver::new(
            ScriptedSource {
                calls: calls.clone(),
                bodies: vec!["Hello there".to_string()],
            },
            Duration::from_secs(5),
            Duration::from_secs(10),
            4,
        );

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ChallengeError::OtpNotFound { attempts: 4 }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_code_from_any_recent_message() {
        let calls = Arc::new(AtomicU32::new(0));
        let resolver = OtpResolver::new(
            ScriptedSource {
                calls: calls.clone(),
                bodies: vec![
                    "Unrelated".to_string(),
                    "654321 is your Amazon OTP. Don't share it.".to_string(),
                ],
            },
            Duration::ZERO,
            Duration::ZERO,
            4,
        );

        assert_eq!(resolver.resolve().await.unwrap(), "654321");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn twilio_without_credentials_fails_fast() {
        let source = TwilioMessageSource::new(&OtpSettings::default());
        let err = source.recent_messages().await.unwrap_err();
        assert!(matches!(
            err,
            ChallengeError::MissingCredentials("twilio_account_sid")
        ));
    }
}
