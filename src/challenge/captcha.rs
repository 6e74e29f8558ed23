//! Captcha solving through the 2captcha API.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::time::Instant;

use crate::credentials::{copy_secret, CaptchaSettings};
use crate::driver::pause;
use crate::error::ChallengeError;

const TWOCAPTCHA_BASE_URL: &str = "https://2captcha.com";
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Both `in.php` and `res.php` answer `{"status": 0|1, "request": "..."}`.
#[derive(Debug, Deserialize)]
struct ProviderReply {
    status: u8,
    request: String,
}

pub struct TwoCaptchaSolver {
    client: Client,
    base_url: String,
    api_key: SecretString,
    poll_interval: Duration,
    timeout: Duration,
}

impl TwoCaptchaSolver {
    pub fn new(settings: &CaptchaSettings, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: TWOCAPTCHA_BASE_URL.to_string(),
            api_key: copy_secret(&settings.twocaptcha_api_key),
            poll_interval,
            timeout,
        }
    }

    /// Override the API base URL (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url.trim_end_matches('/'))
    }

    /// Download the captcha image and return the provider's reading of it.
    pub async fn solve(&self, image_url: &str) -> Result<String, ChallengeError> {
        let key = self.api_key.expose_secret();
        if key.is_empty() {
            return Err(ChallengeError::MissingCredentials("twocaptcha_api_key"));
        }

        let image = self
            .client
            .get(image_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let body = STANDARD.encode(&image);

        let submitted: ProviderReply = self
            .client
            .post(self.endpoint("in.php"))
            .form(&[
                ("key", key),
                ("method", "base64"),
                ("body", body.as_str()),
                ("json", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if submitted.status != 1 {
            return Err(ChallengeError::Captcha(format!(
                "submission rejected: {}",
                submitted.request
            )));
        }
        let task_id = submitted.request;
        tracing::debug!(task_id = %task_id, "Captcha submitted");

        let deadline = Instant::now() + self.timeout;
        loop {
            pause(self.poll_interval).await;

            let reply: ProviderReply = self
                .client
                .get(self.endpoint("res.php"))
                .query(&[
                    ("key", key),
                    ("action", "get"),
                    ("id", task_id.as_str()),
                    ("json", "1"),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if reply.status == 1 {
                tracing::info!(task_id = %task_id, "Captcha solved");
                return Ok(reply.request);
            }
            if reply.request != NOT_READY {
                return Err(ChallengeError::Captcha(reply.request));
            }
            if Instant::now() >= deadline {
                return Err(ChallengeError::Captcha(format!(
                    "no answer within {:?}",
                    self.timeout
                )));
            }
        }
    }
}
