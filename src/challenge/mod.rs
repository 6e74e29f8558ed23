//! Captcha and one-time passcode resolution.
//!
//! Neither capability retries locally beyond its own bound: a failure goes
//! straight back to the session state machine, which treats it as fatal.

mod captcha;
mod otp;

pub use captcha::TwoCaptchaSolver;
pub use otp::{extract_otp_code, OtpMessageSource, OtpResolver, TwilioMessageSource};

use async_trait::async_trait;

use crate::config::TimingConfig;
use crate::credentials::Settings;
use crate::error::ChallengeError;

#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    /// Text shown in the captcha image at `image_url`.
    async fn resolve_captcha(&self, image_url: &str) -> Result<String, ChallengeError>;

    /// The one-time passcode that was just sent.
    async fn resolve_otp(&self) -> Result<String, ChallengeError>;
}

/// Resolver backed by the configured external providers.
pub struct ProviderResolver<S = TwilioMessageSource> {
    captcha: TwoCaptchaSolver,
    otp: OtpResolver<S>,
}

impl ProviderResolver<TwilioMessageSource> {
    pub fn from_settings(settings: &Settings, timing: &TimingConfig) -> Self {
        Self::new(
            TwoCaptchaSolver::new(&settings.captcha, timing.captcha_poll, timing.captcha_timeout),
            TwilioMessageSource::new(&settings.otp),
            timing,
        )
    }
}

impl<S: OtpMessageSource> ProviderResolver<S> {
    pub fn new(captcha: TwoCaptchaSolver, source: S, timing: &TimingConfig) -> Self {
        Self {
            captcha,
            otp: OtpResolver::new(
                source,
                timing.otp_initial_delay,
                timing.otp_retry_delay,
                timing.otp_attempts,
            ),
        }
    }
}

#[async_trait]
impl<S: OtpMessageSource> ChallengeResolver for ProviderResolver<S> {
    async fn resolve_captcha(&self, image_url: &str) -> Result<String, ChallengeError> {
        self.captcha.solve(image_url).await
    }

    async fn resolve_otp(&self) -> Result<String, ChallengeError> {
        self.otp.resolve().await
    }
}
