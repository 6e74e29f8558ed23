//! Authentication state machine.
//!
//! The page is inspected, one transition is taken, and the page is inspected
//! again until the reports dashboard is reachable or a terminal failure is
//! hit. Inspection has no side effects, so re-entering on an unchanged page
//! always yields the same decision.

use secrecy::ExposeSecret;

use crate::challenge::ChallengeResolver;
use crate::config::TimingConfig;
use crate::credentials::Settings;
use crate::driver::selectors::*;
use crate::driver::{pause, BrowserDriver};
use crate::error::AuthError;

/// The two screens of two-step verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpStep {
    /// "Send code to number ending in ...".
    ChannelSelection { send_limit_exceeded: bool },
    CodeEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Unauthenticated,
    CaptchaChallenge { image_url: String },
    OtpChallenge(OtpStep),
    PasswordResetRequired,
    ReportsReachable,
}

impl PageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PageState::PasswordResetRequired | PageState::ReportsReachable
        )
    }
}

/// Classify the current page from its title and a few markers.
///
/// The sign-in page is always `Unauthenticated`; a captcha is only discovered
/// once credentials have been filled in.
pub async fn inspect(driver: &dyn BrowserDriver) -> anyhow::Result<PageState> {
    let title = driver.title().await?;
    let state = match title.trim() {
        TITLE_SIGN_IN => PageState::Unauthenticated,
        TITLE_TWO_STEP => {
            if driver.exists(OTP_SEND_CODE).await? {
                PageState::OtpChallenge(OtpStep::ChannelSelection {
                    send_limit_exceeded: driver.exists(OTP_SEND_LIMIT_ALERT).await?,
                })
            } else {
                PageState::OtpChallenge(OtpStep::CodeEntry)
            }
        }
        "" => PageState::PasswordResetRequired,
        _ => PageState::ReportsReachable,
    };
    Ok(state)
}

/// Drives the dashboard from wherever it is to the reports page.
pub struct Authenticator<'a> {
    driver: &'a dyn BrowserDriver,
    resolver: &'a dyn ChallengeResolver,
    settings: &'a Settings,
    timing: &'a TimingConfig,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        driver: &'a dyn BrowserDriver,
        resolver: &'a dyn ChallengeResolver,
        settings: &'a Settings,
        timing: &'a TimingConfig,
    ) -> Self {
        Self {
            driver,
            resolver,
            settings,
            timing,
        }
    }

    /// Run the state machine to a terminal state.
    pub async fn authenticate(&self) -> Result<(), AuthError> {
        let mut state = self.inspect().await?;
        let mut transitions = 0;

        while !state.is_terminal() {
            if transitions >= self.timing.max_transitions {
                tracing::error!(transitions, state = ?state, "Authentication stuck");
                return Err(AuthError::TooManyTransitions(transitions));
            }
            transitions += 1;
            tracing::debug!(transitions, state = ?state, "Authentication transition");
            state = self.step(state).await?;
        }

        match state {
            PageState::ReportsReachable => {
                tracing::info!(transitions, "Reports dashboard reachable");
                Ok(())
            }
            _ => {
                tracing::error!("Dashboard requires a password reset");
                Err(AuthError::PasswordResetRequired)
            }
        }
    }

    /// Take one transition out of a non-terminal state.
    pub async fn step(&self, state: PageState) -> Result<PageState, AuthError> {
        match state {
            PageState::Unauthenticated => self.submit_credentials().await,
            PageState::CaptchaChallenge { image_url } => self.submit_captcha(&image_url).await,
            PageState::OtpChallenge(OtpStep::ChannelSelection {
                send_limit_exceeded: true,
            }) => {
                tracing::error!("OTP send limit exceeded");
                Err(AuthError::OtpExhausted)
            }
            PageState::OtpChallenge(OtpStep::ChannelSelection { .. }) => {
                self.driver.click(OTP_SEND_CODE).await.map_err(AuthError::Driver)?;
                tracing::info!("OTP requested");
                self.settle_and_inspect().await
            }
            PageState::OtpChallenge(OtpStep::CodeEntry) => self.submit_otp().await,
            terminal => Ok(terminal),
        }
    }

    async fn inspect(&self) -> Result<PageState, AuthError> {
        inspect(self.driver).await.map_err(AuthError::Driver)
    }

    async fn settle_and_inspect(&self) -> Result<PageState, AuthError> {
        pause(self.timing.settle).await;
        self.inspect().await
    }

    async fn submit_credentials(&self) -> Result<PageState, AuthError> {
        let driver = self.driver;
        let fill = async {
            if driver.exists(EMAIL_INPUT).await? {
                driver.clear(EMAIL_INPUT).await?;
                driver
                    .type_text(EMAIL_INPUT, self.settings.login_email.expose_secret())
                    .await?;
            }
            driver.clear(PASSWORD_INPUT).await?;
            driver
                .type_text(PASSWORD_INPUT, self.settings.login_password.expose_secret())
                .await?;
            driver.attribute(CAPTCHA_IMAGE, "src").await
        };
        let captcha = fill.await.map_err(AuthError::Driver)?;

        if let Some(image_url) = captcha.filter(|src| !src.is_empty()) {
            tracing::info!("Sign-in captcha present");
            return Ok(PageState::CaptchaChallenge { image_url });
        }

        driver.click(SIGN_IN_SUBMIT).await.map_err(AuthError::Driver)?;
        tracing::info!("Credentials submitted");
        self.settle_and_inspect().await
    }

    async fn submit_captcha(&self, image_url: &str) -> Result<PageState, AuthError> {
        let guess = self.resolver.resolve_captcha(image_url).await?;

        let driver = self.driver;
        async {
            driver.clear(CAPTCHA_GUESS).await?;
            driver.type_text(CAPTCHA_GUESS, &guess).await?;
            driver.click(SIGN_IN_SUBMIT).await
        }
        .await
        .map_err(AuthError::Driver)?;

        self.settle_and_inspect().await
    }

    async fn submit_otp(&self) -> Result<PageState, AuthError> {
        let code = self.resolver.resolve_otp().await?;

        let driver = self.driver;
        async {
            driver.clear(OTP_CODE_INPUT).await?;
            driver.type_text(OTP_CODE_INPUT, &code).await?;
            driver.click(OTP_SUBMIT).await
        }
        .await
        .map_err(AuthError::Driver)?;

        tracing::info!("OTP submitted");
        self.settle_and_inspect().await
    }
}
