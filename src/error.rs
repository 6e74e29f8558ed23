//! Error taxonomy for a report run.
//!
//! Components whose failures callers need to tell apart return one of the
//! typed enums below. The browser driver itself is opaque and reports
//! `anyhow::Error`, which is carried through as [`ReportError::Driver`].

use std::path::PathBuf;

use crate::models::{ActiveContext, Id};

/// Failures while resolving a captcha or one-time passcode.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("Missing provider credential: {0}")]
    MissingCredentials(&'static str),

    #[error("Captcha provider failed: {0}")]
    Captcha(String),

    #[error("No OTP message found after {attempts} attempts")]
    OtpNotFound { attempts: u32 },

    #[error("Challenge provider request failed: {0}")]
    Provider(#[from] reqwest::Error),
}

/// Failures of the authentication state machine. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Password reset required")]
    PasswordResetRequired,

    #[error("OTP send limit exceeded for today")]
    OtpExhausted,

    #[error("Challenge resolution failed: {0}")]
    Challenge(#[from] ChallengeError),

    #[error("Authentication did not settle after {0} page transitions")]
    TooManyTransitions(u32),

    #[error("Browser driver failed during authentication: {0}")]
    Driver(#[source] anyhow::Error),
}

/// Failures while switching the live account context.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("Account {account} / market {market} is not in the catalog")]
    NotInCatalog { account: Id, market: Id },

    #[error("Switch to {expected_account}/{expected_market} landed on {actual:?}")]
    Mismatch {
        expected_account: Id,
        expected_market: Id,
        actual: Option<ActiveContext>,
    },

    #[error("Browser driver failed during account switch: {0}")]
    Driver(#[source] anyhow::Error),
}

/// Failures turning a completed artifact into a record. Local to one artifact.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Artifact path {path} does not match merchant/marketplace/report/period/file")]
    Path { path: PathBuf },

    #[error("Invalid period folder {0:?}: expected YYYY-MM-DD_YYYY-MM-DD")]
    Period(String),

    #[error("Unknown report id {0:?}")]
    UnknownReport(String),

    #[error("Failed to read table {path}: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Failures detecting completion of a download.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Download in {dir} did not stabilize after {polls} polls")]
    TimedOut { dir: PathBuf, polls: u32 },

    #[error("Failed to inspect download directory {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Umbrella error for a run; the error item of the output stream.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Switch(#[from] SwitchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Browser driver failed: {0}")]
    Driver(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid run configuration: {0}")]
    Config(String),
}
