#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use business_reports::challenge::ChallengeResolver;
use business_reports::config::{RunOptions, TimingConfig};
use business_reports::credentials::Settings;
use business_reports::driver::selectors::*;
use business_reports::driver::BrowserDriver;
use business_reports::error::ChallengeError;
use business_reports::models::{NormalizedRecord, ReportDateRange};
use business_reports::normalize::TableDecoder;
use business_reports::{ReportError, ReportStream, RunSummary, Runner};
use futures::StreamExt;
use secrecy::SecretString;
use serde_json::{json, Value};

pub const EMAIL: &str = "seller@example.com";
pub const PASSWORD: &str = "hunter2";
pub const CAPTCHA_URL: &str = "https://images.example.com/captcha.jpg";
pub const CAPTCHA_TEXT: &str = "xkcd42";
pub const OTP_CODE: &str = "123456";

pub const SAMPLE_CSV: &str =
    "\"Date\",\"Units Ordered\",\"Ordered Product Sales\"\n\"01/01/2024\",\"5\",\"$50.00\"\n";

pub fn settings() -> Settings {
    Settings {
        login_email: SecretString::from(EMAIL.to_string()),
        login_password: SecretString::from(PASSWORD.to_string()),
        ..Settings::default()
    }
}

/// Timing with every pause removed and fast download polling.
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        poll_interval: Duration::from_millis(10),
        max_polls: 20,
        download_wait: Duration::ZERO,
        settle: Duration::ZERO,
        otp_initial_delay: Duration::ZERO,
        otp_retry_delay: Duration::ZERO,
        otp_attempts: 4,
        max_transitions: 12,
        captcha_poll: Duration::ZERO,
        captcha_timeout: Duration::from_secs(1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    OtpSend,
    OtpCode,
    PasswordReset,
    Reports,
}

#[derive(Debug, Clone)]
pub struct FakeAccount {
    pub id: String,
    pub name: String,
    pub merchant_id: String,
    pub markets: Vec<String>,
}

impl FakeAccount {
    pub fn new(id: &str, markets: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: format!("Account {id}"),
            merchant_id: format!("M{id}"),
            markets: markets.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug)]
pub struct DashboardState {
    pub screen: Screen,
    pub authenticated: bool,
    pub captcha: bool,
    pub require_otp: bool,
    pub send_limit_exceeded: bool,
    pub password_reset: bool,
    pub accounts: Vec<FakeAccount>,
    /// (account index, market index).
    pub active: (usize, usize),
    /// Anchors whose next direct click fails.
    pub broken_anchors: HashSet<String>,
    /// Where every switch lands instead of the clicked pair.
    pub redirect: Option<(usize, usize)>,
    pub offered_reports: HashSet<String>,
    pub switcher_open: bool,
    pub switcher_revealed: bool,
    pub open_report: Option<String>,
    pub menu_display: String,
    pub download_dir: Option<PathBuf>,
    /// Export clicks that produce nothing before one produces a file.
    pub dead_exports: u32,
    pub never_download: bool,
    pub csv_body: String,
    pub typed: Vec<(String, String)>,
    pub actions: Vec<String>,
    pub catalog_reads: u32,
    pub downloads: u32,
    pub closed: bool,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            screen: Screen::SignIn,
            authenticated: false,
            captcha: false,
            require_otp: false,
            send_limit_exceeded: false,
            password_reset: false,
            accounts: vec![FakeAccount::new("A1", &["US"])],
            active: (0, 0),
            broken_anchors: HashSet::new(),
            redirect: None,
            offered_reports: [
                "SalesTrafficTimeSeries",
                "DetailSalesTrafficByTime",
                "SellerPerformanceForMerchants",
                "DetailSalesTrafficBySKU",
                "DetailSalesTrafficByParentItem",
                "DetailSalesTrafficByChildItem",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            switcher_open: false,
            switcher_revealed: false,
            open_report: None,
            menu_display: "none".to_string(),
            download_dir: None,
            dead_exports: 0,
            never_download: false,
            csv_body: SAMPLE_CSV.to_string(),
            typed: Vec::new(),
            actions: Vec::new(),
            catalog_reads: 0,
            downloads: 0,
            closed: false,
        }
    }
}

impl DashboardState {
    fn typed_value(&self, selector: &str) -> Option<&str> {
        self.typed
            .iter()
            .rev()
            .find(|(s, _)| s == selector)
            .map(|(_, v)| v.as_str())
    }

    fn title(&self) -> &'static str {
        match self.screen {
            Screen::SignIn => TITLE_SIGN_IN,
            Screen::OtpSend | Screen::OtpCode => TITLE_TWO_STEP,
            Screen::PasswordReset => "",
            Screen::Reports => "Business Reports",
        }
    }

    fn present(&self, selector: &str) -> bool {
        let reports = self.screen == Screen::Reports;
        match selector {
            EMAIL_INPUT | PASSWORD_INPUT | SIGN_IN_SUBMIT => self.screen == Screen::SignIn,
            CAPTCHA_IMAGE | CAPTCHA_GUESS => self.screen == Screen::SignIn && self.captcha,
            OTP_SEND_CODE => self.screen == Screen::OtpSend,
            OTP_SEND_LIMIT_ALERT => self.screen == Screen::OtpSend && self.send_limit_exceeded,
            OTP_CODE_INPUT | OTP_SUBMIT => self.screen == Screen::OtpCode,
            SWITCHER | SWITCHER_BUTTON | PARTNER_SWITCHER => reports,
            SWITCHER_CHECKBOX => reports && self.switcher_open,
            DATA_TABLE | EXPORT_CONTROL | FROM_DATE | TO_DATE | DOWNLOAD_CSV => {
                reports && self.open_report.is_some()
            }
            other => {
                if let Some(id) = other
                    .strip_prefix("a#report_")
                    .or_else(|| other.strip_prefix("#report_"))
                {
                    reports && self.offered_reports.contains(id)
                } else {
                    false
                }
            }
        }
    }

    fn pair_of_anchor(&self, selector: &str) -> Option<(usize, usize)> {
        let rest = selector.strip_prefix("#merchant_")?;
        let (account, market) = rest.split_once(" a#")?;
        let a = self.accounts.iter().position(|acc| acc.id == account)?;
        let m = self.accounts[a].markets.iter().position(|mk| mk == market)?;
        Some((a, m))
    }

    fn submit_sign_in(&mut self) {
        let credentials_ok = self.typed_value(EMAIL_INPUT) == Some(EMAIL)
            && self.typed_value(PASSWORD_INPUT) == Some(PASSWORD);
        let captcha_ok = !self.captcha || self.typed_value(CAPTCHA_GUESS) == Some(CAPTCHA_TEXT);
        self.typed.clear();
        if !(credentials_ok && captcha_ok) {
            return;
        }
        self.captcha = false;
        if self.password_reset {
            self.screen = Screen::PasswordReset;
        } else if self.require_otp {
            self.screen = Screen::OtpSend;
        } else {
            self.sign_in_complete();
        }
    }

    fn sign_in_complete(&mut self) {
        self.authenticated = true;
        self.load_reports();
    }

    fn load_reports(&mut self) {
        self.screen = Screen::Reports;
        self.switcher_open = false;
        self.switcher_revealed = false;
        self.open_report = None;
        self.menu_display = "none".to_string();
    }

    fn export(&mut self) -> Result<()> {
        self.menu_display = "none".to_string();
        if self.dead_exports > 0 {
            self.dead_exports -= 1;
            return Ok(());
        }
        if self.never_download {
            return Ok(());
        }
        let dir = self
            .download_dir
            .clone()
            .ok_or_else(|| anyhow!("download dir not set"))?;
        self.downloads += 1;
        std::fs::write(dir.join("BusinessReport.csv"), &self.csv_body)?;
        Ok(())
    }
}

/// In-memory seller dashboard driven through [`BrowserDriver`].
#[derive(Clone, Default)]
pub struct FakeDashboard {
    state: Arc<Mutex<DashboardState>>,
}

impl FakeDashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(self, accounts: Vec<FakeAccount>) -> Self {
        self.state().accounts = accounts;
        self
    }

    pub fn with_active(self, account: usize, market: usize) -> Self {
        self.state().active = (account, market);
        self
    }

    pub fn with_captcha(self) -> Self {
        self.state().captcha = true;
        self
    }

    pub fn with_otp(self) -> Self {
        self.state().require_otp = true;
        self
    }

    pub fn with_send_limit_exceeded(self) -> Self {
        let mut state = self.state();
        state.require_otp = true;
        state.send_limit_exceeded = true;
        drop(state);
        self
    }

    pub fn with_password_reset(self) -> Self {
        self.state().password_reset = true;
        self
    }

    pub fn signed_in(self) -> Self {
        self.state().sign_in_complete();
        self
    }

    pub fn with_broken_anchor(self, account: &str, market: &str) -> Self {
        self.state()
            .broken_anchors
            .insert(market_anchor(account, market));
        self
    }

    pub fn with_redirect(self, account: usize, market: usize) -> Self {
        self.state().redirect = Some((account, market));
        self
    }

    pub fn with_report(self, report_id: &str) -> Self {
        self.state().offered_reports.insert(report_id.to_string());
        self
    }

    pub fn with_dead_exports(self, count: u32) -> Self {
        self.state().dead_exports = count;
        self
    }

    pub fn with_no_downloads(self) -> Self {
        self.state().never_download = true;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, DashboardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn actions(&self) -> Vec<String> {
        self.state().actions.clone()
    }

    fn record(&self, action: String) -> MutexGuard<'_, DashboardState> {
        let mut state = self.state();
        state.actions.push(action);
        state
    }
}

#[async_trait]
impl BrowserDriver for FakeDashboard {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.record(format!("goto {url}"));
        if state.authenticated {
            state.load_reports();
        } else if state.screen == Screen::Reports {
            state.screen = Screen::SignIn;
        }
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.state().title().to_string())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self.state().present(selector))
    }

    async fn wait_for(&self, selector: &str, _visible: bool) -> Result<()> {
        if self.state().present(selector) {
            Ok(())
        } else {
            bail!("timed out waiting for {selector}")
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.record(format!("click {selector}"));

        if let Some((a, m)) = state.pair_of_anchor(selector) {
            if state.broken_anchors.remove(selector) || !state.switcher_revealed {
                bail!("element not clickable: {selector}");
            }
            state.active = state.redirect.unwrap_or((a, m));
            state.switcher_open = false;
            state.switcher_revealed = false;
            return Ok(());
        }

        if !state.present(selector) {
            bail!("element not found: {selector}");
        }
        match selector {
            SIGN_IN_SUBMIT => state.submit_sign_in(),
            OTP_SEND_CODE => state.screen = Screen::OtpCode,
            OTP_SUBMIT => {
                if state.typed_value(OTP_CODE_INPUT) == Some(OTP_CODE) {
                    state.sign_in_complete();
                }
            }
            SWITCHER_BUTTON => state.switcher_open = true,
            DOWNLOAD_CSV => state.export()?,
            other => {
                if let Some(id) = other.strip_prefix("a#report_") {
                    state.open_report = Some(id.to_string());
                }
            }
        }
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<()> {
        let mut state = self.record(format!("clear {selector}"));
        if !state.present(selector) {
            bail!("element not found: {selector}");
        }
        state.typed.retain(|(s, _)| s != selector);
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let mut state = self.record(format!("type {selector}"));
        if !state.present(selector) {
            bail!("element not found: {selector}");
        }
        let existing = state.typed_value(selector).unwrap_or_default().to_string();
        state.typed.retain(|(s, _)| s != selector);
        state
            .typed
            .push((selector.to_string(), format!("{existing}{text}")));
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        self.record(format!("press {key} {selector}"));
        Ok(())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let state = self.state();
        if !state.present(selector) {
            return Ok(None);
        }
        let (a, m) = state.active;
        let account = &state.accounts[a];
        let value = match (selector, name) {
            (CAPTCHA_IMAGE, "src") => Some(CAPTCHA_URL.to_string()),
            (PARTNER_SWITCHER, ATTR_MERCHANT_SELECTION) => {
                Some(format!("{MERCHANT_ID_PREFIX}{}", account.merchant_id))
            }
            (PARTNER_SWITCHER, ATTR_MARKETPLACE_SELECTION) => Some(account.markets[m].clone()),
            (PARTNER_SWITCHER, ATTR_PARTNER_SELECTION) => {
                Some(format!("{PARTNER_ID_PREFIX}{}", account.id))
            }
            _ => None,
        };
        Ok(value)
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let mut state = self.state();
        let value = match script {
            REVEAL_SWITCHER_SCRIPT => {
                state.actions.push("reveal switcher".to_string());
                if state.switcher_open {
                    state.switcher_revealed = true;
                }
                Value::Null
            }
            CATALOG_SCRIPT => {
                state.catalog_reads += 1;
                Value::Array(
                    state
                        .accounts
                        .iter()
                        .map(|a| json!({"id": a.id, "name": a.name, "markets": a.markets}))
                        .collect(),
                )
            }
            SHOW_EXPORT_MENU_SCRIPT => {
                state.menu_display = "block".to_string();
                Value::Null
            }
            EXPORT_MENU_DISPLAY_SCRIPT => Value::String(state.menu_display.clone()),
            other => bail!("unexpected script: {other}"),
        };
        Ok(value)
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        self.record(format!("download dir {}", dir.display()))
            .download_dir = Some(dir.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record("close".to_string()).closed = true;
        Ok(())
    }
}

/// Resolver answering every challenge with fixed values.
#[derive(Debug, Default)]
pub struct StubResolver {
    pub captcha_calls: Mutex<u32>,
    pub otp_calls: Mutex<u32>,
    pub fail_otp: bool,
}

impl StubResolver {
    pub fn failing_otp() -> Self {
        Self {
            fail_otp: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChallengeResolver for StubResolver {
    async fn resolve_captcha(&self, image_url: &str) -> Result<String, ChallengeError> {
        *self.captcha_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        if image_url != CAPTCHA_URL {
            return Err(ChallengeError::Captcha(format!("unexpected image {image_url}")));
        }
        Ok(CAPTCHA_TEXT.to_string())
    }

    async fn resolve_otp(&self) -> Result<String, ChallengeError> {
        *self.otp_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        if self.fail_otp {
            return Err(ChallengeError::OtpNotFound { attempts: 4 });
        }
        Ok(OTP_CODE.to_string())
    }
}

/// Start a run against `dashboard` with fast timing and the stub resolver.
pub async fn start_run(
    dashboard: &FakeDashboard,
    storage_root: &Path,
    ranges: Vec<ReportDateRange>,
    options: RunOptions,
    decoder: Arc<dyn TableDecoder>,
) -> Result<ReportStream, ReportError> {
    Runner::default()
        .with_storage_root(storage_root)
        .with_reports_url("https://dashboard.example.com/reports")
        .with_timing(fast_timing())
        .run_with(
            dashboard.clone(),
            Arc::new(StubResolver::default()),
            decoder,
            settings(),
            ranges,
            options,
        )
        .await
}

/// Drain the stream to its end.
pub async fn drain(stream: ReportStream) -> Vec<Result<NormalizedRecord, ReportError>> {
    stream.collect().await
}

/// Drain the stream, then read the run summary.
pub async fn drain_with_summary(
    mut stream: ReportStream,
) -> (Vec<Result<NormalizedRecord, ReportError>>, Option<RunSummary>) {
    let items = stream.by_ref().collect().await;
    (items, stream.summary().await)
}

/// `(account, market)` pairs as plain strings.
pub fn pairs(summary: &RunSummary) -> Vec<(String, String)> {
    summary
        .processed_pairs
        .iter()
        .map(|(a, m)| (a.to_string(), m.to_string()))
        .collect()
}

pub fn january() -> ReportDateRange {
    ReportDateRange::parse("2024-01-01:2024-01-31").unwrap_or_else(|e| panic!("{e}"))
}

pub fn february() -> ReportDateRange {
    ReportDateRange::parse("2024-02-01:2024-02-29").unwrap_or_else(|e| panic!("{e}"))
}
