use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::credentials::{CredentialConfig, Settings};
use crate::duration::deserialize_duration;
use crate::models::{ReportDateRange, ReportType};

/// Dashboard page listing the business reports.
pub const DEFAULT_REPORTS_URL: &str =
    "https://sellercentral.amazon.com/gp/site-metrics/report.html#&reportID=eD0RCS";

fn default_storage_root() -> PathBuf {
    PathBuf::from(".business-reports")
}

fn default_reports_url() -> String {
    DEFAULT_REPORTS_URL.to_string()
}

fn enabled() -> bool {
    true
}

/// Per-report enable flags, keyed by report short name. All default to on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportToggles {
    #[serde(rename = "SalesTraffic", default = "enabled")]
    pub sales_traffic: bool,
    #[serde(rename = "DetailSalesTraffic", default = "enabled")]
    pub detail_sales_traffic: bool,
    #[serde(rename = "SellerPerformance", default = "enabled")]
    pub seller_performance: bool,
    #[serde(rename = "DetailSalesTrafficBySKU", default = "enabled")]
    pub detail_sales_traffic_by_sku: bool,
    #[serde(rename = "DetailSalesTrafficByParent", default = "enabled")]
    pub detail_sales_traffic_by_parent: bool,
    #[serde(rename = "DetailSalesTrafficByChild", default = "enabled")]
    pub detail_sales_traffic_by_child: bool,
    #[serde(rename = "BrandPerformance", default = "enabled")]
    pub brand_performance: bool,
}

impl Default for ReportToggles {
    fn default() -> Self {
        Self::all(true)
    }
}

impl ReportToggles {
    pub fn all(on: bool) -> Self {
        Self {
            sales_traffic: on,
            detail_sales_traffic: on,
            seller_performance: on,
            detail_sales_traffic_by_sku: on,
            detail_sales_traffic_by_parent: on,
            detail_sales_traffic_by_child: on,
            brand_performance: on,
        }
    }

    /// Only the given report enabled.
    pub fn only(report: ReportType) -> Self {
        let mut toggles = Self::all(false);
        toggles.set(report, true);
        toggles
    }

    pub fn enabled(&self, report: ReportType) -> bool {
        match report {
            ReportType::SalesTrafficTimeSeries => self.sales_traffic,
            ReportType::DetailSalesTrafficByTime => self.detail_sales_traffic,
            ReportType::SellerPerformanceForMerchants => self.seller_performance,
            ReportType::DetailSalesTrafficBySku => self.detail_sales_traffic_by_sku,
            ReportType::DetailSalesTrafficByParentItem => self.detail_sales_traffic_by_parent,
            ReportType::DetailSalesTrafficByChildItem => self.detail_sales_traffic_by_child,
            ReportType::BrandPerformance => self.brand_performance,
        }
    }

    pub fn set(&mut self, report: ReportType, on: bool) {
        let flag = match report {
            ReportType::SalesTrafficTimeSeries => &mut self.sales_traffic,
            ReportType::DetailSalesTrafficByTime => &mut self.detail_sales_traffic,
            ReportType::SellerPerformanceForMerchants => &mut self.seller_performance,
            ReportType::DetailSalesTrafficBySku => &mut self.detail_sales_traffic_by_sku,
            ReportType::DetailSalesTrafficByParentItem => &mut self.detail_sales_traffic_by_parent,
            ReportType::DetailSalesTrafficByChildItem => &mut self.detail_sales_traffic_by_child,
            ReportType::BrandPerformance => &mut self.brand_performance,
        };
        *flag = on;
    }

    /// Enabled reports in extraction order.
    pub fn enabled_reports(&self) -> impl Iterator<Item = ReportType> + '_ {
        ReportType::ALL.into_iter().filter(|r| self.enabled(*r))
    }
}

/// Merchant and marketplace ids to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusions {
    #[serde(rename = "merchantIds", default)]
    pub merchant_ids: HashSet<String>,
    #[serde(rename = "marketplaceIds", default)]
    pub marketplace_ids: HashSet<String>,
}

impl Exclusions {
    pub fn excludes_merchant(&self, id: &str) -> bool {
        self.merchant_ids.contains(id)
    }

    pub fn excludes_marketplace(&self, id: &str) -> bool {
        self.marketplace_ids.contains(id)
    }
}

/// Caller options for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub reports: ReportToggles,
    pub exclude: Exclusions,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_polls() -> u32 {
    90
}

fn default_download_wait() -> Duration {
    Duration::from_secs(10)
}

fn default_settle() -> Duration {
    Duration::from_secs(5)
}

fn default_otp_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_otp_retry_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_otp_attempts() -> u32 {
    4
}

fn default_max_transitions() -> u32 {
    12
}

fn default_captcha_poll() -> Duration {
    Duration::from_secs(5)
}

fn default_captcha_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Waits, poll intervals and retry ceilings. None of these are load-bearing;
/// they pace the run against a slow dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Interval between size observations of an in-flight download.
    #[serde(default = "default_poll_interval", deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,

    /// Observations after which an unstable download is abandoned.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// How long to wait for an export to create a file before retrying it.
    #[serde(default = "default_download_wait", deserialize_with = "deserialize_duration")]
    pub download_wait: Duration,

    /// Pause after submits and navigations while the dashboard re-renders.
    #[serde(default = "default_settle", deserialize_with = "deserialize_duration")]
    pub settle: Duration,

    /// Pause before the first OTP lookup so the message can arrive.
    #[serde(default = "default_otp_initial_delay", deserialize_with = "deserialize_duration")]
    pub otp_initial_delay: Duration,

    #[serde(default = "default_otp_retry_delay", deserialize_with = "deserialize_duration")]
    pub otp_retry_delay: Duration,

    #[serde(default = "default_otp_attempts")]
    pub otp_attempts: u32,

    /// Ceiling on authentication page transitions.
    #[serde(default = "default_max_transitions")]
    pub max_transitions: u32,

    #[serde(default = "default_captcha_poll", deserialize_with = "deserialize_duration")]
    pub captcha_poll: Duration,

    #[serde(default = "default_captcha_timeout", deserialize_with = "deserialize_duration")]
    pub captcha_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_polls: default_max_polls(),
            download_wait: default_download_wait(),
            settle: default_settle(),
            otp_initial_delay: default_otp_initial_delay(),
            otp_retry_delay: default_otp_retry_delay(),
            otp_attempts: default_otp_attempts(),
            max_transitions: default_max_transitions(),
            captcha_poll: default_captcha_poll(),
            captcha_timeout: default_captcha_timeout(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_window_size() -> (u32, u32) {
    (1600, 900)
}

fn default_browser_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_keystroke_delay_ms() -> (u64, u64) {
    (100, 400)
}

/// Browser launch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserOptions {
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Chrome/Chromium binary. Looked up on PATH and in common locations when unset.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    #[serde(default = "default_window_size")]
    pub window_size: (u32, u32),

    /// Timeout for navigation and element readiness.
    #[serde(default = "default_browser_timeout", deserialize_with = "deserialize_duration")]
    pub default_timeout: Duration,

    /// Random per-keystroke delay range in milliseconds.
    #[serde(default = "default_keystroke_delay_ms")]
    pub keystroke_delay_ms: (u64, u64),
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_executable: None,
            window_size: default_window_size(),
            default_timeout: default_browser_timeout(),
            keystroke_delay_ms: default_keystroke_delay_ms(),
        }
    }
}

/// Application configuration, loaded from `business-reports.toml`.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Root under which each run creates its session directory.
    /// If relative, resolved from the config file location.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    #[serde(default = "default_reports_url")]
    pub reports_url: String,

    /// Ordered `[start, end]` pairs.
    #[serde(default)]
    pub dates: Vec<[NaiveDate; 2]>,

    /// Inline login and provider secrets.
    #[serde(default)]
    pub settings: Option<Settings>,

    /// Credential backend used when `settings` is absent.
    #[serde(default)]
    pub credentials: Option<CredentialConfig>,

    #[serde(default)]
    pub options: RunOptions,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub browser: BrowserOptions,

    /// Capacity of the output channel; producers wait when it is full.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    16
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            reports_url: default_reports_url(),
            dates: Vec::new(),
            settings: None,
            credentials: None,
            options: RunOptions::default(),
            timing: TimingConfig::default(),
            browser: BrowserOptions::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Some(config_dir) = path.parent() {
            config.storage_root = config.resolve_storage_root(config_dir);
        }

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the storage root relative to `config_dir` unless it is absolute.
    pub fn resolve_storage_root(&self, config_dir: &Path) -> PathBuf {
        if self.storage_root.is_absolute() {
            self.storage_root.clone()
        } else {
            config_dir.join(&self.storage_root)
        }
    }

    /// Configured date ranges, validated.
    pub fn date_ranges(&self) -> Result<Vec<ReportDateRange>> {
        self.dates
            .iter()
            .map(|[start, end]| {
                if end < start {
                    anyhow::bail!("Date range {start}..{end} ends before it starts");
                }
                Ok(ReportDateRange::new(*start, *end))
            })
            .collect()
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./business-reports.toml` if it exists in current directory
/// 2. `~/.local/share/business-reports/business-reports.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("business-reports.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("business-reports").join("business-reports.toml");
    }

    local_config
}
