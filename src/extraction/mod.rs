//! Report extraction for one live account context.
//!
//! Every (report type, date range) cell gets its own download directory.
//! Exports are triggered here and handed to the [`DownloadTracker`]; nothing
//! waits for a download to finish before moving to the next cell.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;

use crate::config::{ReportToggles, TimingConfig};
use crate::download::{download_started, DownloadTracker};
use crate::driver::selectors::*;
use crate::driver::{pause, BrowserDriver};
use crate::models::{ActiveContext, ReportDateRange, ReportJob, ReportType};

/// Format the dashboard's date fields expect.
const DATE_INPUT_FORMAT: &str = "%m/%d/%Y";

/// Times an export is triggered for one cell before it is given up.
const EXPORT_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOutcome {
    /// A download started and was handed to the tracker.
    Registered,
    /// No file appeared after retrying the export.
    Abandoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub jobs_issued: usize,
    pub cells_abandoned: usize,
    /// Optional reports the live account does not offer.
    pub reports_skipped: usize,
}

impl std::ops::AddAssign for ExtractionSummary {
    fn add_assign(&mut self, other: Self) {
        self.jobs_issued += other.jobs_issued;
        self.cells_abandoned += other.cells_abandoned;
        self.reports_skipped += other.reports_skipped;
    }
}

pub struct ReportExtractor<'a> {
    driver: &'a dyn BrowserDriver,
    session_dir: &'a Path,
    ranges: &'a [ReportDateRange],
    reports: &'a ReportToggles,
    timing: &'a TimingConfig,
}

impl<'a> ReportExtractor<'a> {
    pub fn new(
        driver: &'a dyn BrowserDriver,
        session_dir: &'a Path,
        ranges: &'a [ReportDateRange],
        reports: &'a ReportToggles,
        timing: &'a TimingConfig,
    ) -> Self {
        Self {
            driver,
            session_dir,
            ranges,
            reports,
            timing,
        }
    }

    /// `<session>/<merchant>/<marketplace>/<report id>/<start>_<end>`.
    pub fn cell_dir(
        &self,
        context: &ActiveContext,
        report: ReportType,
        range: &ReportDateRange,
    ) -> PathBuf {
        self.session_dir
            .join(context.account_id.as_str())
            .join(context.market_id.as_str())
            .join(report.id())
            .join(range.folder_name())
    }

    /// Trigger every enabled report for every range in the live context.
    pub async fn extract(
        &self,
        context: &ActiveContext,
        tracker: &mut DownloadTracker,
    ) -> anyhow::Result<ExtractionSummary> {
        let mut summary = ExtractionSummary::default();

        for report in self.reports.enabled_reports() {
            if report.is_optional() && !self.driver.exists(&report_marker(report.id())).await? {
                tracing::info!(
                    merchant = %context.account_id,
                    marketplace = %context.market_id,
                    report = report.short_name(),
                    "Report not offered, skipping"
                );
                summary.reports_skipped += 1;
                continue;
            }

            self.open_report(report).await?;
            tracing::info!(
                merchant = %context.account_id,
                marketplace = %context.market_id,
                report = report.short_name(),
                "Extracting report"
            );

            for range in self.ranges {
                match self.extract_cell(context, report, range, tracker).await? {
                    CellOutcome::Registered => summary.jobs_issued += 1,
                    CellOutcome::Abandoned => summary.cells_abandoned += 1,
                }
            }
        }

        Ok(summary)
    }

    async fn open_report(&self, report: ReportType) -> anyhow::Result<()> {
        let link = report_link(report.id());
        self.driver.wait_for(&link, false).await?;
        self.driver.click(&link).await?;
        self.driver
            .wait_for(DATA_TABLE, true)
            .await
            .with_context(|| format!("Report {} did not render", report.id()))
    }

    async fn extract_cell(
        &self,
        context: &ActiveContext,
        report: ReportType,
        range: &ReportDateRange,
        tracker: &mut DownloadTracker,
    ) -> anyhow::Result<CellOutcome> {
        let dir = self.cell_dir(context, report, range);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create download dir: {}", dir.display()))?;
        self.driver.set_download_dir(&dir).await?;

        self.set_date(FROM_DATE, range.start).await?;
        self.set_date(TO_DATE, range.end).await?;
        self.driver.press_key(TO_DATE, "Enter").await?;
        pause(self.timing.settle).await;

        self.driver.wait_for(DATA_TABLE, true).await?;
        self.driver.wait_for(EXPORT_CONTROL, true).await?;

        let job = ReportJob {
            report_type: report,
            account_id: context.account_id.clone(),
            market_id: context.market_id.clone(),
            date_range: *range,
        };

        for attempt in 1..=EXPORT_ATTEMPTS {
            self.trigger_export().await?;
            pause(self.timing.download_wait).await;

            if download_started(&dir).await? {
                tracker.register(job, dir);
                return Ok(CellOutcome::Registered);
            }
            tracing::debug!(job = %job, attempt, "No download yet");
        }

        tracing::warn!(job = %job, "Export produced no file, abandoning cell");
        Ok(CellOutcome::Abandoned)
    }

    async fn set_date(&self, selector: &str, date: NaiveDate) -> anyhow::Result<()> {
        self.driver.clear(selector).await?;
        self.driver
            .type_text(selector, &date.format(DATE_INPUT_FORMAT).to_string())
            .await
    }

    /// Open the export menu and click the CSV entry. The menu closes once the
    /// click registers; if it is still open the click is repeated.
    async fn trigger_export(&self) -> anyhow::Result<()> {
        self.driver.evaluate(SHOW_EXPORT_MENU_SCRIPT).await?;
        self.driver.click(DOWNLOAD_CSV).await?;
        pause(self.timing.settle).await;

        let display = self.driver.evaluate(EXPORT_MENU_DISPLAY_SCRIPT).await?;
        if display.as_str() == Some("block") {
            tracing::debug!("Export menu still open, clicking again");
            self.driver.click(DOWNLOAD_CSV).await?;
        }
        Ok(())
    }
}
