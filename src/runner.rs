//! Run entry point.
//!
//! A run signs in, walks the account catalog, triggers every report cell and
//! returns a [`ReportStream`] immediately. Browser work happens on one
//! background task; downloads resolve on their own tasks and feed the stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::AccountCatalog;
use crate::challenge::ChallengeResolver;
use crate::config::{BrowserOptions, Config, RunOptions, TimingConfig};
use crate::credentials::Settings;
use crate::download::{DownloadTracker, TrackerSummary};
use crate::driver::BrowserDriver;
use crate::error::ReportError;
use crate::extraction::{ExtractionSummary, ReportExtractor};
use crate::models::{Id, ReportDateRange};
use crate::normalize::{ReportStream, TableDecoder};
use crate::session::Authenticator;

/// End-of-run counts, logged once the stream closes and available from
/// [`ReportStream::summary`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pairs_traversed: usize,
    pub pairs_skipped: usize,
    /// Pairs whose every report cell produced a download, in catalog order.
    pub processed_pairs: Vec<(Id, Id)>,
    pub jobs_issued: usize,
    pub cells_abandoned: usize,
    pub reports_skipped: usize,
    pub records_emitted: usize,
    pub artifacts_abandoned: usize,
}

impl RunSummary {
    fn absorb_tracker(&mut self, tracker: TrackerSummary) {
        self.records_emitted = tracker.emitted;
        self.artifacts_abandoned = tracker.abandoned;
    }
}

/// Run settings taken from [`Config`].
#[derive(Debug, Clone)]
pub struct Runner {
    storage_root: PathBuf,
    reports_url: String,
    timing: TimingConfig,
    browser: BrowserOptions,
    channel_capacity: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Runner {
    pub fn new(config: &Config) -> Self {
        Self {
            storage_root: config.storage_root.clone(),
            reports_url: config.reports_url.clone(),
            timing: config.timing.clone(),
            browser: config.browser.clone(),
            channel_capacity: config.channel_capacity,
        }
    }

    pub fn with_reports_url(mut self, url: impl Into<String>) -> Self {
        self.reports_url = url.into();
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Launch Chromium and start a run against the live dashboard.
    #[cfg(feature = "chromium")]
    pub async fn run(
        &self,
        settings: Settings,
        ranges: Vec<ReportDateRange>,
        options: RunOptions,
    ) -> Result<ReportStream, ReportError> {
        use crate::challenge::ProviderResolver;
        use crate::driver::ChromiumDriver;
        use crate::normalize::CsvTableDecoder;

        validate_ranges(&ranges)?;
        let resolver = ProviderResolver::from_settings(&settings, &self.timing);
        let driver =
            ChromiumDriver::launch(&self.browser, &self.storage_root.join(".chrome-profile"))
                .await?;

        self.run_with(
            driver,
            Arc::new(resolver),
            Arc::new(CsvTableDecoder),
            settings,
            ranges,
            options,
        )
        .await
    }

    /// Start a run on an already launched driver.
    ///
    /// Setup failures are returned directly and the driver is closed. Once
    /// the stream is returned, a fatal failure arrives as its last item.
    pub async fn run_with<D>(
        &self,
        driver: D,
        resolver: Arc<dyn ChallengeResolver>,
        decoder: Arc<dyn TableDecoder>,
        settings: Settings,
        ranges: Vec<ReportDateRange>,
        options: RunOptions,
    ) -> Result<ReportStream, ReportError>
    where
        D: BrowserDriver + 'static,
    {
        let session_id = Id::new_session();
        let session_dir = self.storage_root.join(session_id.as_str());

        let setup = async {
            validate_ranges(&ranges)?;
            tokio::fs::create_dir_all(&session_dir).await?;
            driver.goto(&self.reports_url).await?;
            Ok::<_, ReportError>(())
        };
        if let Err(e) = setup.await {
            tracing::error!(error = %e, "Run setup failed");
            if let Err(close) = driver.close().await {
                tracing::warn!(error = %close, "Failed to close browser");
            }
            return Err(e);
        }

        tracing::info!(
            session = %session_id,
            dir = %session_dir.display(),
            ranges = ranges.len(),
            "Run started"
        );

        let (tx, summary_tx, stream) = ReportStream::channel(self.channel_capacity);
        let pipeline = Pipeline {
            driver,
            resolver,
            settings,
            ranges,
            options,
            session_dir,
            reports_url: self.reports_url.clone(),
            timing: self.timing.clone(),
        };

        tokio::spawn(async move {
            let mut tracker = DownloadTracker::new(
                tx.clone(),
                decoder,
                pipeline.timing.poll_interval,
                pipeline.timing.max_polls,
            );
            let result = pipeline.traverse(&mut tracker).await;
            let tracked = tracker.finish().await;

            if let Err(e) = pipeline.driver.close().await {
                tracing::warn!(error = %e, "Failed to close browser");
            }

            match result {
                Ok(mut summary) => {
                    summary.absorb_tracker(tracked);
                    tracing::info!(
                        session = %session_id,
                        pairs_traversed = summary.pairs_traversed,
                        pairs_skipped = summary.pairs_skipped,
                        pairs_processed = summary.processed_pairs.len(),
                        jobs_issued = summary.jobs_issued,
                        cells_abandoned = summary.cells_abandoned,
                        reports_skipped = summary.reports_skipped,
                        records_emitted = summary.records_emitted,
                        artifacts_abandoned = summary.artifacts_abandoned,
                        "Run complete"
                    );
                    let _ = summary_tx.send(summary);
                }
                Err(e) => {
                    tracing::error!(
                        session = %session_id,
                        records_emitted = tracked.emitted,
                        error = %e,
                        "Run failed"
                    );
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(stream)
    }
}

/// Start a run with the default configuration.
#[cfg(feature = "chromium")]
pub async fn run(
    settings: Settings,
    ranges: Vec<ReportDateRange>,
    options: RunOptions,
) -> Result<ReportStream, ReportError> {
    Runner::default().run(settings, ranges, options).await
}

fn validate_ranges(ranges: &[ReportDateRange]) -> Result<(), ReportError> {
    if ranges.is_empty() {
        return Err(ReportError::Config("no date ranges given".to_string()));
    }
    if let Some(range) = ranges.iter().find(|r| r.end < r.start) {
        return Err(ReportError::Config(format!(
            "date range {} ends before it starts",
            range.folder_name()
        )));
    }
    Ok(())
}

/// Everything the background task owns.
struct Pipeline<D> {
    driver: D,
    resolver: Arc<dyn ChallengeResolver>,
    settings: Settings,
    ranges: Vec<ReportDateRange>,
    options: RunOptions,
    session_dir: PathBuf,
    reports_url: String,
    timing: TimingConfig,
}

impl<D: BrowserDriver> Pipeline<D> {
    async fn traverse(&self, tracker: &mut DownloadTracker) -> Result<RunSummary, ReportError> {
        Authenticator::new(
            &self.driver,
            self.resolver.as_ref(),
            &self.settings,
            &self.timing,
        )
        .authenticate()
        .await?;

        let mut catalog = AccountCatalog::new(self.options.exclude.clone());
        catalog.discover(&self.driver).await?;

        let extractor = ReportExtractor::new(
            &self.driver,
            &self.session_dir,
            &self.ranges,
            &self.options.reports,
            &self.timing,
        );
        let mut summary = RunSummary::default();
        let mut extracted = ExtractionSummary::default();

        for (account_id, market_id) in catalog.targets() {
            let active = match catalog
                .active()
                .filter(|active| active.is_pair(&account_id, &market_id))
                .cloned()
            {
                Some(active) => active,
                None => {
                    catalog
                        .switch_to(
                            &self.driver,
                            &account_id,
                            &market_id,
                            &self.reports_url,
                            self.timing.settle,
                        )
                        .await?
                }
            };

            if self
                .options
                .exclude
                .excludes_merchant(active.account_id.as_str())
            {
                tracing::info!(
                    account = %account_id,
                    market = %market_id,
                    merchant = %active.account_id,
                    "Merchant excluded, skipping"
                );
                summary.pairs_skipped += 1;
                continue;
            }

            let pair = extractor.extract(&active, tracker).await?;
            if pair.cells_abandoned == 0 {
                catalog.mark_processed(&account_id, &market_id);
            } else {
                tracing::warn!(
                    account = %account_id,
                    market = %market_id,
                    cells_abandoned = pair.cells_abandoned,
                    "Pair left unprocessed"
                );
            }
            extracted += pair;
            summary.pairs_traversed += 1;
        }

        summary.processed_pairs = catalog.processed_pairs();
        summary.jobs_issued = extracted.jobs_issued;
        summary.cells_abandoned = extracted.cells_abandoned;
        summary.reports_skipped = extracted.reports_skipped;
        Ok(summary)
    }
}
