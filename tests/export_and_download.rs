mod support;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use business_reports::config::{ReportToggles, RunOptions};
use business_reports::driver::selectors::DOWNLOAD_CSV;
use business_reports::error::DecodeError;
use business_reports::models::{ReportType, Row};
use business_reports::normalize::{CsvTableDecoder, TableDecoder};
use support::{drain, drain_with_summary, february, january, pairs, start_run, FakeDashboard};
use tempfile::TempDir;

fn one_report() -> RunOptions {
    RunOptions {
        reports: ReportToggles::only(ReportType::SalesTrafficTimeSeries),
        ..RunOptions::default()
    }
}

fn export_clicks(dashboard: &FakeDashboard) -> usize {
    let click = format!("click {DOWNLOAD_CSV}");
    dashboard
        .actions()
        .iter()
        .filter(|a| **a == click)
        .count()
}

#[tokio::test]
async fn export_is_retried_once_when_no_file_appears() -> Result<()> {
    let dir = TempDir::new()?;
    let dashboard = FakeDashboard::new().with_dead_exports(1);

    let (items, summary) = drain_with_summary(
        start_run(
            &dashboard,
            dir.path(),
            vec![january()],
            one_report(),
            Arc::new(CsvTableDecoder),
        )
        .await?,
    )
    .await;

    assert_eq!(items.len(), 1);
    assert!(items[0].is_ok());
    assert_eq!(export_clicks(&dashboard), 2);
    assert_eq!(dashboard.state().downloads, 1);

    // The retry produced the artifact, so the pair is complete.
    let summary = summary.unwrap();
    assert_eq!(summary.cells_abandoned, 0);
    assert_eq!(pairs(&summary), vec![("A1".to_string(), "US".to_string())]);
    Ok(())
}

#[tokio::test]
async fn cell_is_abandoned_after_the_retry() -> Result<()> {
    let dir = TempDir::new()?;
    let dashboard = FakeDashboard::new().with_no_downloads();

    let (items, summary) = drain_with_summary(
        start_run(
            &dashboard,
            dir.path(),
            vec![january(), february()],
            one_report(),
            Arc::new(CsvTableDecoder),
        )
        .await?,
    )
    .await;

    // Both cells give up quietly; the run itself succeeds.
    assert!(items.is_empty());
    assert_eq!(export_clicks(&dashboard), 4);
    assert!(dashboard.state().closed);

    let summary = summary.unwrap();
    assert_eq!(summary.pairs_traversed, 1);
    assert_eq!(summary.cells_abandoned, 2);
    assert!(summary.processed_pairs.is_empty());
    Ok(())
}

/// Fails only for one reporting period.
struct FailingForFebruary;

impl TableDecoder for FailingForFebruary {
    fn decode(&self, path: &Path) -> Result<Vec<Row>, DecodeError> {
        if path.to_string_lossy().contains("2024-02-01_2024-02-29") {
            return Err(DecodeError::Path {
                path: path.to_path_buf(),
            });
        }
        CsvTableDecoder.decode(path)
    }
}

#[tokio::test]
async fn decode_failure_only_drops_its_own_artifact() -> Result<()> {
    let dir = TempDir::new()?;
    let dashboard = FakeDashboard::new();

    let items = drain(
        start_run(
            &dashboard,
            dir.path(),
            vec![january(), february()],
            one_report(),
            Arc::new(FailingForFebruary),
        )
        .await?,
    )
    .await;

    assert_eq!(items.len(), 1);
    let record = items.into_iter().next().unwrap()?;
    assert_eq!(record.period.from.to_string(), "2024-01-01");
    assert_eq!(dashboard.state().downloads, 2);
    Ok(())
}
