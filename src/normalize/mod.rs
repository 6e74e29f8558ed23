//! Turning completed artifacts into [`NormalizedRecord`]s, and the stream
//! they are delivered on.
//!
//! Record metadata comes only from the artifact's storage path
//! (`<session>/<merchant>/<marketplace>/<report id>/<period>/<file>`), never
//! from the file contents.

mod decoder;

pub use decoder::{CsvTableDecoder, TableDecoder};

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::error::{DecodeError, ReportError};
use crate::models::{NormalizedRecord, Period, ReportDateRange, ReportType, Row};
use crate::runner::RunSummary;

pub(crate) type RecordSender = mpsc::Sender<Result<NormalizedRecord, ReportError>>;

/// Metadata carried by an artifact's location in the storage layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPath {
    pub merchant: String,
    pub marketplace: String,
    pub report_id: String,
    pub period: ReportDateRange,
    pub file: PathBuf,
}

impl ArtifactPath {
    pub fn parse(file: &Path) -> Result<Self, DecodeError> {
        let segments: Vec<&str> = file
            .iter()
            .map(|s| s.to_str())
            .collect::<Option<_>>()
            .ok_or_else(|| DecodeError::Path {
                path: file.to_path_buf(),
            })?;

        let [merchant, marketplace, report_id, period, _file] = match segments.as_slice() {
            [.., a, b, c, d, e] => [*a, *b, *c, *d, *e],
            _ => {
                return Err(DecodeError::Path {
                    path: file.to_path_buf(),
                })
            }
        };

        let period = ReportDateRange::from_folder_name(period)
            .ok_or_else(|| DecodeError::Period(period.to_string()))?;

        Ok(Self {
            merchant: merchant.to_string(),
            marketplace: marketplace.to_string(),
            report_id: report_id.to_string(),
            period,
            file: file.to_path_buf(),
        })
    }
}

/// Split a column header into words: on punctuation and whitespace, on
/// lower-to-upper case changes, before the last capital of an acronym that
/// starts a new word, and between letters and digits.
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    for chunk in name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|chunk| !chunk.is_empty())
    {
        let chars: Vec<char> = chunk.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if i > 0 {
                let prev = chars[i - 1];
                let next = chars.get(i + 1).copied();
                let boundary = (prev.is_lowercase() && c.is_uppercase())
                    || (prev.is_alphabetic() && c.is_numeric())
                    || (prev.is_numeric() && c.is_alphabetic())
                    || (prev.is_uppercase()
                        && c.is_uppercase()
                        && next.is_some_and(char::is_lowercase));
                if boundary && !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            current.push(c);
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

/// camelCase a column header: `"Units Ordered"` -> `unitsOrdered`,
/// `"(Parent) ASIN"` -> `parentAsin`.
pub fn canonical_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, word) in words(name).into_iter().enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Build the record for one artifact. Pure in `(path, rows)`.
pub fn normalize(path: &ArtifactPath, rows: Vec<Row>) -> Result<NormalizedRecord, DecodeError> {
    let report = ReportType::from_id(&path.report_id)
        .ok_or_else(|| DecodeError::UnknownReport(path.report_id.clone()))?;

    let rows = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(field, value)| (canonical_field_name(&field), value))
                .collect::<Row>()
        })
        .collect();

    Ok(NormalizedRecord {
        merchant: path.merchant.clone(),
        marketplace: path.marketplace.clone(),
        report: report.short_name().to_string(),
        report_id: report.id().to_string(),
        period: Period {
            from: path.period.start,
            to: path.period.end,
        },
        rows,
    })
}

/// Records of a run in the order their downloads completed.
///
/// Ends after every registered download has completed or been abandoned. A
/// fatal failure shows up as a final `Err` item.
pub struct ReportStream {
    rx: mpsc::Receiver<Result<NormalizedRecord, ReportError>>,
    summary: oneshot::Receiver<RunSummary>,
}

impl ReportStream {
    pub(crate) fn channel(capacity: usize) -> (RecordSender, oneshot::Sender<RunSummary>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (summary_tx, summary) = oneshot::channel();
        (tx, summary_tx, Self { rx, summary })
    }

    pub async fn recv(&mut self) -> Option<Result<NormalizedRecord, ReportError>> {
        self.rx.recv().await
    }

    /// Counts for the finished run. `None` when the run failed.
    ///
    /// Drain the records first: a run whose stream is dropped early stops
    /// delivering and may never finish.
    pub async fn summary(self) -> Option<RunSummary> {
        self.summary.await.ok()
    }
}

impl Stream for ReportStream {
    type Item = Result<NormalizedRecord, ReportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn canonical_names_are_camel_case() {
        let cases = [
            ("Units Ordered", "unitsOrdered"),
            ("(Parent) ASIN", "parentAsin"),
            ("(Child) ASIN", "childAsin"),
            ("SKU", "sku"),
            ("Ordered Product Sales - B2B", "orderedProductSalesB2B"),
            ("Featured Offer (Buy Box) Percentage", "featuredOfferBuyBoxPercentage"),
            ("  Sessions - Total ", "sessionsTotal"),
            ("unitsOrdered", "unitsOrdered"),
            ("\u{feff}Date", "date"),
        ];
        for (input, expected) in cases {
            assert_eq!(canonical_field_name(input), expected, "{input:?}");
        }
    }

    #[test]
    fn record_is_derived_from_path_and_rows() -> anyhow::Result<()> {
        let path = ArtifactPath::parse(Path::new(
            ".business-reports/0b7c/acct123/mktUS/SalesTrafficTimeSeries/2024-01-01_2024-01-31/file.csv",
        ))?;
        let record = normalize(&path, vec![row(&[("Units Ordered", json!("5"))])])?;

        assert_eq!(
            serde_json::to_value(&record)?,
            json!({
                "merchant": "acct123",
                "marketplace": "mktUS",
                "report": "SalesTraffic",
                "reportId": "SalesTrafficTimeSeries",
                "period": {"from": "2024-01-01", "to": "2024-01-31"},
                "rows": [{"unitsOrdered": "5"}],
            })
        );
        assert_eq!(
            record.period.from,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        Ok(())
    }

    #[test]
    fn normalize_keeps_column_order() -> anyhow::Result<()> {
        let path = ArtifactPath::parse(Path::new(
            "m/US/DetailSalesTrafficBySKU/2024-02-01_2024-02-29/report.csv",
        ))?;
        let record = normalize(
            &path,
            vec![row(&[
                ("SKU", json!("ABC")),
                ("(Parent) ASIN", json!("B00")),
                ("Units Ordered", json!(3)),
            ])],
        )?;
        let keys: Vec<_> = record.rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["sku", "parentAsin", "unitsOrdered"]);
        assert_eq!(record.report, "DetailSalesTrafficBySKU");
        Ok(())
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert!(matches!(
            ArtifactPath::parse(Path::new("US/SalesTrafficTimeSeries/file.csv")),
            Err(DecodeError::Path { .. })
        ));
        assert!(matches!(
            ArtifactPath::parse(Path::new("m/US/SalesTrafficTimeSeries/January/file.csv")),
            Err(DecodeError::Period(_))
        ));

        let path = ArtifactPath::parse(Path::new("m/US/Unknown/2024-01-01_2024-01-31/f.csv"))
            .expect("valid layout");
        assert!(matches!(
            normalize(&path, Vec::new()),
            Err(DecodeError::UnknownReport(id)) if id == "Unknown"
        ));
    }
}
