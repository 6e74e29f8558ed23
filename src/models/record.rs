use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One decoded table row: field name to typed value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// The unit emitted on the output stream: one per completed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub merchant: String,
    pub marketplace: String,
    /// Short report name, e.g. `SalesTraffic`.
    pub report: String,
    /// Dashboard report id, e.g. `SalesTrafficTimeSeries`.
    pub report_id: String,
    pub period: Period,
    pub rows: Vec<Row>,
}
