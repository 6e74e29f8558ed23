use std::path::Path;

use serde_json::{Number, Value};

use crate::error::DecodeError;
use crate::models::Row;

/// Decodes a downloaded table into rows keyed by its header line.
pub trait TableDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Vec<Row>, DecodeError>;
}

/// CSV exports. Cells are trimmed; numeric and boolean cells are typed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvTableDecoder;

impl TableDecoder for CsvTableDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<Row>, DecodeError> {
        let table_error = |source| DecodeError::Table {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(table_error)?;
        let headers = reader.headers().map_err(table_error)?.clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(table_error)?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(field, raw)| (field.to_string(), typed_value(raw)))
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }
}

/// `"5"` -> 5, `"2.5"` -> 2.5, `"true"` -> true; anything else stays text.
pub(crate) fn typed_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
