//! Time-series measurement store.
//!
//! The service only needs two primitives from its backend: append a
//! multi-measure record to a named table, and read the newest records of a
//! table back with column-type metadata. [`MeasurementStore`] is that seam;
//! [`PgStore`] backs it with PostgreSQL and [`MemoryStore`] keeps everything
//! in process.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::{MeasureRecord, ScalarType};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgStore, RetryPolicy};

// ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    pub record_index: usize,
    pub measure: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{} measure value(s) rejected", .0.len())]
    Rejected(Vec<RejectedRecord>),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store fault: {0}")]
    Fault(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Fault(e.to_string())
    }
}

/// Read request: newest-first over one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub table: String,
    /// Columns to return; `None` selects everything.
    pub columns: Option<Vec<String>>,
    /// Only records written strictly before this time (epoch millis).
    pub before_ms: Option<i64>,
    pub limit: usize,
}

impl Selection {
    pub fn latest(table: impl Into<String>, limit: usize) -> Self {
        Self {
            table: table.into(),
            columns: None,
            before_ms: None,
            limit,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn before(mut self, time_ms: i64) -> Self {
        self.before_ms = Some(time_ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ScalarType,
}

/// Query result: column metadata plus one optional scalar per column per row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryOutput {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Raw scalars of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).and_then(|v| v.as_deref()))
                .collect(),
        )
    }
}

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Append one record to `table`.
    async fn write(&self, table: &str, record: &MeasureRecord) -> Result<(), StoreError>;

    /// Newest-first read of `selection.table`, at most `selection.limit` rows.
    async fn query(&self, selection: &Selection) -> Result<QueryOutput, StoreError>;
}

// ---

/// Reject measure values whose text does not parse as their declared type.
pub(crate) fn check_record(record: &MeasureRecord) -> Result<(), StoreError> {
    // ---
    let rejected: Vec<RejectedRecord> = record
        .measure_values
        .iter()
        .filter_map(|m| {
            let reason = match m.ty {
                ScalarType::Bigint if m.value.parse::<i64>().is_err() => {
                    format!("value '{}' is not a valid BIGINT", m.value)
                }
                ScalarType::Double if !m.value.parse::<f64>().is_ok_and(f64::is_finite) => {
                    format!("value '{}' is not a valid DOUBLE", m.value)
                }
                _ => return None,
            };
            Some(RejectedRecord {
                record_index: 0,
                measure: m.name.clone(),
                reason,
            })
        })
        .collect();

    if rejected.is_empty() {
        Ok(())
    } else {
        Err(StoreError::Rejected(rejected))
    }
}

const DIMENSION_COLUMNS: [&str; 1] = ["region"];

/// Render records (already newest-first) into a [`QueryOutput`].
///
/// Without an explicit column list the result carries `region`,
/// `measure_name`, `time`, then every measure name seen across the records in
/// first-seen order. Records lacking a column yield `None` for it.
pub(crate) fn project(records: &[&MeasureRecord], columns: Option<&[String]>) -> QueryOutput {
    // ---
    let columns: Vec<ColumnInfo> = match columns {
        Some(names) => names
            .iter()
            .map(|name| ColumnInfo {
                name: name.clone(),
                ty: column_type(records, name),
            })
            .collect(),
        None => {
            let mut cols: Vec<ColumnInfo> = DIMENSION_COLUMNS
                .iter()
                .chain(["measure_name", "time"].iter())
                .map(|name| ColumnInfo {
                    name: name.to_string(),
                    ty: column_type(records, name),
                })
                .collect();
            for record in records {
                for m in &record.measure_values {
                    if !cols.iter().any(|c| c.name == m.name) {
                        cols.push(ColumnInfo {
                            name: m.name.clone(),
                            ty: m.ty,
                        });
                    }
                }
            }
            cols
        }
    };

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| cell(record, &c.name))
                .collect()
        })
        .collect();

    QueryOutput { columns, rows }
}

fn column_type(records: &[&MeasureRecord], name: &str) -> ScalarType {
    match name {
        "time" => ScalarType::Timestamp,
        "measure_name" => ScalarType::Varchar,
        n if DIMENSION_COLUMNS.contains(&n) => ScalarType::Varchar,
        n => records
            .iter()
            .find_map(|r| r.measure(n))
            .map(|m| m.ty)
            .unwrap_or(ScalarType::Varchar),
    }
}

fn cell(record: &MeasureRecord, name: &str) -> Option<String> {
    match name {
        "time" => format_time(record.time_ms),
        "measure_name" => Some(record.measure_name.clone()),
        n => record
            .dimension(n)
            .map(str::to_string)
            .or_else(|| record.measure(n).map(|m| m.value.clone())),
    }
}

/// Store timestamp text, e.g. `2024-01-15 20:05:00.000000000`.
fn format_time(time_ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(time_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.9f").to_string())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::MeasureValue;

    fn record(time_ms: i64, values: Vec<MeasureValue>) -> MeasureRecord {
        MeasureRecord::new("vibration_sensor", values, time_ms)
    }

    #[test]
    fn test_check_record_reports_each_bad_value() {
        // ---
        let rec = record(
            1,
            vec![
                MeasureValue::new("frequency", "12.5", ScalarType::Bigint),
                MeasureValue::new("velocity", "fast", ScalarType::Double),
                MeasureValue::new("status", "ok", ScalarType::Varchar),
            ],
        );

        match check_record(&rec) {
            Err(StoreError::Rejected(details)) => {
                let measures: Vec<_> = details.iter().map(|d| d.measure.as_str()).collect();
                assert_eq!(measures, ["frequency", "velocity"]);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_project_unions_columns_and_fills_gaps() {
        // ---
        let newer = record(
            1_705_349_100_000,
            vec![MeasureValue::new("velocity", "2.5", ScalarType::Double)],
        );
        let older = record(
            1_705_349_000_000,
            vec![
                MeasureValue::new("frequency", "640", ScalarType::Bigint),
                MeasureValue::new("velocity", "1.5", ScalarType::Double),
            ],
        );

        let out = project(&[&newer, &older], None);

        let names: Vec<_> = out.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["region", "measure_name", "time", "velocity", "frequency"]);
        assert_eq!(out.columns[4].ty, ScalarType::Bigint);
        assert_eq!(out.rows[0][4], None);
        assert_eq!(out.rows[1][4].as_deref(), Some("640"));
        assert_eq!(out.rows[0][2].as_deref(), Some("2024-01-15 20:05:00.000000000"));
    }

    #[test]
    fn test_project_explicit_columns() {
        // ---
        let rec = record(
            10,
            vec![
                MeasureValue::new("acceleration", "0.4", ScalarType::Double),
                MeasureValue::new("velocity", "1.5", ScalarType::Double),
            ],
        );

        let cols = vec!["velocity".to_string(), "missing".to_string()];
        let out = project(&[&rec], Some(&cols));

        assert_eq!(out.column("velocity").unwrap(), vec![Some("1.5")]);
        assert_eq!(out.column("missing").unwrap(), vec![None]);
        assert_eq!(out.columns[1].ty, ScalarType::Varchar);
        assert!(out.column("acceleration").is_none());
    }
}
