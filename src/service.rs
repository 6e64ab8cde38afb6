//! Ingest and query façade.
//!
//! [`ingest`] runs validate → write → analyze for one reading, and [`recent`]
//! reads the newest measurements of a sensor back as typed JSON rows. Both are
//! keyed by [`SensorKind`], so every sensor route shares this one code path.

use chrono::Utc;
use serde_json::{Map, Number, Value};
use tracing::{debug, info, instrument};

use crate::store::{QueryOutput, Selection};
use crate::trend::TrendAnalyzer;
use crate::validation::validate_reading;
use crate::{ApiError, AppContext, DerivedLogEntry, MeasureRecord, ScalarType, SensorKind};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1_000;

/// Outcome of a successful ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub time_ms: i64,
    /// Derived log entry written by trend analysis, if any.
    pub derived: Option<DerivedLogEntry>,
}

// ---

/// Decode a request body into a JSON object.
pub fn parse_body(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    // ---
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::MalformedInput(
            "expected a JSON object".to_string(),
        )),
        Err(e) => Err(ApiError::MalformedInput(e.to_string())),
    }
}

/// Validate and store one reading, then run trend analysis for the kinds
/// that have it.
///
/// Trend analysis never turns a stored reading into a failed ingest.
#[instrument(skip_all, fields(sensor = %kind))]
pub async fn ingest(ctx: &AppContext, kind: SensorKind, body: &[u8]) -> Result<Ingested, ApiError> {
    // ---
    let reading = parse_body(body)?;

    let errors = validate_reading(&reading, &kind.shape());
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let time_ms = Utc::now().timestamp_millis();
    let record = MeasureRecord::from_reading(kind, &reading, time_ms);
    let table = ctx.table(kind);

    ctx.store().write(table, &record).await?;
    info!(table, time_ms, "Stored {} measure values", record.measure_values.len());

    let derived = match kind.trend_check() {
        Some(check) => {
            TrendAnalyzer::new(ctx.store(), ctx.log_table())
                .after_write(check, table, &record)
                .await
        }
        None => None,
    };

    Ok(Ingested { time_ms, derived })
}

/// Newest-first decoded measurements for a sensor kind.
#[instrument(skip_all, fields(sensor = %kind, limit = limit))]
pub async fn recent(
    ctx: &AppContext,
    kind: SensorKind,
    limit: usize,
) -> Result<Vec<Map<String, Value>>, ApiError> {
    // ---
    let output = ctx
        .store()
        .query(&Selection::latest(ctx.table(kind), limit))
        .await?;
    debug!("Query returned {} rows", output.rows.len());

    decode_rows(&output)
}

pub fn clamp_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Decode query rows using the column-type metadata.
///
/// BIGINT becomes an integer, DOUBLE a float, anything else a string; a
/// missing scalar becomes `null`.
pub fn decode_rows(output: &QueryOutput) -> Result<Vec<Map<String, Value>>, ApiError> {
    // ---
    output
        .rows
        .iter()
        .map(|row| {
            output
                .columns
                .iter()
                .zip(row)
                .map(|(column, raw)| -> Result<(String, Value), ApiError> {
                    let value = match raw {
                        Some(raw) => decode_scalar(column.ty, raw).map_err(|e| {
                            ApiError::StoreFault(format!("column '{}': {}", column.name, e))
                        })?,
                        None => Value::Null,
                    };
                    Ok((column.name.clone(), value))
                })
                .collect::<Result<Map<String, Value>, ApiError>>()
        })
        .collect()
}

fn decode_scalar(ty: ScalarType, raw: &str) -> Result<Value, String> {
    // ---
    match ty {
        ScalarType::Bigint => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("invalid BIGINT '{raw}': {e}")),
        ScalarType::Double => raw
            .parse::<f64>()
            .map(|v| Number::from_f64(v).map_or(Value::Null, Value::Number))
            .map_err(|e| format!("invalid DOUBLE '{raw}': {e}")),
        ScalarType::Varchar | ScalarType::Timestamp => Ok(Value::String(raw.to_string())),
    }
}
