//! Request-body validation for sensor readings.
//!
//! [`validate_reading`] collects every violation instead of stopping at the
//! first one, so a client can fix a bad payload in a single round trip.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::{ReadingShape, ScalarType};

/// Client timestamp format, e.g. `15-Jan-24 03:05:00 PM EDT`.
static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}-[A-Za-z]{3}-\d{2} \d{2}:\d{2}:\d{2} [AP]M EDT$")
        .expect("timestamp pattern is a valid regex")
});

pub const TREND_FLAGS: [&str; 2] = ["start", ""];
pub const STATUSES: [&str; 2] = ["ok", "fail"];

/// Fields with a dedicated check below; skipped by the generic type check.
const SPECIAL_FIELDS: [&str; 5] = ["timestamp", "trend_flag", "status", "zone_id", "building_id"];

// ---

/// Validate a reading body against a shape. An empty result means valid.
pub fn validate_reading(body: &Map<String, Value>, shape: &ReadingShape) -> Vec<String> {
    // ---
    let mut errors = Vec::new();

    for field in shape.required {
        if !body.contains_key(field.name) {
            errors.push(format!("Missing required field: {}", field.name));
        }
    }

    if let Some(ts) = body.get("timestamp") {
        if !ts.as_str().is_some_and(is_valid_timestamp) {
            errors.push(
                "Invalid timestamp format. Expected format: 'DD-MMM-YY HH:MM:SS AM/PM EDT'"
                    .to_string(),
            );
        }
    }

    if let Some(flag) = body.get("trend_flag") {
        if !flag.as_str().is_some_and(|f| TREND_FLAGS.contains(&f)) {
            errors.push("Invalid trend_flag. Must be 'start' or ''".to_string());
        }
    }

    if let Some(status) = body.get("status") {
        if !status.as_str().is_some_and(|s| STATUSES.contains(&s)) {
            errors.push("Invalid status. Must be 'ok' or 'fail'".to_string());
        }
    }

    for name in ["zone_id", "building_id"] {
        if body.get(name).is_some_and(|v| !v.is_string()) {
            errors.push(format!("{name} must be a string"));
        }
    }

    for field in shape.fields() {
        if SPECIAL_FIELDS.contains(&field.name) {
            continue;
        }
        let Some(value) = body.get(field.name) else {
            continue;
        };
        if let Some(problem) = type_error(field.name, value, field.ty) {
            errors.push(problem);
        }
    }

    errors
}

pub fn is_valid_timestamp(ts: &str) -> bool {
    TIMESTAMP_PATTERN.is_match(ts)
}

fn type_error(name: &str, value: &Value, ty: ScalarType) -> Option<String> {
    // ---
    let ok = match ty {
        ScalarType::Double => as_double(value).is_some(),
        ScalarType::Bigint => as_bigint(value).is_some(),
        ScalarType::Varchar | ScalarType::Timestamp => value.is_string(),
    };
    if ok {
        return None;
    }

    let expected = match ty {
        ScalarType::Double => "a number",
        ScalarType::Bigint => "an integer",
        ScalarType::Varchar | ScalarType::Timestamp => "a string",
    };
    Some(format!("{name} must be {expected} for this sensor type"))
}

/// Finite float from a JSON number or numeric string.
pub fn as_double(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Integer from a JSON integer or integer string.
pub fn as_bigint(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
