//! Post-write trend detection over the most recent readings of a sensor.
//!
//! After a vibration or temperature reading is stored, [`TrendAnalyzer`]
//! looks at the last [`WINDOW`] readings written before it and classifies
//! strictly monotonic runs:
//!
//! - vibration: rising velocity at 10–1000 Hz means mechanical faults;
//!   otherwise rising acceleration at 500–16000 Hz means bearing or gear wear.
//!   At least two samples are needed.
//! - temperature: a full window that is strictly rising or strictly falling.
//!
//! At most one [`DerivedLogEntry`] is produced per ingest. Analysis is best
//! effort: failures are logged and never reach the ingest caller.

use std::ops::RangeInclusive;

use tracing::{debug, info, warn};

use crate::store::{MeasurementStore, Selection, StoreError};
use crate::{DerivedLogEntry, MeasureRecord, TrendCheck};

/// Number of recent readings inspected per analysis.
pub const WINDOW: usize = 5;

pub const MIN_VIBRATION_SAMPLES: usize = 2;

pub const MECHANICAL_FAULT_HZ: RangeInclusive<i64> = 10..=1_000;
pub const BEARINGS_GEARS_HZ: RangeInclusive<i64> = 500..=16_000;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    MechanicalFaults,
    BearingsAndGears,
    RisingTemperature,
    FallingTemperature,
}

impl Trend {
    pub fn message(self) -> &'static str {
        match self {
            Trend::MechanicalFaults => "Mechanical Faults",
            Trend::BearingsAndGears => "Bearings & Gears",
            Trend::RisingTemperature => "Increasing temperature trend detected",
            Trend::FallingTemperature => "Decreasing temperature trend detected",
        }
    }

    /// Value of the `sensor` column on the derived entry.
    pub fn sensor(self) -> &'static str {
        match self {
            Trend::MechanicalFaults | Trend::BearingsAndGears => "vibration",
            Trend::RisingTemperature | Trend::FallingTemperature => "temperature",
        }
    }

    pub fn entry(self, time_ms: i64) -> DerivedLogEntry {
        DerivedLogEntry {
            sensor: self.sensor().to_string(),
            log: self.message().to_string(),
            time_ms,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrendError {
    #[error("history read failed: {0}")]
    Store(#[from] StoreError),

    #[error("history has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("history row {row} has unusable '{column}' value {value:?}")]
    BadSample {
        column: &'static str,
        row: usize,
        value: Option<String>,
    },

    #[error("triggering reading has no integer frequency")]
    MissingFrequency,
}

// ---

fn strictly_increasing(xs: &[f64]) -> bool {
    xs.windows(2).all(|w| w[0] < w[1])
}

fn strictly_decreasing(xs: &[f64]) -> bool {
    xs.windows(2).all(|w| w[0] > w[1])
}

/// Classify a chronological vibration window. The mechanical-fault check
/// always wins where the frequency bands overlap.
pub fn classify_vibration(
    frequency: i64,
    accelerations: &[f64],
    velocities: &[f64],
) -> Option<Trend> {
    // ---
    if velocities.len() < MIN_VIBRATION_SAMPLES {
        return None;
    }

    if MECHANICAL_FAULT_HZ.contains(&frequency) && strictly_increasing(velocities) {
        Some(Trend::MechanicalFaults)
    } else if BEARINGS_GEARS_HZ.contains(&frequency)
        && accelerations.len() >= MIN_VIBRATION_SAMPLES
        && strictly_increasing(accelerations)
    {
        Some(Trend::BearingsAndGears)
    } else {
        None
    }
}

/// Classify a chronological temperature window. Only a full window counts.
pub fn classify_temperature(temperatures: &[f64]) -> Option<Trend> {
    // ---
    if temperatures.len() != WINDOW {
        return None;
    }

    if strictly_increasing(temperatures) {
        Some(Trend::RisingTemperature)
    } else if strictly_decreasing(temperatures) {
        Some(Trend::FallingTemperature)
    } else {
        None
    }
}

// ---

/// Runs the trend checks against a store and appends derived log entries.
pub struct TrendAnalyzer<'a> {
    store: &'a dyn MeasurementStore,
    log_table: &'a str,
}

impl<'a> TrendAnalyzer<'a> {
    pub fn new(store: &'a dyn MeasurementStore, log_table: &'a str) -> Self {
        Self { store, log_table }
    }

    /// Analyze `table` after `trigger` was written to it and append the
    /// derived entry, if any. Returns the entry only when it was stored.
    pub async fn after_write(
        &self,
        check: TrendCheck,
        table: &str,
        trigger: &MeasureRecord,
    ) -> Option<DerivedLogEntry> {
        // ---
        let entry = match self.detect(check, table, trigger).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(table, ?check, "no trend detected");
                return None;
            }
            Err(e) => {
                warn!(table, ?check, "trend analysis skipped: {}", e);
                return None;
            }
        };

        match self.store.write(self.log_table, &entry.to_record()).await {
            Ok(()) => {
                info!(
                    table,
                    log_table = self.log_table,
                    sensor = %entry.sensor,
                    "trend detected: {}",
                    entry.log
                );
                Some(entry)
            }
            Err(e) => {
                warn!(log_table = self.log_table, "failed to store derived log entry: {}", e);
                None
            }
        }
    }

    /// Read the history window and classify it, without writing anything.
    ///
    /// History is every record of `table` written strictly before the
    /// trigger, so the triggering reading itself is never part of the window.
    pub async fn detect(
        &self,
        check: TrendCheck,
        table: &str,
        trigger: &MeasureRecord,
    ) -> Result<Option<DerivedLogEntry>, TrendError> {
        // ---
        let trend = match check {
            TrendCheck::Vibration => {
                let frequency = trigger
                    .measure("frequency")
                    .and_then(|m| m.value.parse::<i64>().ok())
                    .ok_or(TrendError::MissingFrequency)?;

                let history = self
                    .history(table, trigger.time_ms, &["acceleration", "velocity"])
                    .await?;
                classify_vibration(frequency, &history[0], &history[1])
            }
            TrendCheck::Temperature => {
                let history = self
                    .history(table, trigger.time_ms, &["temperature"])
                    .await?;
                classify_temperature(&history[0])
            }
        };

        Ok(trend.map(|t| t.entry(trigger.time_ms)))
    }

    /// Chronological float series for each requested column.
    async fn history(
        &self,
        table: &str,
        before_ms: i64,
        columns: &[&'static str],
    ) -> Result<Vec<Vec<f64>>, TrendError> {
        // ---
        let selection = Selection::latest(table, WINDOW)
            .columns(columns)
            .before(before_ms);
        let output = self.store.query(&selection).await?;

        columns
            .iter()
            .map(|&column| -> Result<Vec<f64>, TrendError> {
                let raw = output
                    .column(column)
                    .ok_or(TrendError::MissingColumn(column))?;
                let mut series = raw
                    .into_iter()
                    .enumerate()
                    .map(|(row, value)| {
                        value
                            .and_then(|v| v.parse::<f64>().ok())
                            .ok_or_else(|| TrendError::BadSample {
                                column,
                                row,
                                value: value.map(str::to_string),
                            })
                    })
                    .collect::<Result<Vec<f64>, _>>()?;
                series.reverse();
                Ok(series)
            })
            .collect()
    }
}
