//! Sensor catalog and store record models for the ingest pipeline.
//!
//! Every sensor kind the service accepts is a [`SensorKind`] variant. The kind
//! decides the route slug, the measure name written to the store, and the
//! [`ReadingShape`] a request body must satisfy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed dimension attached to every stored record.
pub const REGION: &str = "us-east-2";

/// Measure name used for derived and ingested log entries.
pub const LOG_MEASURE_NAME: &str = "log_data";

// ---

/// Scalar type of a measure value or a query column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScalarType {
    Varchar,
    Bigint,
    Double,
    Timestamp,
}

impl ScalarType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::Varchar => "VARCHAR",
            ScalarType::Bigint => "BIGINT",
            ScalarType::Double => "DOUBLE",
            ScalarType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed field of a reading body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: ScalarType,
}

const fn field(name: &'static str, ty: ScalarType) -> Field {
    Field { name, ty }
}

const LOCATION_FIELDS: &[Field] = &[
    field("timestamp", ScalarType::Varchar),
    field("zone_id", ScalarType::Varchar),
    field("building_id", ScalarType::Varchar),
];

/// Type of the `value` field on the strict location-tagged path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrictValue {
    Double,
    Varchar,
}

/// Required and optional fields a reading body must carry for one sensor kind.
///
/// Fields are written to the store in declaration order: required fields
/// first, then whichever optional fields the body supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingShape {
    pub required: &'static [Field],
    pub optional: &'static [Field],
}

impl ReadingShape {
    /// Full location-tagged reading with a typed `value`.
    pub const STRICT_DOUBLE: ReadingShape = ReadingShape {
        required: &[
            field("timestamp", ScalarType::Varchar),
            field("trend_flag", ScalarType::Varchar),
            field("zone_id", ScalarType::Varchar),
            field("building_id", ScalarType::Varchar),
            field("status", ScalarType::Varchar),
            field("value", ScalarType::Double),
        ],
        optional: &[],
    };

    pub const STRICT_VARCHAR: ReadingShape = ReadingShape {
        required: &[
            field("timestamp", ScalarType::Varchar),
            field("trend_flag", ScalarType::Varchar),
            field("zone_id", ScalarType::Varchar),
            field("building_id", ScalarType::Varchar),
            field("status", ScalarType::Varchar),
            field("value", ScalarType::Varchar),
        ],
        optional: &[],
    };

    pub const VIBRATION: ReadingShape = ReadingShape {
        required: &[
            field("trend_flag", ScalarType::Varchar),
            field("status", ScalarType::Varchar),
            field("frequency", ScalarType::Bigint),
            field("acceleration", ScalarType::Double),
            field("velocity", ScalarType::Double),
        ],
        optional: LOCATION_FIELDS,
    };

    pub const TEMPERATURE: ReadingShape = ReadingShape {
        required: &[
            field("trend_flag", ScalarType::Varchar),
            field("status", ScalarType::Varchar),
            field("temperature", ScalarType::Double),
        ],
        optional: LOCATION_FIELDS,
    };

    pub const PLAIN_DOUBLE: ReadingShape = ReadingShape {
        required: &[
            field("trend_flag", ScalarType::Varchar),
            field("status", ScalarType::Varchar),
            field("value", ScalarType::Double),
        ],
        optional: LOCATION_FIELDS,
    };

    pub const PLAIN_VARCHAR: ReadingShape = ReadingShape {
        required: &[
            field("trend_flag", ScalarType::Varchar),
            field("status", ScalarType::Varchar),
            field("value", ScalarType::Varchar),
        ],
        optional: LOCATION_FIELDS,
    };

    pub const LOG: ReadingShape = ReadingShape {
        required: &[
            field("sensor", ScalarType::Varchar),
            field("log", ScalarType::Varchar),
        ],
        optional: &[field("timestamp", ScalarType::Varchar)],
    };

    /// Strict location-tagged shape for the given `value` type.
    pub fn strict(value_type: StrictValue) -> ReadingShape {
        match value_type {
            StrictValue::Double => Self::STRICT_DOUBLE,
            StrictValue::Varchar => Self::STRICT_VARCHAR,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static Field> {
        self.required.iter().chain(self.optional.iter())
    }
}

// ---

/// Which trend analysis runs after a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendCheck {
    Vibration,
    Temperature,
}

/// Every sensor kind the service ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    CompressorAmps,
    CondFanAmps,
    LiquidLinePressure,
    LiquidLineTemperature,
    ReturnAirCo2,
    ReturnAirHumidity,
    ReturnAirTemperature,
    SpaceCo2,
    SpaceHumidity,
    SpaceTemperature,
    SuctionLinePressure,
    SuctionLineTemperature,
    SupplyAirCo2,
    SupplyAirFanAmps,
    SupplyAirHumidity,
    SupplyAirTemperature,
    VibrationSensor,
    Temperature,
    Amps,
    Status,
    WindDirection,
    LogData,
}

impl SensorKind {
    pub const ALL: [SensorKind; 22] = [
        SensorKind::CompressorAmps,
        SensorKind::CondFanAmps,
        SensorKind::LiquidLinePressure,
        SensorKind::LiquidLineTemperature,
        SensorKind::ReturnAirCo2,
        SensorKind::ReturnAirHumidity,
        SensorKind::ReturnAirTemperature,
        SensorKind::SpaceCo2,
        SensorKind::SpaceHumidity,
        SensorKind::SpaceTemperature,
        SensorKind::SuctionLinePressure,
        SensorKind::SuctionLineTemperature,
        SensorKind::SupplyAirCo2,
        SensorKind::SupplyAirFanAmps,
        SensorKind::SupplyAirHumidity,
        SensorKind::SupplyAirTemperature,
        SensorKind::VibrationSensor,
        SensorKind::Temperature,
        SensorKind::Amps,
        SensorKind::Status,
        SensorKind::WindDirection,
        SensorKind::LogData,
    ];

    /// Route segment and default table name.
    pub fn slug(self) -> &'static str {
        match self {
            SensorKind::CompressorAmps => "compressor_amps",
            SensorKind::CondFanAmps => "cond_fan_amps",
            SensorKind::LiquidLinePressure => "liquid_line_pressure",
            SensorKind::LiquidLineTemperature => "liquid_line_temperature",
            SensorKind::ReturnAirCo2 => "return_air_co2",
            SensorKind::ReturnAirHumidity => "return_air_humidity",
            SensorKind::ReturnAirTemperature => "return_air_temperature",
            SensorKind::SpaceCo2 => "space_co2",
            SensorKind::SpaceHumidity => "space_humidity",
            SensorKind::SpaceTemperature => "space_temperature",
            SensorKind::SuctionLinePressure => "suction_line_pressure",
            SensorKind::SuctionLineTemperature => "suction_line_temperature",
            SensorKind::SupplyAirCo2 => "supply_air_co2",
            SensorKind::SupplyAirFanAmps => "supply_air_fan_amps",
            SensorKind::SupplyAirHumidity => "supply_air_humidity",
            SensorKind::SupplyAirTemperature => "supply_air_temperature",
            SensorKind::VibrationSensor => "vibration_sensor",
            SensorKind::Temperature => "temperature",
            SensorKind::Amps => "amps",
            SensorKind::Status => "status",
            SensorKind::WindDirection => "wind_direction",
            SensorKind::LogData => "log_data",
        }
    }

    pub fn measure_name(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature_sensor",
            SensorKind::Amps => "amps_sensor",
            SensorKind::Status => "status_sensor",
            SensorKind::WindDirection => "wind_direction_sensor",
            other => other.slug(),
        }
    }

    pub fn shape(self) -> ReadingShape {
        match self {
            SensorKind::VibrationSensor => ReadingShape::VIBRATION,
            SensorKind::Temperature => ReadingShape::TEMPERATURE,
            SensorKind::Amps => ReadingShape::PLAIN_DOUBLE,
            SensorKind::Status | SensorKind::WindDirection => ReadingShape::PLAIN_VARCHAR,
            SensorKind::LogData => ReadingShape::LOG,
            _ => ReadingShape::strict(StrictValue::Double),
        }
    }

    pub fn trend_check(self) -> Option<TrendCheck> {
        match self {
            SensorKind::VibrationSensor => Some(TrendCheck::Vibration),
            SensorKind::Temperature => Some(TrendCheck::Temperature),
            _ => None,
        }
    }

    /// Environment variable overriding this kind's table name.
    pub fn table_env_var(self) -> String {
        format!("{}_TABLE_NAME", self.slug().to_ascii_uppercase())
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| format!("Unknown sensor: {s}"))
    }
}

// ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureValue {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub ty: ScalarType,
}

impl MeasureValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ty,
        }
    }
}

/// Multi-measure record as written to the store. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureRecord {
    pub dimensions: Vec<Dimension>,
    pub measure_name: String,
    pub measure_values: Vec<MeasureValue>,
    /// Server-assigned ingestion time, milliseconds since the epoch.
    pub time_ms: i64,
}

impl MeasureRecord {
    /// Record in the fixed region with the given measure values.
    pub fn new(
        measure_name: impl Into<String>,
        measure_values: Vec<MeasureValue>,
        time_ms: i64,
    ) -> Self {
        // ---
        Self {
            dimensions: vec![Dimension {
                name: "region".to_string(),
                value: REGION.to_string(),
            }],
            measure_name: measure_name.into(),
            measure_values,
            time_ms,
        }
    }

    /// Build the record for a validated reading body.
    ///
    /// Fields are taken in shape order; absent optional fields are skipped.
    pub fn from_reading(
        kind: SensorKind,
        body: &serde_json::Map<String, Value>,
        time_ms: i64,
    ) -> Self {
        // ---
        let values = kind
            .shape()
            .fields()
            .filter_map(|f| {
                body.get(f.name)
                    .map(|v| MeasureValue::new(f.name, stored_scalar(v, f.ty), f.ty))
            })
            .collect();

        Self::new(kind.measure_name(), values, time_ms)
    }

    pub fn measure(&self, name: &str) -> Option<&MeasureValue> {
        self.measure_values.iter().find(|m| m.name == name)
    }

    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}

/// Render a JSON scalar the way it is stored: strings verbatim, everything
/// else in its JSON text form.
pub fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stored text for a typed field. Numeric strings lose surrounding
/// whitespace so the store parses exactly what the validator accepted.
fn stored_scalar(value: &Value, ty: ScalarType) -> String {
    match (value, ty) {
        (Value::String(s), ScalarType::Double | ScalarType::Bigint) => s.trim().to_string(),
        _ => scalar_string(value),
    }
}

/// Synthetic log record produced by trend analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedLogEntry {
    pub sensor: String,
    pub log: String,
    /// Equal to the triggering ingest's timestamp.
    pub time_ms: i64,
}

impl DerivedLogEntry {
    pub fn to_record(&self) -> MeasureRecord {
        // ---
        MeasureRecord::new(
            LOG_MEASURE_NAME,
            vec![
                MeasureValue::new("sensor", self.sensor.as_str(), ScalarType::Varchar),
                MeasureValue::new("log", self.log.as_str(), ScalarType::Varchar),
            ],
            self.time_ms,
        )
    }
}
