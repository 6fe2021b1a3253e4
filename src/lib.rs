//! Flight delay feature pipeline
//!
//! Derives temporal and contextual features from flight schedule records
//! for a binary "is this flight delayed" classifier. The same derivation
//! runs over a historical batch (training) and over a single record
//! (inference).

pub mod data;
pub mod features;
pub mod predict;
pub mod training;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::features::FeatureValue;

/// Column names of the upstream flight schedule
pub mod columns {
    /// Scheduled departure
    pub const SCHEDULED: &str = "Fecha-I";
    /// Actual departure
    pub const ACTUAL: &str = "Fecha-O";
    pub const ORIGIN: &str = "Ori-I";
    pub const DESTINATION: &str = "Des-I";
    pub const CARRIER: &str = "Emp-I";
    pub const FLIGHT_TYPE: &str = "TIPOVUELO";
    /// Flights scheduled within the concurrency window
    pub const CONCURRENT_FLIGHTS: &str = "Conc-Flights";
    pub const HIGH_SEASON: &str = "is_high_season";
    pub const DAY_PHASE: &str = "day_phase";
    /// Weekday name
    pub const WEEKDAY: &str = "Day-I";
    pub const MONTH: &str = "Month-I";
    pub const DAY_NUMBER: &str = "Day-Number-I";
}

/// A single flight schedule record as delivered upstream
///
/// Only the scheduled departure is always needed. Every other column is
/// optional here and becomes required only when a [`FeatureConfig`] names
/// it, in which case its absence surfaces as [`DelayError::SchemaMismatch`]
/// during feature assembly. Columns without a dedicated field (`OPERA`,
/// `SIGLADES`, `DIANOM`, ...) are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Scheduled departure, `YYYY-MM-DD HH:MM:SS`
    #[serde(rename = "Fecha-I", default)]
    pub scheduled: String,
    /// Actual departure (training only)
    #[serde(rename = "Fecha-O", default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(rename = "Ori-I", default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(rename = "Des-I", default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Operating carrier code
    #[serde(rename = "Emp-I", default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    /// Flight type code (`N` national, `I` international)
    #[serde(rename = "TIPOVUELO", default, skip_serializing_if = "Option::is_none")]
    pub flight_type: Option<String>,
    /// Pre-computed concurrency count (inference only)
    #[serde(rename = "Conc-Flights", default, skip_serializing_if = "Option::is_none")]
    pub concurrent_flights: Option<u32>,
    /// Remaining upstream columns, passed through to feature assembly
    #[serde(flatten)]
    pub extra: BTreeMap<String, FeatureValue>,
}

impl FlightRecord {
    /// Build a record from `(column, cell)` pairs of a schedule file
    ///
    /// Empty cells count as absent. Fails if `Fecha-I` is missing or
    /// `Conc-Flights` is not a count.
    pub fn from_columns<I, K, V>(cells: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut record = FlightRecord::default();

        for (column, value) in cells {
            let (column, value) = (column.into(), value.into());
            if value.is_empty() {
                continue;
            }
            match column.as_str() {
                columns::SCHEDULED => record.scheduled = value,
                columns::ACTUAL => record.actual = Some(value),
                columns::ORIGIN => record.origin = Some(value),
                columns::DESTINATION => record.destination = Some(value),
                columns::CARRIER => record.carrier = Some(value),
                columns::FLIGHT_TYPE => record.flight_type = Some(value),
                columns::CONCURRENT_FLIGHTS => {
                    let count = value.trim().parse().map_err(|_| DelayError::SchemaMismatch {
                        column: columns::CONCURRENT_FLIGHTS.to_string(),
                        message: format!("{:?} is not a flight count", value),
                    })?;
                    record.concurrent_flights = Some(count);
                }
                _ => {
                    record.extra.insert(column, FeatureValue::Category(value));
                }
            }
        }

        record.scheduled_departure()?;
        Ok(record)
    }

    /// Scheduled departure text, failing when the column is absent
    pub fn scheduled_departure(&self) -> Result<&str> {
        if self.scheduled.is_empty() {
            return Err(DelayError::missing_column(columns::SCHEDULED));
        }
        Ok(&self.scheduled)
    }

    /// Text of any column except the concurrency count, `None` if absent
    pub fn cell(&self, column: &str) -> Option<String> {
        let named = match column {
            columns::SCHEDULED => Some(&self.scheduled).filter(|s| !s.is_empty()),
            columns::ACTUAL => self.actual.as_ref(),
            columns::ORIGIN => self.origin.as_ref(),
            columns::DESTINATION => self.destination.as_ref(),
            columns::CARRIER => self.carrier.as_ref(),
            columns::FLIGHT_TYPE => self.flight_type.as_ref(),
            columns::CONCURRENT_FLIGHTS => {
                return self.concurrent_flights.map(|c| c.to_string());
            }
            _ => return self.extra.get(column).map(FeatureValue::as_category),
        };
        named.cloned()
    }

    /// Raw categorical columns present on this record, by column name
    pub fn raw_columns(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (columns::ORIGIN, &self.origin),
            (columns::DESTINATION, &self.destination),
            (columns::CARRIER, &self.carrier),
            (columns::FLIGHT_TYPE, &self.flight_type),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum DelayError {
    #[error("Malformed timestamp {value:?}: {source}")]
    MalformedTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Insufficient class data: {negatives} negative and {positives} positive records")]
    InsufficientClassData { negatives: usize, positives: usize },

    #[error("Schema mismatch for column {column}: {message}")]
    SchemaMismatch { column: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DelayError {
    pub(crate) fn missing_column(column: &str) -> Self {
        DelayError::SchemaMismatch {
            column: column.to_string(),
            message: "column is absent from the record".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DelayError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub labeling: LabelingConfig,
    pub concurrency: ConcurrencyConfig,
    pub balancing: BalancingConfig,
    pub split: SplitConfig,
    pub inference: InferenceConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelingConfig {
    /// Flights departing more than this many minutes late are delayed
    pub threshold_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Half-width of the symmetric window around each departure
    pub window_hours: f64,
    /// Use the rayon scan for batches at least this large (0 disables)
    pub parallel_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancingConfig {
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train: f32,
    pub val: f32,
    pub test: f32,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Concurrency used when a request does not carry `Conc-Flights`
    pub default_concurrency: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub dataset_path: String,
    pub feature_config_path: String,
    pub encoder_path: String,
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            labeling: LabelingConfig {
                threshold_minutes: 15.0,
            },
            concurrency: ConcurrencyConfig {
                window_hours: 1.0,
                parallel_threshold: 100_000,
            },
            balancing: BalancingConfig { seed: 42 },
            split: SplitConfig {
                train: 0.70,
                val: 0.15,
                test: 0.15,
                seed: 42,
            },
            inference: InferenceConfig {
                default_concurrency: Some(1),
            },
            data: DataConfig {
                dataset_path: "data/dataset_SCL.csv".to_string(),
                feature_config_path: "data/config.json".to_string(),
                encoder_path: "models/encoder.json".to_string(),
                output_dir: "data/processed".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DelayError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| DelayError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DelayError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Which columns feed the model and which one is the label
///
/// Loaded from a JSON document shaped as
/// `{"features": {"numerical": [..], "categorical": [..]}, "target": ".."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub features: FeatureColumns,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumns {
    pub numerical: Vec<String>,
    pub categorical: Vec<String>,
}

impl FeatureConfig {
    pub fn new(numerical: &[&str], categorical: &[&str], target: &str) -> Self {
        FeatureConfig {
            features: FeatureColumns {
                numerical: numerical.iter().map(|s| s.to_string()).collect(),
                categorical: categorical.iter().map(|s| s.to_string()).collect(),
            },
            target: target.to_string(),
        }
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DelayError::Config(format!("Failed to read feature config {}: {}", path, e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| DelayError::Config(format!("Failed to parse feature config: {}", e)))
    }

    pub fn numerical(&self) -> &[String] {
        &self.features.numerical
    }

    pub fn categorical(&self) -> &[String] {
        &self.features.categorical
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        use columns::*;
        FeatureConfig::new(
            &[HIGH_SEASON, CONCURRENT_FLIGHTS],
            &[
                ORIGIN,
                DESTINATION,
                CARRIER,
                FLIGHT_TYPE,
                DAY_PHASE,
                WEEKDAY,
                MONTH,
                DAY_NUMBER,
            ],
            "is_delayed",
        )
    }
}
