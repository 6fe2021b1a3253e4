//! Feature assembly shared by training and inference
//!
//! Both paths turn a [`FlightRecord`] into a [`RecordRow`] with
//! [`FeatureAssembler::derive`] and then into model inputs with
//! [`FeatureAssembler::encode`]. Nothing else touches column selection or
//! ordering, which keeps the two paths identical.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::columns;
use crate::features::encoding::{OneHotEncoder, Transformed};
use crate::features::temporal::TemporalContext;
use crate::{DelayError, FeatureConfig, FlightRecord, Result};

/// A single cell of a record row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
}

impl FeatureValue {
    /// Numeric view; categories parse if they hold a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(x) => Some(*x),
            FeatureValue::Category(s) => s.trim().parse().ok(),
        }
    }

    /// Category view; whole numbers render without a fractional part
    pub fn as_category(&self) -> String {
        match self {
            FeatureValue::Number(x) if x.fract() == 0.0 && x.abs() < 1e15 => {
                format!("{}", *x as i64)
            }
            FeatureValue::Number(x) => x.to_string(),
            FeatureValue::Category(s) => s.clone(),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(x: f64) -> Self {
        FeatureValue::Number(x)
    }
}

impl From<u32> for FeatureValue {
    fn from(x: u32) -> Self {
        FeatureValue::Number(x as f64)
    }
}

impl From<bool> for FeatureValue {
    fn from(x: bool) -> Self {
        FeatureValue::Number(if x { 1.0 } else { 0.0 })
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        FeatureValue::Category(s.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(s: String) -> Self {
        FeatureValue::Category(s)
    }
}

/// Raw and derived columns of one flight, before encoding
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RecordRow {
    cells: BTreeMap<String, FeatureValue>,
}

impl RecordRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, value: impl Into<FeatureValue>) {
        self.cells.insert(column.to_string(), value.into());
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    pub fn get(&self, column: &str) -> Result<&FeatureValue> {
        self.cells
            .get(column)
            .ok_or_else(|| DelayError::missing_column(column))
    }

    pub fn number(&self, column: &str) -> Result<f64> {
        self.get(column)?
            .as_number()
            .ok_or_else(|| DelayError::SchemaMismatch {
                column: column.to_string(),
                message: "value is not numeric".to_string(),
            })
    }

    pub fn category(&self, column: &str) -> Result<String> {
        Ok(self.get(column)?.as_category())
    }
}

/// Features derived from one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedFeatures {
    pub temporal: TemporalContext,
    /// Flights within the concurrency window, itself included
    pub concurrency: Option<u32>,
}

impl DerivedFeatures {
    pub fn from_record(record: &FlightRecord, concurrency: Option<u32>) -> Result<Self> {
        Ok(DerivedFeatures {
            temporal: TemporalContext::from_timestamp(record.scheduled_departure()?)?,
            concurrency,
        })
    }
}

/// Model-ready feature vector with its column names
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub columns: Vec<String>,
    pub values: Vec<f32>,
}

impl FeatureRow {
    pub fn width(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, column: &str) -> Option<f32> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| self.values[idx])
    }

    /// Single-row tensor `[1, width]`
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(self.values.as_slice(), device).reshape([1, self.width()])
    }
}

/// Turns flight records into model inputs according to a [`FeatureConfig`]
#[derive(Debug, Clone, Copy)]
pub struct FeatureAssembler<'a> {
    config: &'a FeatureConfig,
}

impl<'a> FeatureAssembler<'a> {
    pub fn new(config: &'a FeatureConfig) -> Self {
        FeatureAssembler { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        self.config
    }

    /// Build the record row: every raw column present on the record plus
    /// the derived temporal features and, when known, the concurrency
    /// count. The raw timestamps are not carried over, and columns absent
    /// from the record stay absent so a configured one fails on encode.
    pub fn derive(record: &FlightRecord, concurrency: Option<u32>) -> Result<RecordRow> {
        let derived = DerivedFeatures::from_record(record, concurrency)?;
        let temporal = derived.temporal;

        let mut row = RecordRow::new();
        for (column, value) in &record.extra {
            row.insert(column, value.clone());
        }
        for (column, value) in record.raw_columns() {
            row.insert(column, value);
        }
        row.insert(columns::HIGH_SEASON, temporal.high_season);
        row.insert(columns::DAY_PHASE, temporal.day_phase.as_str());
        row.insert(columns::WEEKDAY, temporal.calendar.weekday);
        row.insert(columns::MONTH, temporal.calendar.month);
        row.insert(columns::DAY_NUMBER, temporal.calendar.day);
        if let Some(count) = derived.concurrency {
            row.insert(columns::CONCURRENT_FLIGHTS, count);
        }

        Ok(row)
    }

    /// Numerical columns in configured order
    pub fn numbers(&self, row: &RecordRow) -> Result<Vec<f32>> {
        self.config
            .numerical()
            .iter()
            .map(|col| row.number(col).map(|x| x as f32))
            .collect()
    }

    /// Categorical columns in configured order
    pub fn categories(&self, row: &RecordRow) -> Result<Vec<String>> {
        self.config
            .categorical()
            .iter()
            .map(|col| row.category(col))
            .collect()
    }

    /// Fit a fresh encoder on the categorical columns of `rows`
    pub fn fit_encoder(&self, rows: &[RecordRow]) -> Result<OneHotEncoder> {
        let samples = rows
            .iter()
            .map(|row| self.categories(row))
            .collect::<Result<Vec<_>>>()?;
        OneHotEncoder::fit(self.config.categorical(), &samples)
    }

    /// Fail unless `encoder` was fitted on exactly the configured
    /// categorical columns, in order
    pub fn check_encoder(&self, encoder: &OneHotEncoder) -> Result<()> {
        let fitted = encoder.column_names();
        if fitted.iter().copied().ne(self.config.categorical().iter().map(String::as_str)) {
            return Err(DelayError::Config(format!(
                "Encoder was fitted on {:?}, feature config lists {:?}",
                fitted,
                self.config.categorical()
            )));
        }
        Ok(())
    }

    /// Numerical passthrough followed by the one-hot block
    ///
    /// Unknown categories come back in [`Transformed::unknown`].
    pub fn encode(&self, row: &RecordRow, encoder: &OneHotEncoder) -> Result<Transformed> {
        let mut values = self.numbers(row)?;
        let one_hot = encoder.transform(&self.categories(row)?)?;
        values.extend(one_hot.values);

        Ok(Transformed {
            values,
            unknown: one_hot.unknown,
        })
    }

    /// Output column names matching [`encode`](Self::encode)
    pub fn feature_names(&self, encoder: &OneHotEncoder) -> Vec<String> {
        let mut names = self.config.numerical().to_vec();
        names.extend(encoder.feature_names());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn make_record(scheduled: &str, carrier: &str) -> FlightRecord {
        FlightRecord {
            scheduled: scheduled.to_string(),
            origin: Some("SCEL".to_string()),
            destination: Some("SCFA".to_string()),
            carrier: Some(carrier.to_string()),
            flight_type: Some("N".to_string()),
            ..FlightRecord::default()
        }
    }

    #[test]
    fn test_derive_columns() {
        let row = FeatureAssembler::derive(&make_record("2021-12-20 08:30:00", "LAN"), Some(4))
            .unwrap();

        assert_eq!(row.number(columns::HIGH_SEASON).unwrap(), 1.0);
        assert_eq!(row.category(columns::DAY_PHASE).unwrap(), "morning");
        assert_eq!(row.category(columns::WEEKDAY).unwrap(), "Monday");
        assert_eq!(row.number(columns::MONTH).unwrap(), 12.0);
        assert_eq!(row.category(columns::MONTH).unwrap(), "12");
        assert_eq!(row.number(columns::DAY_NUMBER).unwrap(), 20.0);
        assert_eq!(row.number(columns::CONCURRENT_FLIGHTS).unwrap(), 4.0);
        assert!(!row.contains(columns::SCHEDULED));
    }

    #[test]
    fn test_derive_without_concurrency() {
        let row = FeatureAssembler::derive(&make_record("2017-01-01 23:30:00", "LAN"), None)
            .unwrap();
        assert!(!row.contains(columns::CONCURRENT_FLIGHTS));
        assert_eq!(row.category(columns::DAY_PHASE).unwrap(), "night");
    }

    #[test]
    fn test_derive_malformed_timestamp() {
        let err = FeatureAssembler::derive(&make_record("20-12-2021 08:30", "LAN"), None)
            .unwrap_err();
        assert!(matches!(err, DelayError::MalformedTimestamp { .. }));
    }

    #[test]
    fn test_encode_layout() {
        let config = FeatureConfig::new(
            &[columns::HIGH_SEASON, columns::CONCURRENT_FLIGHTS],
            &[columns::CARRIER, columns::DAY_PHASE],
            "is_delayed",
        );
        let assembler = FeatureAssembler::new(&config);
        let rows = vec![
            FeatureAssembler::derive(&make_record("2017-01-02 08:00:00", "LAN"), Some(2)).unwrap(),
            FeatureAssembler::derive(&make_record("2017-05-02 15:00:00", "AAL"), Some(1)).unwrap(),
        ];
        let encoder = assembler.fit_encoder(&rows).unwrap();

        assert_eq!(
            assembler.feature_names(&encoder),
            [
                "is_high_season",
                "Conc-Flights",
                "Emp-I_AAL",
                "Emp-I_LAN",
                "day_phase_evening",
                "day_phase_morning"
            ]
        );

        let encoded = assembler.encode(&rows[0], &encoder).unwrap();
        assert_eq!(encoded.values, vec![1.0, 2.0, 0.0, 1.0, 0.0, 1.0]);
        assert!(encoded.unknown.is_empty());
    }

    #[test]
    fn test_encode_missing_numerical_column() {
        let config = FeatureConfig::new(&[columns::CONCURRENT_FLIGHTS], &[columns::CARRIER], "y");
        let assembler = FeatureAssembler::new(&config);
        let row = FeatureAssembler::derive(&make_record("2017-01-02 08:00:00", "LAN"), None)
            .unwrap();
        let encoder = assembler.fit_encoder(std::slice::from_ref(&row)).unwrap();

        let err = assembler.encode(&row, &encoder).unwrap_err();
        assert!(matches!(
            err,
            DelayError::SchemaMismatch { ref column, .. } if column == "Conc-Flights"
        ));
    }

    #[test]
    fn test_non_numeric_numerical_column() {
        let mut row = RecordRow::new();
        row.insert("x", "abc");
        assert!(matches!(row.number("x"), Err(DelayError::SchemaMismatch { .. })));

        row.insert("y", "3");
        assert_eq!(row.number("y").unwrap(), 3.0);
    }

    #[test]
    fn test_check_encoder_columns() {
        let config = FeatureConfig::new(&[], &[columns::CARRIER], "y");
        let other = FeatureConfig::new(&[], &[columns::ORIGIN], "y");
        let row = FeatureAssembler::derive(&make_record("2017-01-02 08:00:00", "LAN"), None)
            .unwrap();
        let encoder = FeatureAssembler::new(&config)
            .fit_encoder(std::slice::from_ref(&row))
            .unwrap();

        assert!(FeatureAssembler::new(&config).check_encoder(&encoder).is_ok());
        assert!(matches!(
            FeatureAssembler::new(&other).check_encoder(&encoder),
            Err(DelayError::Config(_))
        ));
    }

    #[test]
    fn test_derive_keeps_extra_columns() {
        let mut record = make_record("2017-01-02 08:00:00", "LAN");
        record.extra.insert("OPERA".to_string(), "Grupo LATAM".into());
        record.extra.insert("Vlo-I".to_string(), FeatureValue::Number(226.0));

        let row = FeatureAssembler::derive(&record, None).unwrap();
        assert_eq!(row.category("OPERA").unwrap(), "Grupo LATAM");
        assert_eq!(row.number("Vlo-I").unwrap(), 226.0);

        let config = FeatureConfig::new(&["Vlo-I"], &["OPERA"], "y");
        let assembler = FeatureAssembler::new(&config);
        let encoder = assembler.fit_encoder(std::slice::from_ref(&row)).unwrap();
        assert_eq!(assembler.feature_names(&encoder), ["Vlo-I", "OPERA_Grupo LATAM"]);
        assert_eq!(assembler.encode(&row, &encoder).unwrap().values, vec![226.0, 1.0]);
    }

    #[test]
    fn test_absent_raw_column_only_fails_when_configured() {
        let mut record = make_record("2017-01-02 08:00:00", "LAN");
        record.origin = None;
        let row = FeatureAssembler::derive(&record, None).unwrap();
        assert!(!row.contains(columns::ORIGIN));

        let unconfigured = FeatureConfig::new(&[], &[columns::CARRIER], "y");
        let assembler = FeatureAssembler::new(&unconfigured);
        let encoder = assembler.fit_encoder(std::slice::from_ref(&row)).unwrap();
        assert!(assembler.encode(&row, &encoder).is_ok());

        let configured = FeatureConfig::new(&[], &[columns::ORIGIN], "y");
        let err = FeatureAssembler::new(&configured)
            .fit_encoder(std::slice::from_ref(&row))
            .unwrap_err();
        assert!(matches!(
            err,
            DelayError::SchemaMismatch { ref column, .. } if column == "Ori-I"
        ));
    }

    #[test]
    fn test_feature_row_tensor() {
        let row = FeatureRow {
            columns: vec!["a".into(), "b".into(), "c".into()],
            values: vec![1.0, 0.0, 3.0],
        };
        assert_eq!(row.get("c"), Some(3.0));
        assert_eq!(row.get("z"), None);

        let device = Default::default();
        let tensor = row.to_tensor::<TestBackend>(&device);
        assert_eq!(tensor.dims(), [1, 3]);
    }
}
