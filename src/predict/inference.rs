//! Single-record inference
//!
//! An [`InferenceSession`] bundles a frozen encoder, the feature config and
//! a classifier. It is immutable after construction, so one session can be
//! shared behind an `Arc` by every request handler.

use serde::Serialize;
use std::path::Path;

use crate::features::encoding::{OneHotEncoder, UnknownCategory};
use crate::features::{FeatureAssembler, FeatureRow};
use crate::{Config, FeatureConfig, FlightRecord, Result};

/// Anything that maps an encoded feature row to a delay probability
pub trait DelayClassifier: Send + Sync {
    fn delay_probability(&self, features: &[f32]) -> f32;
}

impl<F> DelayClassifier for F
where
    F: Fn(&[f32]) -> f32 + Send + Sync,
{
    fn delay_probability(&self, features: &[f32]) -> f32 {
        self(features)
    }
}

/// Inference-time knobs
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOptions {
    /// Used when a request carries no `Conc-Flights` value. `None` makes
    /// such requests fail if the column is a configured feature.
    pub default_concurrency: Option<u32>,
    /// Probabilities at or above this are reported as delayed
    pub decision_threshold: f32,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        InferenceOptions {
            default_concurrency: Some(1),
            decision_threshold: 0.5,
        }
    }
}

impl InferenceOptions {
    pub fn from_config(config: &Config) -> Self {
        InferenceOptions {
            default_concurrency: config.inference.default_concurrency,
            ..Self::default()
        }
    }
}

/// Model-ready row plus the categories that fell outside the encoder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preprocessed {
    pub row: FeatureRow,
    pub unknown: Vec<UnknownCategory>,
}

/// Inference path of the feature pipeline
#[derive(Debug, Clone)]
pub struct FeaturePreprocessor {
    encoder: OneHotEncoder,
    feature_config: FeatureConfig,
    options: InferenceOptions,
    feature_names: Vec<String>,
}

impl FeaturePreprocessor {
    /// Fails if the encoder was fitted on other categorical columns
    pub fn new(
        encoder: OneHotEncoder,
        feature_config: FeatureConfig,
        options: InferenceOptions,
    ) -> Result<Self> {
        let assembler = FeatureAssembler::new(&feature_config);
        assembler.check_encoder(&encoder)?;
        let feature_names = assembler.feature_names(&encoder);

        Ok(FeaturePreprocessor {
            encoder,
            feature_config,
            options,
            feature_names,
        })
    }

    /// Load a persisted encoder and feature config
    pub fn load<P: AsRef<Path>>(
        encoder_path: P,
        feature_config_path: &str,
        options: InferenceOptions,
    ) -> Result<Self> {
        let encoder = OneHotEncoder::load(encoder_path.as_ref())?;
        let feature_config = FeatureConfig::load(feature_config_path)?;
        log::info!(
            "Loaded encoder from {} ({} one-hot columns)",
            encoder_path.as_ref().display(),
            encoder.width()
        );
        Self::new(encoder, feature_config, options)
    }

    pub fn encoder(&self) -> &OneHotEncoder {
        &self.encoder
    }

    pub fn feature_config(&self) -> &FeatureConfig {
        &self.feature_config
    }

    pub fn options(&self) -> &InferenceOptions {
        &self.options
    }

    /// Column names of every row this preprocessor produces
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Derive and encode one record with the frozen encoder
    pub fn preprocess(&self, record: &FlightRecord) -> Result<Preprocessed> {
        let concurrency = match record.concurrent_flights {
            Some(count) => Some(count),
            None => {
                if let Some(default) = self.options.default_concurrency {
                    log::warn!(
                        "No concurrency supplied for flight at {}, using {}",
                        record.scheduled,
                        default
                    );
                }
                self.options.default_concurrency
            }
        };

        let row = FeatureAssembler::derive(record, concurrency)?;
        let transformed = FeatureAssembler::new(&self.feature_config).encode(&row, &self.encoder)?;

        for unknown in &transformed.unknown {
            log::warn!(
                "Unknown category {:?} in column {}, encoded as zeros",
                unknown.value,
                unknown.column
            );
        }

        Ok(Preprocessed {
            row: FeatureRow {
                columns: self.feature_names.clone(),
                values: transformed.values,
            },
            unknown: transformed.unknown,
        })
    }
}

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub is_delayed: bool,
    pub delay_probability: f32,
    pub unknown_categories: Vec<UnknownCategory>,
}

/// Immutable inference context
pub struct InferenceSession<C: DelayClassifier> {
    preprocessor: FeaturePreprocessor,
    classifier: C,
}

impl<C: DelayClassifier> InferenceSession<C> {
    pub fn new(
        classifier: C,
        encoder: OneHotEncoder,
        feature_config: FeatureConfig,
        options: InferenceOptions,
    ) -> Result<Self> {
        let preprocessor = FeaturePreprocessor::new(encoder, feature_config, options)?;
        Ok(Self::with_preprocessor(classifier, preprocessor))
    }

    pub fn with_preprocessor(classifier: C, preprocessor: FeaturePreprocessor) -> Self {
        InferenceSession {
            preprocessor,
            classifier,
        }
    }

    pub fn preprocessor(&self) -> &FeaturePreprocessor {
        &self.preprocessor
    }

    /// Model-ready row for one record
    pub fn preprocess(&self, record: &FlightRecord) -> Result<FeatureRow> {
        Ok(self.preprocessor.preprocess(record)?.row)
    }

    /// Predict a single flight
    pub fn predict(&self, record: &FlightRecord) -> Result<Prediction> {
        let Preprocessed { row, unknown } = self.preprocessor.preprocess(record)?;
        let delay_probability = self.classifier.delay_probability(&row.values);
        log::debug!(
            "Flight {} {}: delay probability {:.3}",
            record.carrier.as_deref().unwrap_or("?"),
            record.scheduled,
            delay_probability
        );

        Ok(Prediction {
            is_delayed: delay_probability >= self.preprocessor.options.decision_threshold,
            delay_probability,
            unknown_categories: unknown,
        })
    }

    /// Predict multiple flights independently
    pub fn predict_batch(&self, records: &[FlightRecord]) -> Vec<Result<Prediction>> {
        records.iter().map(|record| self.predict(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns;
    use crate::data::dataset::{derive_batch, TrainingOptions, TrainingSet};
    use crate::DelayError;
    use std::sync::Arc;

    fn make_flight(scheduled: &str, actual: &str, carrier: &str, origin: &str) -> FlightRecord {
        FlightRecord {
            scheduled: scheduled.to_string(),
            actual: Some(actual.to_string()),
            origin: Some(origin.to_string()),
            destination: Some("SCFA".to_string()),
            carrier: Some(carrier.to_string()),
            flight_type: Some("N".to_string()),
            ..FlightRecord::default()
        }
    }

    fn training_flights() -> Vec<FlightRecord> {
        vec![
            make_flight("2017-01-02 08:00:00", "2017-01-02 08:05:00", "LAN", "SCEL"),
            make_flight("2017-01-02 08:30:00", "2017-01-02 09:10:00", "SKU", "SCEL"),
            make_flight("2017-01-03 10:00:00", "2017-01-03 10:00:00", "LAN", "SCEL"),
            make_flight("2017-05-10 15:00:00", "2017-05-10 15:20:00", "AAL", "SCEL"),
            make_flight("2017-05-11 20:30:00", "2017-05-11 20:31:00", "SKU", "SCEL"),
        ]
    }

    fn feature_config() -> FeatureConfig {
        FeatureConfig::new(
            &[columns::HIGH_SEASON, columns::CONCURRENT_FLIGHTS],
            &[columns::ORIGIN, columns::CARRIER, columns::DAY_PHASE],
            "is_delayed",
        )
    }

    fn fitted_encoder() -> OneHotEncoder {
        TrainingSet::build(&training_flights(), &feature_config(), &TrainingOptions::default())
            .unwrap()
            .encoder
    }

    fn preprocessor(options: InferenceOptions) -> FeaturePreprocessor {
        FeaturePreprocessor::new(fitted_encoder(), feature_config(), options).unwrap()
    }

    #[test]
    fn test_training_and_inference_parity() {
        let config = feature_config();
        let encoder = fitted_encoder();
        let assembler = FeatureAssembler::new(&config);
        let preprocessor =
            FeaturePreprocessor::new(encoder.clone(), config.clone(), InferenceOptions::default())
                .unwrap();

        for flight in training_flights() {
            // A batch of one always counts itself once
            let rows = derive_batch(
                std::slice::from_ref(&flight),
                &config.target,
                &TrainingOptions::default(),
            )
            .unwrap();
            let training = assembler.encode(&rows[0], &encoder).unwrap();

            let mut request = flight.clone();
            request.actual = None;
            request.concurrent_flights = Some(1);
            let inference = preprocessor.preprocess(&request).unwrap();

            assert_eq!(inference.row.values, training.values);
            assert_eq!(inference.row.columns, assembler.feature_names(&encoder));
        }
    }

    #[test]
    fn test_unknown_category_zero_block() {
        let preprocessor = preprocessor(InferenceOptions::default());
        let mut request = make_flight("2017-01-02 08:00:00", "2017-01-02 08:00:00", "XYZ", "SCEL");
        request.concurrent_flights = Some(3);

        let out = preprocessor.preprocess(&request).unwrap();
        assert_eq!(out.row.width(), preprocessor.feature_names().len());
        assert_eq!(
            out.unknown,
            vec![UnknownCategory {
                column: "Emp-I".to_string(),
                value: "XYZ".to_string(),
            }]
        );

        let carrier_ones: f32 = out
            .row
            .columns
            .iter()
            .zip(&out.row.values)
            .filter(|(name, _)| name.starts_with("Emp-I_"))
            .map(|(_, v)| *v)
            .sum();
        assert_eq!(carrier_ones, 0.0);
        assert_eq!(out.row.get("Emp-I_LAN"), Some(0.0));
        assert_eq!(out.row.get("Ori-I_SCEL"), Some(1.0));
        assert_eq!(out.row.get("Conc-Flights"), Some(3.0));
    }

    #[test]
    fn test_missing_concurrency_defaults() {
        let preprocessor = preprocessor(InferenceOptions::default());
        let request = make_flight("2017-01-02 08:00:00", "2017-01-02 08:00:00", "LAN", "SCEL");

        let out = preprocessor.preprocess(&request).unwrap();
        assert_eq!(out.row.get("Conc-Flights"), Some(1.0));
        assert_eq!(out.row.get("is_high_season"), Some(1.0));
    }

    #[test]
    fn test_missing_concurrency_without_default() {
        let preprocessor = preprocessor(InferenceOptions {
            default_concurrency: None,
            ..InferenceOptions::default()
        });
        let request = make_flight("2017-01-02 08:00:00", "2017-01-02 08:00:00", "LAN", "SCEL");

        let err = preprocessor.preprocess(&request).unwrap_err();
        assert!(matches!(
            err,
            DelayError::SchemaMismatch { ref column, .. } if column == "Conc-Flights"
        ));
    }

    #[test]
    fn test_request_missing_unconfigured_columns() {
        let preprocessor = preprocessor(InferenceOptions::default());
        let request: FlightRecord = serde_json::from_str(
            r#"{"Fecha-I": "2017-01-02 08:00:00", "Ori-I": "SCEL", "Emp-I": "LAN"}"#,
        )
        .unwrap();

        let out = preprocessor.preprocess(&request).unwrap();
        assert_eq!(out.row.get("Emp-I_LAN"), Some(1.0));
        assert!(out.unknown.is_empty());
    }

    #[test]
    fn test_request_missing_configured_column() {
        let preprocessor = preprocessor(InferenceOptions::default());
        let request: FlightRecord =
            serde_json::from_str(r#"{"Fecha-I": "2017-01-02 08:00:00", "Emp-I": "LAN"}"#)
                .unwrap();

        let err = preprocessor.preprocess(&request).unwrap_err();
        assert!(matches!(
            err,
            DelayError::SchemaMismatch { ref column, .. } if column == "Ori-I"
        ));

        let request: FlightRecord = serde_json::from_str(r#"{"Emp-I": "LAN"}"#).unwrap();
        let err = preprocessor.preprocess(&request).unwrap_err();
        assert!(matches!(
            err,
            DelayError::SchemaMismatch { ref column, .. } if column == "Fecha-I"
        ));
    }

    #[test]
    fn test_extra_raw_column_as_feature() {
        let operator = |carrier: &str| match carrier {
            "LAN" => "Grupo LATAM",
            "SKU" => "Sky Airline",
            _ => "American Airlines",
        };
        let flights: Vec<FlightRecord> = training_flights()
            .into_iter()
            .map(|mut f| {
                let name = operator(f.carrier.as_deref().unwrap_or_default());
                f.extra.insert("OPERA".to_string(), name.into());
                f
            })
            .collect();
        let config = FeatureConfig::new(
            &[columns::HIGH_SEASON],
            &["OPERA", columns::CARRIER],
            "is_delayed",
        );

        let set = TrainingSet::build(&flights, &config, &TrainingOptions::default()).unwrap();
        assert!(set.table.columns().iter().any(|c| c == "OPERA_Sky Airline"));

        let preprocessor =
            FeaturePreprocessor::new(set.encoder, config, InferenceOptions::default()).unwrap();
        let request: FlightRecord = serde_json::from_str(
            r#"{"Fecha-I": "2017-05-10 15:00:00", "Emp-I": "AAL", "OPERA": "American Airlines"}"#,
        )
        .unwrap();

        let out = preprocessor.preprocess(&request).unwrap();
        assert_eq!(out.row.columns, set.table.columns());
        assert_eq!(out.row.get("OPERA_American Airlines"), Some(1.0));
        assert_eq!(out.row.get("Emp-I_AAL"), Some(1.0));
        assert_eq!(out.row.get("is_high_season"), Some(0.0));
    }

    #[test]
    fn test_malformed_request_timestamp() {
        let preprocessor = preprocessor(InferenceOptions::default());
        let request = make_flight("02/01/2017 08:00", "", "LAN", "SCEL");

        let err = preprocessor.preprocess(&request).unwrap_err();
        assert!(matches!(err, DelayError::MalformedTimestamp { .. }));
    }

    #[test]
    fn test_mismatched_encoder_rejected() {
        let other = FeatureConfig::new(&[], &[columns::DESTINATION], "is_delayed");
        let err =
            FeaturePreprocessor::new(fitted_encoder(), other, InferenceOptions::default())
                .unwrap_err();
        assert!(matches!(err, DelayError::Config(_)));
    }

    #[test]
    fn test_session_predict() {
        // Delayed whenever the flight is in high season
        let classifier = |features: &[f32]| -> f32 { if features[0] > 0.5 { 0.9 } else { 0.2 } };
        let session = InferenceSession::new(
            classifier,
            fitted_encoder(),
            feature_config(),
            InferenceOptions::default(),
        )
        .unwrap();

        let records = vec![
            make_flight("2017-01-02 08:00:00", "", "LAN", "SCEL"),
            make_flight("2017-05-10 15:00:00", "", "AAL", "SCEL"),
            make_flight("bad", "", "AAL", "SCEL"),
        ];
        let predictions = session.predict_batch(&records);

        let first = predictions[0].as_ref().unwrap();
        assert!(first.is_delayed);
        assert_eq!(first.delay_probability, 0.9);
        assert!(first.unknown_categories.is_empty());

        assert!(!predictions[1].as_ref().unwrap().is_delayed);
        assert!(predictions[2].is_err());
    }

    #[test]
    fn test_session_shared_across_threads() {
        let session = Arc::new(
            InferenceSession::new(
                |_: &[f32]| 0.5f32,
                fitted_encoder(),
                feature_config(),
                InferenceOptions::default(),
            )
            .unwrap(),
        );
        let request = make_flight("2017-01-02 08:00:00", "", "LAN", "SCEL");
        let expected = session.preprocess(&request).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                let request = request.clone();
                std::thread::spawn(move || session.preprocess(&request).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_load_persisted_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let encoder_path = dir.path().join("encoder.json");
        let config_path = dir.path().join("config.json");

        let encoder = fitted_encoder();
        encoder.save(&encoder_path).unwrap();
        std::fs::write(
            &config_path,
            serde_json::to_string(&feature_config()).unwrap(),
        )
        .unwrap();

        let loaded = FeaturePreprocessor::load(
            &encoder_path,
            config_path.to_str().unwrap(),
            InferenceOptions::default(),
        )
        .unwrap();
        let fresh = preprocessor(InferenceOptions::default());

        let request = make_flight("2017-05-10 15:00:00", "", "SKU", "SCEL");
        assert_eq!(
            loaded.preprocess(&request).unwrap(),
            fresh.preprocess(&request).unwrap()
        );
    }
}
