//! Training feature table
//!
//! Runs the training path over a full batch: temporal features and delay
//! label per record, concurrency over the batch, majority downsampling,
//! then a freshly fitted encoder. The resulting [`FeatureTable`] plugs into
//! burn through [`Dataset`] and [`FeatureBatcher`].

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use std::path::Path;

use crate::data::balance::ClassBalancer;
use crate::features::concurrency::ConcurrencyCounter;
use crate::features::delay::DelayLabeler;
use crate::features::encoding::OneHotEncoder;
use crate::features::temporal::parse_timestamp;
use crate::features::{FeatureAssembler, FeatureRow, RecordRow};
use crate::{columns, Config, DelayError, FeatureConfig, FlightRecord, Result};

/// Knobs of the training path
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub threshold_minutes: f64,
    pub window_hours: f64,
    /// Batches this large use the rayon concurrency scan (0 disables)
    pub parallel_threshold: usize,
    pub seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        TrainingOptions::from_config(&Config::default())
    }
}

impl TrainingOptions {
    pub fn from_config(config: &Config) -> Self {
        TrainingOptions {
            threshold_minutes: config.labeling.threshold_minutes,
            window_hours: config.concurrency.window_hours,
            parallel_threshold: config.concurrency.parallel_threshold,
            seed: config.balancing.seed,
        }
    }
}

/// Derive labeled record rows for a whole batch, in input order
///
/// Each row carries the configured target column (0/1) and the batch
/// concurrency count. Records without an actual departure fail with
/// [`DelayError::SchemaMismatch`].
pub fn derive_batch(
    records: &[FlightRecord],
    target: &str,
    options: &TrainingOptions,
) -> Result<Vec<RecordRow>> {
    let scheduled = records
        .iter()
        .map(|r| parse_timestamp(r.scheduled_departure()?))
        .collect::<Result<Vec<_>>>()?;

    let counts = ConcurrencyCounter::new(options.window_hours)
        .with_parallel_threshold(options.parallel_threshold)
        .count(&scheduled);
    let labeler = DelayLabeler::new(options.threshold_minutes);

    records
        .iter()
        .zip(counts)
        .map(|(record, count)| {
            let actual = record
                .actual
                .as_deref()
                .ok_or_else(|| DelayError::missing_column(columns::ACTUAL))?;
            let mut row = FeatureAssembler::derive(record, Some(count))?;
            row.insert(target, labeler.label(&record.scheduled, actual)?);
            Ok(row)
        })
        .collect()
}

/// One labeled, encoded sample
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSample {
    pub features: Vec<f32>,
    /// 1 = delayed
    pub label: u8,
}

/// Encoded training rows sharing one column layout
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<f32>>,
    labels: Vec<u8>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f32>>, labels: Vec<u8>) -> Result<Self> {
        if rows.len() != labels.len() {
            return Err(DelayError::SchemaMismatch {
                column: "label".to_string(),
                message: format!("{} rows but {} labels", rows.len(), labels.len()),
            });
        }
        if let Some(row) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(DelayError::SchemaMismatch {
                column: columns.join(","),
                message: format!("row has {} values, expected {}", row.len(), columns.len()),
            });
        }
        Ok(FeatureTable {
            columns,
            rows,
            labels,
        })
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Get whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the number of feature columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Get the feature column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get the encoded rows
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Get the labels, 1 = delayed
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Get the number of delayed rows
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Get one row with its column names
    pub fn row(&self, index: usize) -> Option<FeatureRow> {
        self.rows.get(index).map(|values| FeatureRow {
            columns: self.columns.clone(),
            values: values.clone(),
        })
    }

    /// Table made of the rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        FeatureTable {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Write as CSV: feature columns, then the label under `target`
    pub fn write_csv<P: AsRef<Path>>(&self, path: P, target: &str) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.columns.iter().map(String::as_str).chain([target]))?;
        for (values, label) in self.rows.iter().zip(&self.labels) {
            writer.write_record(
                values
                    .iter()
                    .map(|v| v.to_string())
                    .chain([label.to_string()]),
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a table written by [`write_csv`](Self::write_csv)
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let target = columns
            .pop()
            .ok_or_else(|| DelayError::missing_column("label"))?;

        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut values = record
                .iter()
                .zip(columns.iter().chain([&target]))
                .map(|(field, column)| {
                    field.parse::<f32>().map_err(|_| DelayError::SchemaMismatch {
                        column: column.clone(),
                        message: format!("non-numeric cell {:?}", field),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let label = values.pop().ok_or_else(|| DelayError::missing_column(&target))?;
            labels.push(u8::from(label > 0.5));
            rows.push(values);
        }

        Self::new(columns, rows, labels)
    }

    /// Feature matrix `[rows, width]`
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let data: Vec<f32> = self.rows.iter().flatten().copied().collect();
        Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([self.len(), self.width()])
    }
}

impl Dataset<FeatureSample> for FeatureTable {
    fn get(&self, index: usize) -> Option<FeatureSample> {
        Some(FeatureSample {
            features: self.rows.get(index)?.clone(),
            label: self.labels[index],
        })
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Output of the training path
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub table: FeatureTable,
    /// Fitted on `table`'s rows; reuse it unchanged for inference
    pub encoder: OneHotEncoder,
}

impl TrainingSet {
    /// Run the full training path over a batch of records
    pub fn build(
        records: &[FlightRecord],
        feature_config: &FeatureConfig,
        options: &TrainingOptions,
    ) -> Result<Self> {
        let target = feature_config.target.as_str();
        let rows = derive_batch(records, target, options)?;
        let is_positive = |row: &RecordRow| row.number(target).map(|v| v > 0.5).unwrap_or(false);

        log::info!(
            "Derived features for {} flights, {} delayed",
            rows.len(),
            rows.iter().filter(|r| is_positive(*r)).count()
        );

        let balanced = ClassBalancer::new(options.seed).downsample(rows, is_positive)?;

        let assembler = FeatureAssembler::new(feature_config);
        let encoder = assembler.fit_encoder(&balanced)?;

        let mut encoded = Vec::with_capacity(balanced.len());
        let mut labels = Vec::with_capacity(balanced.len());
        for row in &balanced {
            encoded.push(assembler.encode(row, &encoder)?.values);
            labels.push(u8::from(is_positive(row)));
        }

        let table = FeatureTable::new(assembler.feature_names(&encoder), encoded, labels)?;
        log::info!(
            "Training table: {} rows x {} features ({} one-hot)",
            table.len(),
            table.width(),
            encoder.width()
        );

        Ok(TrainingSet { table, encoder })
    }
}

/// Batch of encoded samples
#[derive(Debug, Clone)]
pub struct FeatureBatch<B: Backend> {
    /// `[batch, width]`
    pub features: Tensor<B, 2>,
    /// `[batch]`
    pub labels: Tensor<B, 1, Int>,
}

/// Batcher turning [`FeatureSample`]s into tensors
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBatcher;

impl<B: Backend> Batcher<B, FeatureSample, FeatureBatch<B>> for FeatureBatcher {
    fn batch(&self, items: Vec<FeatureSample>, device: &B::Device) -> FeatureBatch<B> {
        let batch_size = items.len();
        let width = items.first().map(|s| s.features.len()).unwrap_or(0);

        let mut feature_data = Vec::with_capacity(batch_size * width);
        let mut label_data = Vec::with_capacity(batch_size);
        for sample in &items {
            feature_data.extend_from_slice(&sample.features);
            label_data.push(sample.label as i32);
        }

        let features = Tensor::<B, 1>::from_floats(feature_data.as_slice(), device)
            .reshape([batch_size, width]);
        let labels = Tensor::<B, 1, Int>::from_ints(label_data.as_slice(), device);

        FeatureBatch { features, labels }
    }
}
