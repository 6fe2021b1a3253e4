//! One-hot encoding of categorical features
//!
//! The encoder is fitted once on the balanced training set and then only
//! read: inference transforms with the frozen category lists and never
//! refits. A category not seen during fitting encodes to an all-zero block
//! and is reported back so the caller can log or reject it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::{DelayError, Result};

/// Known categories of one categorical column, sorted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryColumn {
    pub name: String,
    pub categories: Vec<String>,
}

impl CategoryColumn {
    fn position(&self, value: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    fn encode(&self, value: &str) -> Encoded {
        match self.position(value) {
            Some(pos) => {
                let mut indicators = vec![0.0; self.categories.len()];
                indicators[pos] = 1.0;
                Encoded::Known(indicators)
            }
            None => Encoded::Unknown,
        }
    }
}

/// Result of encoding a single categorical value
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// Indicator vector with exactly one 1.0
    Known(Vec<f32>),
    /// Not seen during fitting
    Unknown,
}

/// A category value the encoder has never seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownCategory {
    pub column: String,
    pub value: String,
}

/// One-hot block for a full set of categorical values
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub values: Vec<f32>,
    /// Categories that were encoded as zero blocks
    pub unknown: Vec<UnknownCategory>,
}

/// Fitted categorical-to-one-hot mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    columns: Vec<CategoryColumn>,
}

impl OneHotEncoder {
    /// Fit on `samples`, each holding one category per entry of `columns`
    pub fn fit<S: AsRef<str>>(columns: &[String], samples: &[Vec<S>]) -> Result<Self> {
        let mut seen: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); columns.len()];

        for sample in samples {
            if sample.len() != columns.len() {
                return Err(DelayError::SchemaMismatch {
                    column: columns.join(","),
                    message: format!(
                        "expected {} categorical values, got {}",
                        columns.len(),
                        sample.len()
                    ),
                });
            }
            for (set, value) in seen.iter_mut().zip(sample) {
                set.insert(value.as_ref());
            }
        }

        let columns = columns
            .iter()
            .zip(seen)
            .map(|(name, set)| CategoryColumn {
                name: name.clone(),
                categories: set.into_iter().map(str::to_string).collect(),
            })
            .collect();

        Ok(OneHotEncoder { columns })
    }

    /// Encode one value of the column at `column`; `None` if there is no
    /// such column
    pub fn encode(&self, column: usize, value: &str) -> Option<Encoded> {
        self.columns.get(column).map(|col| col.encode(value))
    }

    /// Encode a full set of categorical values, one per fitted column
    pub fn transform<S: AsRef<str>>(&self, values: &[S]) -> Result<Transformed> {
        if values.len() != self.columns.len() {
            return Err(DelayError::SchemaMismatch {
                column: self.column_names().join(","),
                message: format!(
                    "expected {} categorical values, got {}",
                    self.columns.len(),
                    values.len()
                ),
            });
        }

        let mut out = Vec::with_capacity(self.width());
        let mut unknown = Vec::new();

        for (col, value) in self.columns.iter().zip(values) {
            let value = value.as_ref();
            match col.encode(value) {
                Encoded::Known(indicators) => out.extend(indicators),
                Encoded::Unknown => {
                    out.extend(std::iter::repeat(0.0).take(col.categories.len()));
                    unknown.push(UnknownCategory {
                        column: col.name.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }

        Ok(Transformed {
            values: out,
            unknown,
        })
    }

    /// Recover the category behind an indicator block; `None` for an
    /// all-zero (unknown) block
    pub fn decode(&self, column: usize, indicators: &[f32]) -> Option<&str> {
        let col = self.columns.get(column)?;
        if indicators.len() != col.categories.len() {
            return None;
        }
        indicators
            .iter()
            .position(|&v| v > 0.5)
            .map(|pos| col.categories[pos].as_str())
    }

    /// Total width of the one-hot block
    pub fn width(&self) -> usize {
        self.columns.iter().map(|c| c.categories.len()).sum()
    }

    pub fn columns(&self) -> &[CategoryColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Output column names, `<column>_<category>` in output order
    pub fn feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|c| {
                c.categories
                    .iter()
                    .map(move |cat| format!("{}_{}", c.name, cat))
            })
            .collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
