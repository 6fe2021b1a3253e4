//! Seeded train/validation/test split

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::dataset::FeatureTable;
use crate::{Config, DelayError, Result};

/// Split ratios for train/val/test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f32,
    pub val: f32,
    pub test: f32,
}

impl Default for SplitRatios {
    fn default() -> Self {
        SplitRatios {
            train: 0.70,
            val: 0.15,
            test: 0.15,
        }
    }
}

impl SplitRatios {
    pub fn from_config(config: &Config) -> Self {
        SplitRatios {
            train: config.split.train,
            val: config.split.val,
            test: config.split.test,
        }
    }

    fn validate(&self) -> Result<()> {
        let parts = [self.train, self.val, self.test];
        if parts.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(DelayError::Config(format!(
                "Split ratios must be non-negative: {:?}",
                self
            )));
        }
        if (parts.iter().sum::<f32>() - 1.0).abs() > 1e-3 {
            return Err(DelayError::Config(format!(
                "Split ratios must sum to 1: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Train/val/test tables
#[derive(Debug, Clone)]
pub struct TableSplits {
    pub train: FeatureTable,
    pub val: FeatureTable,
    pub test: FeatureTable,
}

/// Shuffle rows with `seed` and cut them by `ratios`
///
/// Train and validation sizes are truncated; the test split takes the rest.
pub fn split_table(table: &FeatureTable, ratios: SplitRatios, seed: u64) -> Result<TableSplits> {
    ratios.validate()?;

    let n = table.len();
    let n_train = (n as f32 * ratios.train) as usize;
    let n_val = ((n as f32 * ratios.val) as usize).min(n - n_train);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let splits = TableSplits {
        train: table.select(&indices[..n_train]),
        val: table.select(&indices[n_train..n_train + n_val]),
        test: table.select(&indices[n_train + n_val..]),
    };

    log::info!(
        "Split {} rows: train={}, val={}, test={}",
        n,
        splits.train.len(),
        splits.val.len(),
        splits.test.len()
    );

    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn make_table(n: usize) -> FeatureTable {
        FeatureTable::new(
            vec!["id".to_string()],
            (0..n).map(|i| vec![i as f32]).collect(),
            (0..n).map(|i| (i % 2) as u8).collect(),
        )
        .unwrap()
    }

    fn ids(table: &FeatureTable) -> Vec<usize> {
        table.rows().iter().map(|r| r[0] as usize).collect()
    }

    #[test]
    fn test_default_split_sizes() {
        let splits = split_table(&make_table(100), SplitRatios::default(), 42).unwrap();

        assert_eq!(splits.train.len(), 70);
        assert_eq!(splits.val.len(), 15);
        assert_eq!(splits.test.len(), 15);
    }

    #[test]
    fn test_split_is_partition() {
        let splits = split_table(&make_table(37), SplitRatios::default(), 42).unwrap();

        let mut all: Vec<usize> = ids(&splits.train);
        all.extend(ids(&splits.val));
        all.extend(ids(&splits.test));
        assert_eq!(all.len(), 37);
        assert_eq!(all.iter().copied().collect::<HashSet<_>>().len(), 37);

        // Labels travel with their rows
        for split in [&splits.train, &splits.val, &splits.test] {
            for (row, label) in split.rows().iter().zip(split.labels()) {
                assert_eq!((row[0] as usize % 2) as u8, *label);
            }
        }
    }

    #[test]
    fn test_split_reproducible() {
        let table = make_table(50);
        let a = split_table(&table, SplitRatios::default(), 7).unwrap();
        let b = split_table(&table, SplitRatios::default(), 7).unwrap();
        let c = split_table(&table, SplitRatios::default(), 8).unwrap();

        assert_eq!(ids(&a.train), ids(&b.train));
        assert_eq!(ids(&a.test), ids(&b.test));
        assert_ne!(ids(&a.train), ids(&c.train));
    }

    #[test]
    fn test_invalid_ratios() {
        let table = make_table(10);
        let bad_sum = SplitRatios {
            train: 0.8,
            val: 0.15,
            test: 0.15,
        };
        let negative = SplitRatios {
            train: 1.2,
            val: -0.2,
            test: 0.0,
        };

        assert!(matches!(
            split_table(&table, bad_sum, 42),
            Err(DelayError::Config(_))
        ));
        assert!(matches!(
            split_table(&table, negative, 42),
            Err(DelayError::Config(_))
        ));
    }

    #[test]
    fn test_empty_table() {
        let splits = split_table(&make_table(0), SplitRatios::default(), 42).unwrap();
        assert!(splits.train.is_empty() && splits.val.is_empty() && splits.test.is_empty());
    }
}
