//! Majority class downsampling (training only)

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::{DelayError, Result};

/// Downsamples on-time flights to the number of delayed ones
#[derive(Debug, Clone, Copy)]
pub struct ClassBalancer {
    seed: u64,
}

impl ClassBalancer {
    pub fn new(seed: u64) -> Self {
        ClassBalancer { seed }
    }

    /// Split `items` by label and, when the negative class is larger, keep
    /// a seeded random subset of it as large as the positive class.
    /// Sampled negatives come first, followed by every positive in input
    /// order. A larger positive class is returned as is.
    pub fn downsample<T, F>(&self, items: Vec<T>, is_positive: F) -> Result<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let (positives, negatives): (Vec<T>, Vec<T>) =
            items.into_iter().partition(|item| is_positive(item));

        if positives.is_empty() || negatives.is_empty() {
            return Err(DelayError::InsufficientClassData {
                negatives: negatives.len(),
                positives: positives.len(),
            });
        }

        let mut balanced = if negatives.len() > positives.len() {
            let mut rng = StdRng::seed_from_u64(self.seed);
            let keep = rand::seq::index::sample(&mut rng, negatives.len(), positives.len());
            let mut slots: Vec<Option<T>> = negatives.into_iter().map(Some).collect();
            keep.into_iter()
                .filter_map(|idx| slots[idx].take())
                .collect::<Vec<_>>()
        } else {
            negatives
        };

        log::info!(
            "Balanced classes: {} negative, {} positive",
            balanced.len(),
            positives.len()
        );

        balanced.extend(positives);
        Ok(balanced)
    }
}
