//! Binary classification metrics

use serde::Serialize;
use std::fmt;

use crate::data::dataset::FeatureTable;
use crate::predict::DelayClassifier;

/// Confusion counts for the delayed (positive) class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BinaryMetrics {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl BinaryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one prediction against its label
    pub fn update(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    /// Get the number of scored predictions
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// Get the share of correct predictions
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// Get the share of predicted delays that were delayed
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// Get the share of delayed flights that were predicted
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Get the harmonic mean of precision and recall
    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Merge another metrics instance
    pub fn merge(&mut self, other: &BinaryMetrics) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.true_negatives += other.true_negatives;
        self.false_negatives += other.false_negatives;
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for BinaryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Acc: {:.2}% | Precision: {:.3} | Recall: {:.3} | F1: {:.3} (n={})",
            self.accuracy() * 100.0,
            self.precision(),
            self.recall(),
            self.f1(),
            self.total()
        )
    }
}

/// Score `classifier` on every row of `table`
pub fn evaluate<C: DelayClassifier + ?Sized>(
    classifier: &C,
    table: &FeatureTable,
    threshold: f32,
) -> BinaryMetrics {
    let mut metrics = BinaryMetrics::new();
    for (row, &label) in table.rows().iter().zip(table.labels()) {
        let predicted = classifier.delay_probability(row) >= threshold;
        metrics.update(predicted, label == 1);
    }
    metrics
}
