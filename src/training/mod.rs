//! Training support
//!
//! Dataset splitting and classification metrics.

pub mod metrics;
pub mod split;

pub use metrics::{evaluate, BinaryMetrics};
pub use split::{split_table, SplitRatios, TableSplits};
