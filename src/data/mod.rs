//! Data ingestion and the training path
//!
//! Flight record loading, class balancing and the encoded feature table.

pub mod balance;
pub mod dataset;
pub mod loader;

pub use balance::ClassBalancer;
pub use dataset::{
    derive_batch, FeatureBatch, FeatureBatcher, FeatureSample, FeatureTable, TrainingOptions,
    TrainingSet,
};
pub use loader::{load_records, read_records, save_records};
