//! Feature extraction and encoding
//!
//! Converts raw flight records into model-ready features.

pub mod assembler;
pub mod concurrency;
pub mod delay;
pub mod encoding;
pub mod temporal;

pub use assembler::{DerivedFeatures, FeatureAssembler, FeatureRow, FeatureValue, RecordRow};
pub use concurrency::ConcurrencyCounter;
pub use delay::DelayLabeler;
pub use encoding::{Encoded, OneHotEncoder, Transformed, UnknownCategory};
pub use temporal::{DayPhase, TemporalContext};
