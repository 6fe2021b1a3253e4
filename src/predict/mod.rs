//! Prediction and inference
//!
//! Run the inference path on single records with a frozen encoder.

pub mod inference;

pub use inference::{
    DelayClassifier, FeaturePreprocessor, InferenceOptions, InferenceSession, Prediction,
    Preprocessed,
};
