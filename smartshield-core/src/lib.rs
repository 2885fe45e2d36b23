//! SmartShield Core Library
//!
//! This library provides the prediction path for network-flow intrusion
//! detection: batch decoding, feature preprocessing and tree-ensemble scoring.

pub mod batch;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod gbdt;
pub mod model;
pub mod pipeline;
pub mod service;

// Re-export commonly used types
pub use batch::{Batch, Column, ColumnValues};
pub use catalog::{CategoryCatalog, CategoryWhitelist, DerivedFeature};
pub use codec::{decode_parquet, encode_parquet};
pub use error::{ModelError, PipelineStep, PredictionError, Result};
pub use model::{ClassScore, Probabilities, ScoringModel};
pub use pipeline::{FeaturePipeline, FeatureSchema};
pub use service::{combine_scores, CombinedPrediction, Mode, PredictionService, Predictions};
