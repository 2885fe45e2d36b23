use std::fmt;
use thiserror::Error;

/// Preprocessing step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    DerivedFeatures,
    FeatureSelection,
    CategoryCanonicalization,
    LogTransform,
    TypeNormalization,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::DerivedFeatures => "derived features",
            PipelineStep::FeatureSelection => "feature selection",
            PipelineStep::CategoryCanonicalization => "category canonicalization",
            PipelineStep::LogTransform => "log transform",
            PipelineStep::TypeNormalization => "type normalization",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while turning a raw batch into predictions
#[derive(Error, Debug)]
pub enum PredictionError {
    /// The input batch could not be parsed from its wire format
    #[error("Decode error: {0}")]
    Decode(String),

    /// A batch could not be written to its wire format
    #[error("Encode error: {0}")]
    Encode(String),

    /// Required columns are missing after preprocessing
    #[error("Schema error during {}: missing column(s) {}", .step, .columns.join(", "))]
    Schema {
        step: PipelineStep,
        columns: Vec<String>,
    },

    /// A column holds values a preprocessing step cannot handle
    #[error("Preprocessing failed during {step} on column '{column}': {reason}")]
    Preprocessing {
        step: PipelineStep,
        column: String,
        reason: String,
    },

    /// The underlying model evaluation failed
    #[error("Scoring error: {0}")]
    Scoring(String),

    /// Detection and classification outputs disagree in length
    #[error("Alignment error: {detection} detection scores vs {classification} classification scores")]
    Alignment {
        detection: usize,
        classification: usize,
    },

    /// The requested mode has no model loaded
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
}

impl PredictionError {
    /// Whether the failure was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictionError::Decode(_))
    }
}

/// Result type alias using PredictionError
pub type Result<T> = std::result::Result<T, PredictionError>;

impl From<parquet::errors::ParquetError> for PredictionError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        PredictionError::Decode(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for PredictionError {
    fn from(err: arrow::error::ArrowError) -> Self {
        PredictionError::Decode(err.to_string())
    }
}

/// Errors raised while loading a model artifact
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
