//! Prediction Node Library
//!
//! This library provides the HTTP surface of SmartShield: configuration,
//! telemetry setup and the batch prediction API.

pub mod api;
pub mod config;
pub mod telemetry;

// Re-export commonly used types
pub use api::{create_router, ApiError, AppState, PredictionResponse};
pub use config::{LogFormat, NodeConfig};
