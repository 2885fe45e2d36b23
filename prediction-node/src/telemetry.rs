//! Logging and metrics setup

use anyhow::{Context, Result};
use metrics::describe_counter;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

pub const REQUESTS_TOTAL: &str = "prediction_requests_total";
pub const ROWS_TOTAL: &str = "prediction_rows_total";
pub const ERRORS_TOTAL: &str = "prediction_errors_total";
pub const MODEL_LOADS_TOTAL: &str = "model_load_total";

/// Initialize structured logging; RUST_LOG takes precedence over the configured level
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Initialize metrics descriptions
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of prediction requests, by mode");
    describe_counter!(ROWS_TOTAL, "Total number of rows scored, by mode");
    describe_counter!(ERRORS_TOTAL, "Total number of failed prediction requests, by mode");
    describe_counter!(MODEL_LOADS_TOTAL, "Total number of model artifacts loaded");
}

/// Install the Prometheus exporter with its own HTTP listener
pub fn start_metrics_exporter(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    describe_metrics();
    info!(metrics_addr = %addr, "Prometheus metrics server started");
    Ok(())
}
