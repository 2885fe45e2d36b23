use anyhow::{Context, Result};
use std::env;
use tracing::{error, info};

use prediction_node::config::{NodeConfig, DEFAULT_CONFIG_PATH};
use prediction_node::{api, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = NodeConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    // Initialize structured logging
    telemetry::init_logging(&config.logging)?;

    info!(
        "Starting SmartShield prediction node v{}",
        env!("CARGO_PKG_VERSION")
    );

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    if config.metrics.enabled {
        let metrics_addr = config.metrics_addr().map_err(|e| anyhow::anyhow!(e))?;
        telemetry::start_metrics_exporter(metrics_addr)?;
    } else {
        telemetry::describe_metrics();
    }

    let state = match api::AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to load models");
            return Err(e);
        }
    };
    info!(
        detection = state.service.has_detection(),
        classification = state.service.has_classification(),
        "Models ready"
    );

    let app = api::create_router(state, config.server.max_upload_bytes);
    let listen_addr = config.listen_addr().map_err(|e| anyhow::anyhow!(e))?;

    info!(%listen_addr, "Starting prediction API server");

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", listen_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("Prediction node stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining requests"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
