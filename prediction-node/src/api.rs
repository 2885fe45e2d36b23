//! HTTP API for batch predictions
//!
//! Every prediction route takes a multipart upload whose `file` field holds a
//! Parquet batch and answers `{"predictions": ...}`; failures answer
//! `{"detail": ...}`.

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use smartshield_core::{
    decode_parquet, CategoryCatalog, Mode, PredictionError, PredictionService, Predictions,
    ScoringModel,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::telemetry::{ERRORS_TOTAL, MODEL_LOADS_TOTAL, REQUESTS_TOTAL, ROWS_TOTAL};

/// Multipart field carrying the Parquet batch
pub const UPLOAD_FIELD: &str = "file";

const BANNER: &str = "SMARTSHIELD network intrusion detection";

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: PredictionService) -> Self {
        Self {
            service: Arc::new(service),
            started_at: Utc::now(),
        }
    }

    /// Load every configured model artifact
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let catalog = Arc::new(config.catalog.clone());

        let detection = load_model("detection", config.models.detection_path.as_deref(), &catalog)?;
        let classification = load_model(
            "classification",
            config.models.classification_path.as_deref(),
            &catalog,
        )?;

        Ok(Self::new(PredictionService::new(detection, classification)))
    }
}

fn load_model(
    name: &str,
    path: Option<&str>,
    catalog: &Arc<CategoryCatalog>,
) -> Result<Option<Arc<ScoringModel>>> {
    let Some(path) = path else {
        warn!(model = name, "No artifact configured, mode disabled");
        return Ok(None);
    };

    let model = ScoringModel::load(name, path, Arc::clone(catalog))
        .with_context(|| format!("Failed to load {} model from {}", name, path))?;
    counter!(MODEL_LOADS_TOTAL, 1, "model" => name.to_string());

    Ok(Some(Arc::new(model)))
}

/// Successful prediction body
#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub predictions: Predictions,
}

/// Error body with the status it is returned under
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        match err {
            e if e.is_client_error() => {
                ApiError::new(StatusCode::BAD_REQUEST, "Failed to read Parquet file.")
            }
            PredictionError::ModelUnavailable(model) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Model unavailable: {}", model),
            ),
            _ => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Prediction failed."),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/predict-attack", post(predict_attack))
        .route("/predict-attack-proba", post(predict_attack_proba))
        .route("/predict-attack-cat", post(predict_attack_cat))
        .route("/predict-attack-cat-proba", post(predict_attack_cat_proba))
        .route("/predict-all", post(predict_all))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> String {
    format!("{} v{}\n", BANNER, env!("CARGO_PKG_VERSION"))
}

/// Health check endpoint
#[instrument(skip(state))]
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "started_at": state.started_at,
        "version": env!("CARGO_PKG_VERSION"),
        "models": {
            "detection": state.service.has_detection(),
            "classification": state.service.has_classification(),
        }
    }))
}

/// Attack / normal label per row
#[instrument(skip_all)]
async fn predict_attack(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    run_prediction(state, Mode::Detection, multipart).await
}

/// Attack probability per row
#[instrument(skip_all)]
async fn predict_attack_proba(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    run_prediction(state, Mode::DetectionProba, multipart).await
}

/// Attack category per row
#[instrument(skip_all)]
async fn predict_attack_cat(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    run_prediction(state, Mode::Classification, multipart).await
}

/// Probability of every category, keyed by category
#[instrument(skip_all)]
async fn predict_attack_cat_proba(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    run_prediction(state, Mode::ClassificationProba, multipart).await
}

/// Detection and classification combined per row
#[instrument(skip_all)]
async fn predict_all(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    run_prediction(state, Mode::Combined, multipart).await
}

async fn run_prediction(
    state: AppState,
    mode: Mode,
    mut multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    counter!(REQUESTS_TOTAL, 1, "mode" => mode.as_str());

    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            counter!(ERRORS_TOTAL, 1, "mode" => mode.as_str());
            warn!(%request_id, mode = mode.as_str(), detail = %e.detail, "Rejected upload");
            return Err(e);
        }
    };
    debug!(%request_id, bytes = upload.len(), "Upload received");

    // Decoding and scoring are CPU bound; keep them off the async workers
    let service = Arc::clone(&state.service);
    let result = tokio::task::spawn_blocking(move || -> smartshield_core::Result<_> {
        let batch = decode_parquet(upload)?;
        let rows = batch.num_rows();
        service.predict(mode, &batch).map(|predictions| (rows, predictions))
    })
    .await;

    match result {
        Ok(Ok((rows, predictions))) => {
            counter!(ROWS_TOTAL, rows as u64, "mode" => mode.as_str());
            info!(%request_id, mode = mode.as_str(), rows, "Prediction completed");
            Ok(Json(PredictionResponse { predictions }))
        }
        Ok(Err(e)) => {
            counter!(ERRORS_TOTAL, 1, "mode" => mode.as_str());
            if e.is_client_error() {
                warn!(%request_id, mode = mode.as_str(), error = %e, "Unreadable batch");
            } else {
                error!(%request_id, mode = mode.as_str(), error = %e, "Prediction failed");
            }
            Err(e.into())
        }
        Err(e) => {
            counter!(ERRORS_TOTAL, 1, "mode" => mode.as_str());
            error!(%request_id, mode = mode.as_str(), error = %e, "Prediction task panicked");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Prediction failed.",
            ))
        }
    }
}

/// Bytes of the `file` field; other fields are skipped
async fn read_upload(multipart: &mut Multipart) -> Result<axum::body::Bytes, ApiError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;

        let Some(field) = field else {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("Missing multipart field '{}'.", UPLOAD_FIELD),
            ));
        };

        if field.name() == Some(UPLOAD_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| ApiError::new(e.status(), e.body_text()));
        }
    }
}
