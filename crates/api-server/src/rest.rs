//! Shared handler state, error mapping and operational endpoints.

use appswap_core::ScoringError;
use appswap_scoring::ScoringFacade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use utoipa::ToSchema;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<ScoringFacade>,
    pub node_id: String,
    pub start_time: Instant,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an engine error to a status code and a client-safe body.
pub fn api_error(err: &ScoringError, operation: &str) -> ApiError {
    let (status, code, message) = match err {
        ScoringError::NotTrained(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "model_not_trained",
            err.to_string(),
        ),
        ScoringError::ItemNotFound(_) => (StatusCode::NOT_FOUND, "item_not_found", err.to_string()),
        ScoringError::UserNotFound(_) => (StatusCode::NOT_FOUND, "user_not_found", err.to_string()),
        ScoringError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query", err.to_string()),
        ScoringError::UnknownCategory(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "unknown_category",
            err.to_string(),
        ),
        ScoringError::InsufficientData { .. } | ScoringError::NoItems => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient_data",
            err.to_string(),
        ),
        ScoringError::TrainingTimedOut(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            "training_timed_out",
            err.to_string(),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal processing error".to_string(),
        ),
    };

    if status.is_server_error() {
        error!(error = %err, operation, "Request failed");
        metrics::counter!("api.errors", "operation" => operation.to_string()).increment(1);
    } else {
        warn!(error = %err, operation, "Request rejected");
    }

    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message,
        }),
    )
}

/// GET /health: Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: Readiness probe.
/// Returns 200 only once at least one model is in service.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "At least one model is trained"),
        (status = 503, description = "No model trained yet"),
    )
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.facade.status().await.any_trained() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live: Liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses(
        (status = 200, description = "Process is alive"),
    )
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
