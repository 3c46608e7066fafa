//! Health endpoint.
//!
//! Reports which counter store is active so operators can see when the
//! service has fallen back to local counting.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    /// `distributed` or `local`.
    pub store_mode: &'static str,
    pub distributed_configured: bool,
    /// Route-specific policies loaded, excluding the default.
    pub policies: usize,
}

/// Body for unmatched routes.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        store_mode: state.selector.mode().as_str(),
        distributed_configured: state.selector.has_distributed(),
        policies: state.limiter.policies().len(),
    })
}

/// Fallback for every route the service does not serve itself.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: "Not Found" }))
}
