//! HTTP handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use tracing::error;

use crate::ApiState;

const FALLBACK_PAGE: &str = include_str!("fallback.html");

/// GET /health
///
/// A store failure is reported as a 500, never as healthy.
pub async fn health_status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.reader.read() {
        Ok(resp) => {
            let code = if resp.is_ok() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (code, Json(resp)).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to read health verdict");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "issues": ["Health store unavailable"],
                })),
            )
                .into_response()
        }
    }
}

/// Any unmatched path.
pub async fn fallback_page() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(FALLBACK_PAGE))
}
