//! hostwatch-api: HTTP surface for load balancers and operators.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | 200 `{status:"ok",checked_at}` or 503 `{status:"unhealthy",checked_at,issues}` |
//! | * | anything else | static HTML page, 404 |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use hostwatch_health::VerdictReader;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub reader: VerdictReader,
}

/// Build the complete router.
pub fn build_router(reader: VerdictReader) -> Router {
    Router::new()
        .route("/health", get(handlers::health_status))
        .fallback(handlers::fallback_page)
        .with_state(ApiState { reader })
}
