//! Health check route.

use axum::{Router, routing::get};

use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(health_check))
}

/// Liveness check; the relay has no dependencies worth checking per request.
async fn health_check() -> &'static str {
    "ok"
}
