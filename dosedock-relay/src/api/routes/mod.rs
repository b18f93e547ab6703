//! API route modules.

pub mod events;
pub mod health;
pub mod sms;
pub mod tts;
pub mod twilio;

use axum::Router;
use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;
use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(sms::router())
        .merge(events::router())
        .merge(tts::router())
        .merge(twilio::router())
        .merge(health::router())
        .with_state(state)
}

/// Decode a JSON request body regardless of its declared content type.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        ApiError::bad_request("invalid json")
    })
}
