//! Direct SMS route.

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::parse_json;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::ChannelOptions;

#[derive(Debug, Deserialize)]
struct SendSmsRequest {
    #[serde(default)]
    to: String,
    #[serde(default)]
    body: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/send-sms", post(send_sms))
}

/// Send one SMS through the resilient client.
async fn send_sms(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let request: SendSmsRequest = parse_json(&body)?;
    let ctx = state.send_context();

    let sms = state.sms.clone();
    let call_ctx = ctx.clone();
    ctx.run_detached(async move {
        sms.deliver(&call_ctx, &request.to, &request.body, &ChannelOptions::default())
            .await
    })
    .await
    .map_err(|e| {
            warn!(error = %e, kind = %e.kind(), "SMS send failed");
            ApiError::bad_gateway("failed to send")
        })?;

    Ok(Json(json!({ "ok": true })))
}
