//! Reminder event route: render once, deliver over every channel.

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::parse_json;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::{ChannelOptions, Emotion, Event, EventFields};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEventRequest {
    event: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    payload: EventFields,
    voice: Option<String>,
    emotion: Option<Emotion>,
    speaking_rate: Option<f32>,
    prompt: Option<String>,
}

impl SendEventRequest {
    fn into_event(self) -> crate::Result<Event> {
        let options = ChannelOptions {
            voice: self.voice,
            emotion: self.emotion,
            speaking_rate: self.speaking_rate,
            style_prompt: self.prompt,
        };
        Ok(Event::parse(&self.event, self.to, self.payload)?.with_options(options))
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/send-event", post(send_event))
}

async fn send_event(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let request: SendEventRequest = parse_json(&body)?;
    let event = request.into_event().map_err(|e| {
        warn!(error = %e, "Rejected event");
        ApiError::bad_request("bad event or payload")
    })?;

    debug!(
        event = %event.kind(),
        voice = ?event.options().voice,
        emotion = ?event.options().emotion,
        rate = ?event.options().speaking_rate,
        "Dispatching event"
    );

    let text = event.render();
    let ctx = state.send_context();

    state
        .dispatcher
        .dispatch(&ctx, &event, &text)
        .await
        .and_then(|result| result.into_result())
        .map_err(|e| {
            warn!(error = %e, kind = %e.kind(), channel = ?e.channel(), "Event dispatch failed");
            ApiError::bad_gateway("failed to send or speak")
        })?;

    Ok(Json(json!({ "ok": true })))
}
