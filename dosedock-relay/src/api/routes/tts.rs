//! Direct speech synthesis route.

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::parse_json;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::{ChannelOptions, Emotion};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeakRequest {
    #[serde(default)]
    text: String,
    prompt: Option<String>,
    speaking_rate: Option<f32>,
    voice: Option<String>,
    emotion: Option<Emotion>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeakResponse {
    file: String,
    audio_base64: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/tts/speak", post(speak))
}

/// Synthesize and store audio, returning it inline.
async fn speak(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<SpeakResponse>> {
    let Some(speech) = state.speech.clone() else {
        return Err(ApiError::service_unavailable("tts not configured"));
    };

    let request: SpeakRequest = parse_json(&body)?;
    let options = ChannelOptions {
        voice: request.voice,
        emotion: request.emotion,
        speaking_rate: request.speaking_rate,
        style_prompt: request.prompt,
    };

    let ctx = state.speak_context();
    let call_ctx = ctx.clone();
    let text = request.text;
    let spoken = ctx
        .run_detached(async move { speech.synthesize(&call_ctx, &text, &options).await })
        .await
        .map_err(|e| {
            warn!(error = %e, kind = %e.kind(), "Speech synthesis failed");
            ApiError::bad_gateway("tts error")
        })?;

    Ok(Json(SpeakResponse {
        file: spoken.path.display().to_string(),
        audio_base64: STANDARD.encode(&spoken.audio),
    }))
}
