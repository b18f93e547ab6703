//! Google Cloud Text-to-Speech synthesizer (Chirp 3 HD voices).

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{SpeechSynthesizer, SynthesisRequest, SynthesisResponse};
use crate::notification::context::DeliveryContext;
use crate::notification::retry::StatusClass;
use crate::{Error, Result};

const VOICE_PREFIX: &str = "en-US-Chirp3-HD-";

/// Synthesis provider configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct GoogleTtsConfig {
    /// OAuth2 access token, without the "Bearer" prefix.
    pub access_token: String,
    /// Project billed for the request (`x-goog-user-project`).
    pub project_id: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://texttospeech.googleapis.com/v1/text:synthesize".to_string()
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_timeout() -> u64 {
    20
}

impl GoogleTtsConfig {
    pub fn new(access_token: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            project_id: project_id.into(),
            endpoint: default_endpoint(),
            language_code: default_language_code(),
            timeout_secs: default_timeout(),
        }
    }
}

impl fmt::Debug for GoogleTtsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleTtsConfig")
            .field("access_token", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("endpoint", &self.endpoint)
            .field("language_code", &self.language_code)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Expand a short voice name ("Kore") into a full Chirp 3 HD voice name.
pub(crate) fn full_voice_name(voice: &str) -> String {
    let voice = voice.trim();
    if voice.starts_with("en-US-") {
        voice.to_string()
    } else {
        format!("{}{}", VOICE_PREFIX, voice)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponseBody {
    #[serde(default)]
    audio_content: String,
}

/// Synthesizer backed by the `text:synthesize` REST endpoint.
pub struct GoogleSynthesizer {
    config: GoogleTtsConfig,
    client: Client,
}

impl GoogleSynthesizer {
    pub fn new(config: GoogleTtsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn build_payload(&self, request: &SynthesisRequest) -> serde_json::Value {
        json!({
            "input": { "text": request.text },
            "voice": {
                "languageCode": self.config.language_code,
                "name": full_voice_name(&request.voice),
            },
            "audioConfig": {
                "audioEncoding": "MP3",
                "speakingRate": request.speaking_rate,
            },
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSynthesizer {
    async fn synthesize(
        &self,
        ctx: &DeliveryContext,
        request: &SynthesisRequest,
    ) -> Result<SynthesisResponse> {
        if request.text.trim().is_empty() {
            return Err(Error::invalid_request("empty text for synthesis"));
        }
        ctx.check()?;

        debug!(
            voice = %full_voice_name(&request.voice),
            rate = request.speaking_rate,
            prompt = %request.prompt,
            "Requesting speech synthesis"
        );

        let pending = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.access_token)
            .header("x-goog-user-project", &self.config.project_id)
            .json(&self.build_payload(request))
            .send();

        // Abandoned, not aborted, when the context ends mid-call.
        let audio = ctx.run_detached(read_audio(pending)).await?;

        debug!(bytes = audio.len(), "Speech synthesized");
        Ok(SynthesisResponse { audio })
    }
}

/// Wait for the synthesis response and decode its audio.
async fn read_audio(
    pending: impl Future<Output = reqwest::Result<reqwest::Response>>,
) -> Result<Vec<u8>> {
    let response = pending
        .await
        .map_err(|e| Error::transient(format!("synthesis request failed: {}", e)))?;

    let status = response.status().as_u16();
    if status != 200 {
        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "Speech synthesis failed");
        return Err(match StatusClass::of(status) {
            StatusClass::Retryable => {
                Error::transient(format!("synthesis status={} body={}", status, body))
            }
            _ => Error::Permanent { status, body },
        });
    }

    let body: SynthesizeResponseBody = response
        .json()
        .await
        .map_err(|e| Error::Other(format!("decode synthesis response: {}", e)))?;
    if body.audio_content.is_empty() {
        return Err(Error::Other("empty audioContent in synthesis response".to_string()));
    }

    BASE64
        .decode(body.audio_content.as_bytes())
        .map_err(|e| Error::Other(format!("decode base64 audioContent: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            prompt: "Speak clearly.".to_string(),
            speaking_rate: 0.9,
            voice: "Kore".to_string(),
            emotion: None,
        }
    }

    fn synthesizer(endpoint: String) -> GoogleSynthesizer {
        GoogleSynthesizer::new(GoogleTtsConfig {
            endpoint,
            ..GoogleTtsConfig::new("token-1", "project-1")
        })
        .unwrap()
    }

    fn ctx() -> DeliveryContext {
        DeliveryContext::with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_full_voice_name() {
        assert_eq!(full_voice_name("Charon"), "en-US-Chirp3-HD-Charon");
        assert_eq!(full_voice_name(" Kore "), "en-US-Chirp3-HD-Kore");
        assert_eq!(full_voice_name("en-US-Standard-A"), "en-US-Standard-A");
    }

    #[test]
    fn test_build_payload() {
        let synth = synthesizer("http://localhost".to_string());
        let payload = synth.build_payload(&request("hello"));
        assert_eq!(payload["input"]["text"], "hello");
        assert_eq!(payload["voice"]["languageCode"], "en-US");
        assert_eq!(payload["voice"]["name"], "en-US-Chirp3-HD-Kore");
        assert_eq!(payload["audioConfig"]["audioEncoding"], "MP3");
    }

    #[tokio::test]
    async fn test_synthesize_decodes_audio() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/v1/text:synthesize"))
            .and(matchers::header("authorization", "Bearer token-1"))
            .and(matchers::header("x-goog-user-project", "project-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "audioContent": BASE64.encode(b"ID3mp3") })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let synth = synthesizer(format!("{}/v1/text:synthesize", server.uri()));
        let response = synth.synthesize(&ctx(), &request("hello")).await.unwrap();
        assert_eq!(response.audio, b"ID3mp3");
    }

    #[tokio::test]
    async fn test_synthesize_rejects_empty_text() {
        let synth = synthesizer("http://127.0.0.1:9".to_string());
        let err = synth.synthesize(&ctx(), &request(" ")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_synthesize_error_status() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let synth = synthesizer(server.uri());
        let err = synth.synthesize(&ctx(), &request("hello")).await.unwrap_err();
        assert!(matches!(err, Error::Permanent { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_synthesize_missing_audio() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let synth = synthesizer(server.uri());
        let err = synth.synthesize(&ctx(), &request("hello")).await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }

    #[tokio::test]
    async fn test_slow_synthesis_is_abandoned_at_deadline() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "audioContent": BASE64.encode(b"ID3") }))
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let synth = synthesizer(server.uri());
        let ctx = DeliveryContext::with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        let err = synth.synthesize(&ctx, &request("hello")).await.unwrap_err();

        assert!(matches!(err, Error::Timeout));
        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
