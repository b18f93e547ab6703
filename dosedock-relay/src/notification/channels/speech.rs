//! Speech channel: synthesize the message, store the audio, play it locally.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ChannelKind, DeliveryChannel};
use crate::Result;
use crate::notification::context::DeliveryContext;
use crate::notification::events::{ChannelOptions, Emotion};
use crate::tts::{AudioPlayer, AudioStore, SpeechSynthesizer, SynthesisRequest};

/// Resolved synthesis parameters for one message.
pub type SpeechParams = SynthesisRequest;

/// Speech presentation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Voice used when the event does not pick one.
    #[serde(default = "default_voice")]
    pub default_voice: String,
    /// Style prompt used when the event does not provide one.
    #[serde(default = "default_prompt")]
    pub default_prompt: String,
    /// Clause appended to the style prompt for each emotion.
    #[serde(default = "default_emotion_clauses")]
    pub emotion_clauses: Vec<(Emotion, String)>,
}

fn default_voice() -> String {
    "Charon".to_string()
}

fn default_prompt() -> String {
    "Speak clearly and calmly for an older adult.".to_string()
}

fn default_emotion_clauses() -> Vec<(Emotion, String)> {
    vec![
        (Emotion::Calm, "Speak in a calm, reassuring tone.".to_string()),
        (Emotion::Friendly, "Speak in a warm, friendly tone.".to_string()),
        (
            Emotion::Urgent,
            "Speak in a clear, urgent tone without sounding scary.".to_string(),
        ),
    ]
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            default_voice: default_voice(),
            default_prompt: default_prompt(),
            emotion_clauses: default_emotion_clauses(),
        }
    }
}

impl SpeechConfig {
    pub fn emotion_clause(&self, emotion: Emotion) -> Option<&str> {
        self.emotion_clauses
            .iter()
            .find(|(e, _)| *e == emotion)
            .map(|(_, clause)| clause.as_str())
    }

    /// Fill in defaults for everything the event left unset.
    pub fn resolve(&self, text: &str, options: &ChannelOptions) -> SpeechParams {
        let voice = options
            .voice
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.default_voice)
            .to_string();

        let speaking_rate = options
            .speaking_rate
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(1.0);

        let base_prompt = options
            .style_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_prompt);

        let prompt = match options.emotion.and_then(|e| self.emotion_clause(e)) {
            Some(clause) => format!("{} {}", base_prompt, clause),
            None => base_prompt.to_string(),
        };

        SynthesisRequest {
            text: text.to_string(),
            prompt,
            speaking_rate,
            voice,
            emotion: options.emotion,
        }
    }
}

/// Stored result of one synthesis.
#[derive(Debug, Clone)]
pub struct SpokenAudio {
    pub audio: Vec<u8>,
    pub path: PathBuf,
}

/// Speech delivery channel.
pub struct SpeechChannel {
    config: SpeechConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    store: Arc<dyn AudioStore>,
    player: Option<Arc<dyn AudioPlayer>>,
}

impl SpeechChannel {
    pub fn new(
        config: SpeechConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        store: Arc<dyn AudioStore>,
    ) -> Self {
        Self {
            config,
            synthesizer,
            store,
            player: None,
        }
    }

    /// Enable local playback after each delivery.
    pub fn with_player(mut self, player: Arc<dyn AudioPlayer>) -> Self {
        self.player = Some(player);
        self
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Synthesize `text` and store the audio.
    pub async fn synthesize(
        &self,
        ctx: &DeliveryContext,
        text: &str,
        options: &ChannelOptions,
    ) -> Result<SpokenAudio> {
        let params = self.config.resolve(text, options);
        debug!(voice = %params.voice, rate = params.speaking_rate, "Synthesizing speech");

        let response = self.synthesizer.synthesize(ctx, &params).await?;
        let path = self.store.store(&response.audio).await?;

        info!(path = %path.display(), bytes = response.audio.len(), "Speech audio stored");
        Ok(SpokenAudio {
            audio: response.audio,
            path,
        })
    }
}

#[async_trait]
impl DeliveryChannel for SpeechChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Speech
    }

    async fn deliver(
        &self,
        ctx: &DeliveryContext,
        _recipient: &str,
        body: &str,
        options: &ChannelOptions,
    ) -> Result<()> {
        let spoken = self.synthesize(ctx, body, options).await?;

        // The stored audio is the deliverable; playback is best-effort.
        if let Some(player) = &self.player
            && let Err(e) = player.play(&spoken.path)
        {
            warn!(path = %spoken.path.display(), error = %e, "Auto play failed");
        }

        Ok(())
    }
}
