//! Speech synthesis and audio handling.
//!
//! The speech channel treats each of these as an opaque collaborator:
//! - [`SpeechSynthesizer`] turns text into audio bytes (remote call)
//! - [`AudioStore`] persists the audio
//! - [`AudioPlayer`] starts best-effort local playback

mod google;
mod player;
mod storage;

pub use google::{GoogleSynthesizer, GoogleTtsConfig};
pub use player::SystemPlayer;
pub use storage::FsAudioStore;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::notification::context::DeliveryContext;
use crate::notification::events::Emotion;

/// Fully resolved synthesis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    /// Style instructions for the voice.
    pub prompt: String,
    pub speaking_rate: f32,
    /// Voice short name or full voice name.
    pub voice: String,
    pub emotion: Option<Emotion>,
}

/// Synthesized audio.
#[derive(Debug, Clone)]
pub struct SynthesisResponse {
    /// Encoded audio (MP3).
    pub audio: Vec<u8>,
}

/// Remote text-to-speech operation.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        ctx: &DeliveryContext,
        request: &SynthesisRequest,
    ) -> Result<SynthesisResponse>;
}

/// Persistent storage for synthesized audio.
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Store the audio and return where it was written.
    async fn store(&self, audio: &[u8]) -> Result<PathBuf>;
}

/// Local playback of stored audio.
pub trait AudioPlayer: Send + Sync {
    /// Start playback without waiting for it to finish.
    fn play(&self, path: &Path) -> Result<()>;
}
