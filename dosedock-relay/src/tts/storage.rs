//! Filesystem storage for synthesized audio.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::AudioStore;
use crate::Result;

/// Writes each clip to `<dir>/tts-<unix millis>.mp3`.
#[derive(Debug, Clone)]
pub struct FsAudioStore {
    dir: PathBuf,
}

impl FsAudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AudioStore for FsAudioStore {
    async fn store(&self, audio: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stamp = Utc::now().timestamp_millis();
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("tts-{}.mp3", stamp)
            } else {
                format!("tts-{}-{}.mp3", stamp, suffix)
            };
            let path = self.dir.join(name);

            // Two clips stored in the same millisecond must not overwrite each other.
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(audio).await?;
                    file.flush().await?;
                    debug!(path = %path.display(), bytes = audio.len(), "Stored audio");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
