//! Local playback through the platform's default media opener.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::AudioPlayer;
use crate::Result;

/// Hands stored audio to `xdg-open`, `open` or `cmd /c start`.
#[derive(Debug, Clone, Default)]
pub struct SystemPlayer;

impl SystemPlayer {
    fn command(path: &Path) -> Command {
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/c", "start", ""]);
            c
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        command
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl AudioPlayer for SystemPlayer {
    fn play(&self, path: &Path) -> Result<()> {
        // The child is not awaited; tokio reaps it once it exits.
        let child = Self::command(path).spawn()?;
        debug!(path = %path.display(), pid = ?child.id(), "Started playback");
        Ok(())
    }
}
