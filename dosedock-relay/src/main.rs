use std::path::PathBuf;
use std::sync::Arc;

use dosedock_relay::api::{ApiServer, AppState};
use dosedock_relay::config::RelayConfig;
use dosedock_relay::logging;
use dosedock_relay::notification::{SmsChannel, SpeechChannel, SpeechConfig};
use dosedock_relay::tts::{FsAudioStore, GoogleSynthesizer, SystemPlayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // LOG_DIR is read ahead of the full config so config loading is logged.
    let log_dir = std::env::var_os("LOG_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from);
    let _log_guard = logging::init_logging(log_dir.as_deref())?;

    let config = RelayConfig::from_env()?;

    let sms = Arc::new(SmsChannel::new(config.sms.clone())?);

    let speech = match config.speech.clone() {
        Some(tts_config) => {
            let synthesizer = Arc::new(GoogleSynthesizer::new(tts_config)?);
            let store = Arc::new(FsAudioStore::new(config.audio_dir.clone()));
            let mut channel = SpeechChannel::new(SpeechConfig::default(), synthesizer, store);
            if config.autoplay {
                channel = channel.with_player(Arc::new(SystemPlayer));
            }
            tracing::info!(
                audio_dir = %config.audio_dir.display(),
                autoplay = config.autoplay,
                "Speech channel enabled"
            );
            Some(Arc::new(channel))
        }
        None => {
            tracing::warn!("Speech synthesis not configured; events are delivered by SMS only");
            None
        }
    };

    let state = AppState::new(sms, speech)
        .with_timeouts(config.send_timeout, config.speak_timeout);
    let server = ApiServer::new(config.server.clone(), state);

    let shutdown = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
        }
        shutdown.cancel();
    });

    tracing::info!(
        sms_rate = config.sms.max_per_second,
        "dosedock-relay starting"
    );
    server.run().await?;

    tracing::info!("dosedock-relay stopped");
    Ok(())
}
