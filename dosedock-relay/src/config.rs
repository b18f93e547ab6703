//! Environment-driven relay configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::api::server::ApiServerConfig;
use crate::notification::{RateLimiterConfig, SmsConfig};
use crate::tts::GoogleTtsConfig;
use crate::{Error, Result};

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub server: ApiServerConfig,
    pub sms: SmsConfig,
    /// `None` disables the speech channel.
    pub speech: Option<GoogleTtsConfig>,
    /// Where synthesized audio is stored.
    pub audio_dir: PathBuf,
    /// Start local playback after speech delivery.
    pub autoplay: bool,
    /// Deadline for `/send-sms` and `/send-event`.
    pub send_timeout: Duration,
    /// Deadline for `/tts/speak`.
    pub speak_timeout: Duration,
    /// Optional directory for rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl RelayConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    ///
    /// Supported variables:
    /// - `API_BIND_ADDRESS`, `PORT`
    /// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_MESSAGING_SERVICE_SID` (required)
    /// - `TWILIO_API_BASE`, `SMS_MAX_PER_SECOND`
    /// - `GOOGLE_TTS_ACCESS_TOKEN`, `GOOGLE_CLOUD_PROJECT`, `GOOGLE_TTS_ENDPOINT`
    /// - `TTS_OUTPUT_DIR`, `TTS_AUTOPLAY`
    /// - `SEND_TIMEOUT_SECS`, `SPEAK_TIMEOUT_SECS`
    /// - `LOG_DIR`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut server = ApiServerConfig::default();
        if let Some(bind_address) = var("API_BIND_ADDRESS") {
            server.bind_address = bind_address;
        }
        server.port = parse_or(&var, "PORT", server.port)?;

        let mut sms = SmsConfig::new(
            required(&var, "TWILIO_ACCOUNT_SID")?,
            required(&var, "TWILIO_AUTH_TOKEN")?,
            required(&var, "TWILIO_MESSAGING_SERVICE_SID")?,
        );
        if let Some(api_base) = var("TWILIO_API_BASE") {
            sms.api_base = api_base;
        }
        sms.max_per_second = parse_or(&var, "SMS_MAX_PER_SECOND", sms.max_per_second)?;
        RateLimiterConfig::with_rps(sms.max_per_second)?;

        let speech = match (var("GOOGLE_TTS_ACCESS_TOKEN"), var("GOOGLE_CLOUD_PROJECT")) {
            (Some(token), Some(project)) => {
                let mut config = GoogleTtsConfig::new(token, project);
                if let Some(endpoint) = var("GOOGLE_TTS_ENDPOINT") {
                    config.endpoint = endpoint;
                }
                Some(config)
            }
            (token, project) => {
                info!(
                    has_token = token.is_some(),
                    has_project = project.is_some(),
                    "Speech synthesis credentials incomplete, speech channel disabled"
                );
                None
            }
        };

        let send_timeout_secs = parse_or(&var, "SEND_TIMEOUT_SECS", 10u64)?;
        let speak_timeout_secs = parse_or(&var, "SPEAK_TIMEOUT_SECS", 20u64)?;

        Ok(Self {
            server,
            sms,
            speech,
            audio_dir: var("TTS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tts_output")),
            autoplay: parse_bool_or(&var, "TTS_AUTOPLAY", true)?,
            send_timeout: Duration::from_secs(send_timeout_secs),
            speak_timeout: Duration::from_secs(speak_timeout_secs),
            log_dir: var("LOG_DIR").map(PathBuf::from),
        })
    }
}

fn required(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    var(key).ok_or_else(|| Error::config(format!("{} not set", key)))
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("invalid {}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match var(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::config(format!("invalid {}={:?}: expected a boolean", key, raw))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<RelayConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RelayConfig::from_lookup(|key| env.get(key).cloned())
    }

    const SMS_VARS: &[(&str, &str)] = &[
        ("TWILIO_ACCOUNT_SID", "AC1"),
        ("TWILIO_AUTH_TOKEN", "tok"),
        ("TWILIO_MESSAGING_SERVICE_SID", "MG1"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(SMS_VARS).unwrap();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.sms.account_sid, "AC1");
        assert_eq!(config.sms.max_per_second, 5.0);
        assert!(config.speech.is_none());
        assert_eq!(config.audio_dir, PathBuf::from("tts_output"));
        assert!(config.autoplay);
        assert_eq!(config.send_timeout, Duration::from_secs(10));
        assert_eq!(config.speak_timeout, Duration::from_secs(20));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_missing_sms_credentials() {
        let err = load(&[("TWILIO_ACCOUNT_SID", "AC1")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("TWILIO_AUTH_TOKEN")));

        let err = load(&[
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("TWILIO_MESSAGING_SERVICE_SID", "  "),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_speech_requires_both_credentials() {
        let mut vars = SMS_VARS.to_vec();
        vars.push(("GOOGLE_TTS_ACCESS_TOKEN", "ya29"));
        assert!(load(&vars).unwrap().speech.is_none());

        vars.push(("GOOGLE_CLOUD_PROJECT", "dosedock"));
        let speech = load(&vars).unwrap().speech.unwrap();
        assert_eq!(speech.project_id, "dosedock");
        assert_eq!(
            speech.endpoint,
            "https://texttospeech.googleapis.com/v1/text:synthesize"
        );
    }

    #[test]
    fn test_overrides() {
        let mut vars = SMS_VARS.to_vec();
        vars.extend([
            ("PORT", "9000"),
            ("SMS_MAX_PER_SECOND", "2.5"),
            ("TTS_AUTOPLAY", "off"),
            ("SEND_TIMEOUT_SECS", "3"),
            ("LOG_DIR", "/var/log/dosedock"),
            ("TWILIO_API_BASE", "http://localhost:1234"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.sms.max_per_second, 2.5);
        assert!(!config.autoplay);
        assert_eq!(config.send_timeout, Duration::from_secs(3));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/dosedock")));
        assert_eq!(config.sms.api_base, "http://localhost:1234");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (key, value) in [
            ("PORT", "eighty"),
            ("SMS_MAX_PER_SECOND", "0"),
            ("SMS_MAX_PER_SECOND", "1e-20"),
            ("TTS_AUTOPLAY", "maybe"),
            ("SPEAK_TIMEOUT_SECS", "-1"),
        ] {
            let mut vars = SMS_VARS.to_vec();
            vars.push((key, value));
            assert!(load(&vars).is_err(), "{} should be rejected", key);
        }
    }
}
