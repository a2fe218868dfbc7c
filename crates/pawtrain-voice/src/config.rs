//! Runtime configuration for the voice shell.
//!
//! Precedence: env `PAWTRAIN_CONFIG` path > `config/voice.toml` > defaults, then
//! `PAWTRAIN_*` environment overrides with `__` between nested keys
//! (e.g. `PAWTRAIN_REMOTE__URL`, `PAWTRAIN_TIMING__TICK_MS`).

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/voice";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// BCP-47 tag for phrasing and voice selection.
    pub locale: String,
    /// Initial volume, `0.0..=1.0`.
    pub volume: f32,
    pub remote: RemoteVoiceConfig,
    pub device: DeviceVoiceConfig,
    pub timing: SessionTiming,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            volume: 1.0,
            remote: RemoteVoiceConfig::default(),
            device: DeviceVoiceConfig::default(),
            timing: SessionTiming::default(),
        }
    }
}

/// Remote synthesis endpoint. Without a URL the session runs on the device voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteVoiceConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub voice: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteVoiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            voice: None,
            timeout_secs: 15,
        }
    }
}

impl RemoteVoiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceVoiceConfig {
    /// Synthesizer executable.
    pub program: String,
    /// Voice names tried first, in order (case-insensitive substring match).
    pub preferred_voices: Vec<String>,
    /// Speaking rate multiplier; 1.0 is the synthesizer's normal rate.
    pub rate: f32,
    pub pitch: f32,
    /// Silence between sentences.
    pub sentence_pause_ms: u64,
}

impl Default for DeviceVoiceConfig {
    fn default() -> Self {
        Self {
            program: "espeak-ng".to_string(),
            preferred_voices: vec![
                "Samantha".to_string(),
                "Daniel".to_string(),
                "Google".to_string(),
            ],
            rate: 0.95,
            pitch: 1.0,
            sentence_pause_ms: 500,
        }
    }
}

impl DeviceVoiceConfig {
    pub fn sentence_pause(&self) -> Duration {
        Duration::from_millis(self.sentence_pause_ms)
    }
}

/// Session pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTiming {
    /// One countdown decrement.
    pub tick_ms: u64,
    /// Gap after the release phrase before the next step.
    pub release_pause_ms: u64,
    /// Chance of an encouragement when a later step begins.
    pub encouragement_chance: f64,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            release_pause_ms: 800,
            encouragement_chance: 0.3,
        }
    }
}

impl SessionTiming {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn release_pause(&self) -> Duration {
        Duration::from_millis(self.release_pause_ms)
    }
}

impl VoiceConfig {
    /// Load from `PAWTRAIN_CONFIG` (or `config/voice.toml`) and the environment.
    pub fn load() -> VoiceResult<Self> {
        let path = std::env::var("PAWTRAIN_CONFIG").ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (must exist) or the default location (optional).
    pub fn load_from(path: Option<&Path>) -> VoiceResult<Self> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_PATH).required(false)),
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("PAWTRAIN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: VoiceConfig = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VoiceResult<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(VoiceError::Config(format!(
                "volume must be within 0.0..=1.0, got {}",
                self.volume
            )));
        }
        if self.timing.tick_ms == 0 {
            return Err(VoiceError::Config("timing.tick_ms must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.timing.encouragement_chance) {
            return Err(VoiceError::Config(format!(
                "timing.encouragement_chance must be a probability, got {}",
                self.timing.encouragement_chance
            )));
        }
        if self.device.rate <= 0.0 || !self.device.rate.is_finite() {
            return Err(VoiceError::Config("device.rate must be positive".to_string()));
        }
        if self.locale.trim().is_empty() {
            return Err(VoiceError::Config("locale must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = VoiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.tick(), Duration::from_secs(1));
        assert_eq!(config.timing.release_pause(), Duration::from_millis(800));
        assert_eq!(config.device.sentence_pause(), Duration::from_millis(500));
        assert!(config.remote.url.is_none());
    }

    #[test]
    fn load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.toml");
        std::fs::write(
            &path,
            r#"
locale = "de-DE"
volume = 0.6

[remote]
url = "http://localhost:9000/speak"
voice = "warm"

[timing]
tick_ms = 250
"#,
        )
        .unwrap();

        let config = VoiceConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.locale, "de-DE");
        assert_eq!(config.volume, 0.6);
        assert_eq!(config.remote.url.as_deref(), Some("http://localhost:9000/speak"));
        assert_eq!(config.remote.voice.as_deref(), Some("warm"));
        assert_eq!(config.remote.timeout_secs, 15);
        assert_eq!(config.timing.tick_ms, 250);
        assert_eq!(config.timing.release_pause_ms, 800);
        assert_eq!(config.device.program, "espeak-ng");
    }

    #[test]
    fn load_rejects_out_of_range_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.toml");
        std::fs::write(&path, "volume = 1.5\n").unwrap();
        assert!(matches!(
            VoiceConfig::load_from(Some(&path)),
            Err(VoiceError::Config(_))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(VoiceConfig::load_from(Some(&path)).is_err());
    }

    #[test]
    fn environment_overrides_nested_keys() {
        std::env::set_var("PAWTRAIN_DEVICE__SENTENCE_PAUSE_MS", "650");
        let config = VoiceConfig::load_from(None);
        std::env::remove_var("PAWTRAIN_DEVICE__SENTENCE_PAUSE_MS");
        assert_eq!(config.unwrap().device.sentence_pause_ms, 650);
    }

    #[test]
    fn validate_checks_timing() {
        let mut config = VoiceConfig::default();
        config.timing.encouragement_chance = 1.5;
        assert!(config.validate().is_err());
        config.timing.encouragement_chance = 0.0;
        config.timing.tick_ms = 0;
        assert!(config.validate().is_err());
    }
}
