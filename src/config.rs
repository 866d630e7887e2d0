use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::pcm;
use crate::realtime::{SessionSettings, TranscriptionSettings};
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default)]
    pub instructions: Option<String>,
    /// Empty disables input transcription
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u64,
    /// Replay this WAV file instead of the microphone
    #[serde(default)]
    pub input_wav: Option<PathBuf>,
    /// Write assistant audio here instead of the speaker
    #[serde(default)]
    pub output_wav: Option<PathBuf>,
}

fn default_url() -> String {
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_frame_duration_ms() -> u64 {
    100
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key_env: default_api_key_env(),
            voice: default_voice(),
            instructions: None,
            transcription_model: default_transcription_model(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: default_frame_duration_ms(),
            input_wav: None,
            output_wav: None,
        }
    }
}

impl Config {
    /// Load from `path` (any extension the config crate knows, optional)
    /// with `LOQA_VOICE__SECTION__KEY` environment overrides on top
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("LOQA_VOICE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {path}"))?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.audio.frame_duration_ms == 0 {
            anyhow::bail!("audio.frame_duration_ms must be greater than zero");
        }
        if self.realtime.connect_timeout_secs == 0 {
            anyhow::bail!("realtime.connect_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// API key from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.realtime.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    pub fn to_session_config(&self) -> SessionConfig {
        let transcription = if self.realtime.transcription_model.is_empty() {
            None
        } else {
            Some(TranscriptionSettings {
                model: self.realtime.transcription_model.clone(),
            })
        };

        SessionConfig {
            connect_timeout: Duration::from_secs(self.realtime.connect_timeout_secs),
            sample_rate: pcm::SAMPLE_RATE,
            frame_duration_ms: self.audio.frame_duration_ms,
            settings: SessionSettings {
                voice: self.realtime.voice.clone(),
                instructions: self.realtime.instructions.clone(),
                input_audio_transcription: transcription,
                ..SessionSettings::default()
            },
            ..SessionConfig::default()
        }
    }
}
