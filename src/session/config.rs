use std::time::Duration;

use crate::audio::{pcm, CaptureConfig};
use crate::realtime::SessionSettings;

/// Configuration for a voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "voice-3f2a...")
    pub session_id: String,

    /// Upper bound on establishing the connection
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Sample rate for audio in both directions (the service expects 24kHz)
    pub sample_rate: u32,

    /// Duration of each outbound audio frame
    pub frame_duration_ms: u64,

    /// Sent in the initial `session.update` frame
    pub settings: SessionSettings,
}

impl SessionConfig {
    /// Same settings under a new session id
    pub fn with_fresh_id(&self) -> Self {
        Self {
            session_id: new_session_id(),
            ..self.clone()
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            frame_duration_ms: self.frame_duration_ms,
        }
    }
}

fn new_session_id() -> String {
    format!("voice-{}", uuid::Uuid::new_v4())
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: new_session_id(),
            connect_timeout: Duration::from_secs(10),
            sample_rate: pcm::SAMPLE_RATE,
            frame_duration_ms: 100,
            settings: SessionSettings::default(),
        }
    }
}
