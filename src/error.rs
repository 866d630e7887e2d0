use std::fmt;
use std::time::Duration;

use crate::session::SessionState;

/// Which audio device an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Microphone input
    Input,
    /// Speaker output
    Output,
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Input => write!(f, "input"),
            DeviceRole::Output => write!(f, "output"),
        }
    }
}

/// Why a device could not be acquired
///
/// Permission denial is kept apart from a missing device so callers can
/// tell the user to grant access instead of plugging in hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFailure {
    /// The OS refused access (e.g. microphone privacy settings)
    PermissionDenied,
    /// No device of this kind exists
    NoDevice,
    /// The device exists but cannot run 24kHz PCM
    Unsupported,
    /// Any other backend failure
    Backend,
}

impl fmt::Display for DeviceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFailure::PermissionDenied => write!(f, "permission denied"),
            DeviceFailure::NoDevice => write!(f, "no device"),
            DeviceFailure::Unsupported => write!(f, "unsupported format"),
            DeviceFailure::Backend => write!(f, "backend error"),
        }
    }
}

/// Errors raised by the voice pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Microphone or speaker could not be acquired.
    #[error("{role} device unavailable ({failure}): {detail}")]
    DeviceUnavailable {
        role: DeviceRole,
        failure: DeviceFailure,
        detail: String,
    },

    /// Connection refused, reset, or a frame that breaks the framing.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport did not open within the configured bound.
    #[error("connection not established within {0:?}")]
    ConnectTimeout(Duration),

    /// Well-formed JSON with an unknown type or a malformed payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The output device stopped accepting audio.
    #[error("playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// An operation that is not legal in the current session state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl VoiceError {
    pub fn device(role: DeviceRole, failure: DeviceFailure, detail: impl Into<String>) -> Self {
        VoiceError::DeviceUnavailable {
            role,
            failure,
            detail: detail.into(),
        }
    }
}

/// Convenience alias for voice pipeline results.
pub type VoiceResult<T> = Result<T, VoiceError>;
