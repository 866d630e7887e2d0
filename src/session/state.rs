use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one conversation attempt
///
/// `Idle → Connecting → Active → Closing → Closed`, with `Failed` reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Flags orthogonal to `SessionState::Active`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// The service reports the user is speaking
    pub listening: bool,
    /// Assistant audio is being produced or played
    pub speaking: bool,
    /// Assistant audio is discarded locally
    pub muted: bool,
}

/// Notifications for whoever started the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    SpeechStarted,
    SpeechStopped,
    /// User talked over the assistant; queued assistant audio was dropped
    BargeIn { cancelled_segments: usize },
    AssistantAudioDone,
    /// `error` frame from the service; the session stays up
    RemoteError(String),
    /// Inbound frame that was logged and skipped
    ProtocolError(String),
    /// Output device failed; assistant audio is now dropped
    PlaybackUnavailable(String),
    /// Capture stopped producing frames
    CaptureEnded,
    /// Fatal failure; the session is now `Failed`
    Failed(String),
}

/// Requests from a `SessionHandle` to the session loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    SendText(String),
    Mute,
    Unmute,
    End,
}
