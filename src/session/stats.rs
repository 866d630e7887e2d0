use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// State when the stats were taken
    pub state: SessionState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Capture frames sent to the service
    pub frames_sent: u64,

    /// Capture frames replaced before they could be sent
    pub frames_dropped: u64,

    /// Assistant audio segments handed to the playback queue
    pub segments_enqueued: u64,

    /// Assistant audio segments decoded and discarded (muted or degraded output)
    pub segments_discarded: u64,

    /// Inbound frames skipped as protocol errors
    pub protocol_errors: u64,

    /// Number of transcript messages
    pub messages_count: usize,
}
