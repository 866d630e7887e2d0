//! Voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Connection setup and teardown against the realtime service
//! - Forwarding capture frames as `input_audio_buffer.append`
//! - Scheduling assistant audio and barge-in
//! - Transcript aggregation and session statistics

mod config;
mod session;
mod state;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use session::{SessionHandle, VoiceSession};
pub use state::{Activity, SessionCommand, SessionEvent, SessionState};
pub use stats::SessionStats;
pub use transcript::{Message, Role, TranscriptAggregator};
