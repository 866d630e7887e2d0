//! Playback of assistant audio
//!
//! The [`PlaybackQueue`] chains inbound segments back to back on the output
//! device clock. Devices implement [`OutputDevice`]; [`WavOutput`] records to
//! disk and the cpal speaker lives in `audio::device` behind the
//! `device-audio` feature.

mod queue;
mod wav;

pub use queue::{InboundAudioSegment, OutputDevice, PlaybackQueue, ScheduledSegment};
pub use wav::WavOutput;
