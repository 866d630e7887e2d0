use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::audio::pcm;
use crate::error::{VoiceError, VoiceResult};

/// PCM audio decoded from one inbound network frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAudioSegment {
    /// Position in network arrival order
    pub arrival: u64,
    /// Mono PCM16 samples
    pub samples: Vec<i16>,
}

impl InboundAudioSegment {
    pub fn new(arrival: u64, samples: Vec<i16>) -> Self {
        Self { arrival, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Speaker device seen by the playback queue
///
/// Time is measured in samples on the device clock. `schedule` hands over
/// audio to begin at an absolute sample position; `cancel_pending` drops
/// every segment scheduled to start after `after` and keeps the rest.
pub trait OutputDevice: Send {
    fn sample_rate(&self) -> u32;

    /// Current playback position in samples
    fn position(&self) -> u64;

    fn schedule(&mut self, start: u64, samples: Vec<i16>) -> VoiceResult<()>;

    fn cancel_pending(&mut self, after: u64);

    fn name(&self) -> &str;
}

/// Where a segment landed on the device clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledSegment {
    pub arrival: u64,
    /// First sample position (inclusive)
    pub start: u64,
    /// Last sample position (exclusive)
    pub end: u64,
}

impl ScheduledSegment {
    pub fn duration_ms(&self, sample_rate: u32) -> u64 {
        pcm::duration_ms((self.end - self.start) as usize, sample_rate)
    }
}

/// Gapless, strictly ordered playback of inbound audio
///
/// Each segment is chained to start exactly where the previous one ends.
/// When the device clock has already run past the end of the last segment
/// (the queue drained), the next one starts at the current clock instead.
pub struct PlaybackQueue {
    device: Box<dyn OutputDevice>,
    scheduled: VecDeque<ScheduledSegment>,
    cursor: Option<u64>,
    degraded: bool,
}

impl PlaybackQueue {
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        info!(
            "Playback queue on {} ({}Hz)",
            device.name(),
            device.sample_rate()
        );

        Self {
            device,
            scheduled: VecDeque::new(),
            cursor: None,
            degraded: false,
        }
    }

    /// Schedule a segment after everything already queued
    ///
    /// Returns `PlaybackUnavailable` once the device has failed; from then on
    /// every segment is dropped without touching the device.
    pub fn enqueue(&mut self, segment: InboundAudioSegment) -> VoiceResult<ScheduledSegment> {
        if self.degraded {
            return Err(VoiceError::PlaybackUnavailable(format!(
                "{} degraded, dropping segment {}",
                self.device.name(),
                segment.arrival
            )));
        }

        let now = self.device.position();
        self.retire_played(now);

        let start = match self.cursor {
            Some(cursor) if cursor >= now => cursor,
            _ => now,
        };
        let end = start + segment.len() as u64;
        let scheduled = ScheduledSegment {
            arrival: segment.arrival,
            start,
            end,
        };

        if let Err(e) = self.device.schedule(start, segment.samples) {
            warn!("Output device failed, playback degraded to silent drop: {}", e);
            self.degraded = true;
            self.scheduled.clear();
            self.cursor = None;
            return Err(match e {
                VoiceError::PlaybackUnavailable(_) => e,
                other => VoiceError::PlaybackUnavailable(other.to_string()),
            });
        }

        debug!(
            "Scheduled segment {} at {}..{} (now {})",
            scheduled.arrival, start, end, now
        );

        self.cursor = Some(end);
        self.scheduled.push_back(scheduled);
        Ok(scheduled)
    }

    /// Cancel every segment that has not started yet
    ///
    /// Audio the hardware is already sounding is not truncated, so the cursor
    /// moves back to the end of that segment (or resets when nothing is
    /// sounding). Returns how many segments were cancelled.
    pub fn clear(&mut self) -> usize {
        let now = self.device.position();
        self.retire_played(now);

        let cancelled = self.scheduled.iter().filter(|s| s.start > now).count();
        if cancelled > 0 {
            debug!("Clearing {} scheduled segments", cancelled);
        }

        if !self.degraded {
            self.device.cancel_pending(now);
        }
        self.scheduled.retain(|s| s.start <= now);
        self.cursor = self.scheduled.back().map(|s| s.end);
        cancelled
    }

    /// Whether scheduled audio is still ahead of the device clock
    pub fn is_playing(&self) -> bool {
        match self.cursor {
            Some(cursor) => cursor > self.device.position(),
            None => false,
        }
    }

    /// Segments scheduled and not yet fully played
    pub fn pending(&self) -> Vec<ScheduledSegment> {
        let now = self.device.position();
        self.scheduled.iter().filter(|s| s.end > now).copied().collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn sample_rate(&self) -> u32 {
        self.device.sample_rate()
    }

    fn retire_played(&mut self, now: u64) {
        while let Some(front) = self.scheduled.front() {
            if front.end <= now {
                self.scheduled.pop_front();
            } else {
                break;
            }
        }
    }
}
