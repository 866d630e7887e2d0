// Capacity-1, drop-oldest hand-off between capture and the session loop
//
// The capture side never blocks: if the session has not taken the previous
// frame yet, the new frame replaces it and the old one is counted as dropped.
// Live speech tolerates a lost frame far better than growing latency.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::Notify;
use tracing::debug;

use super::backend::AudioFrame;
use super::pcm;

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<AudioFrame>,
    closed: bool,
    produced: u64,
    dropped: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<SlotState>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A panic in a capture callback must not wedge the session loop
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Create a connected sink/receiver pair
///
/// The sink cuts incoming float samples into frames of `samples_per_frame`
/// and tags each with the next sequence number.
pub fn frame_slot(sample_rate: u32, samples_per_frame: usize) -> (FrameSink, FrameReceiver) {
    let shared = Arc::new(Shared::default());
    let sink = FrameSink {
        shared: Arc::clone(&shared),
        pending: Vec::with_capacity(samples_per_frame),
        samples_per_frame: samples_per_frame.max(1),
        sample_rate,
        next_sequence: 0,
        started_at: None,
    };
    (sink, FrameReceiver { shared })
}

/// Producer half, owned by the capture backend
///
/// Holds at most one partially filled frame of samples.
pub struct FrameSink {
    shared: Arc<Shared>,
    pending: Vec<f32>,
    samples_per_frame: usize,
    sample_rate: u32,
    next_sequence: u64,
    started_at: Option<Instant>,
}

impl FrameSink {
    /// Feed raw capture samples; complete frames are offered immediately
    pub fn push_samples(&mut self, samples: &[f32]) {
        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        let mut rest = samples;

        while !rest.is_empty() {
            let needed = self.samples_per_frame - self.pending.len();
            let take = needed.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.samples_per_frame {
                let encoded = pcm::encode_samples(&self.pending);
                self.pending.clear();

                let frame = AudioFrame::new(
                    self.next_sequence,
                    encoded,
                    self.sample_rate,
                    started_at.elapsed().as_millis() as u64,
                );
                self.next_sequence += 1;
                self.offer(frame);
            }
        }
    }

    /// Place a frame in the slot, replacing any frame not yet taken
    ///
    /// Returns true if an older frame was dropped.
    pub fn offer(&self, frame: AudioFrame) -> bool {
        let replaced = {
            let mut state = self.shared.lock();
            if state.closed {
                return false;
            }
            state.produced += 1;
            let replaced = state.frame.replace(frame);
            if let Some(old) = &replaced {
                state.dropped += 1;
                debug!("Dropping capture frame {} (consumer behind)", old.sequence());
            }
            replaced.is_some()
        };
        self.shared.notify.notify_one();
        replaced
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_one();
    }
}

/// Consumer half, owned by the session loop
pub struct FrameReceiver {
    shared: Arc<Shared>,
}

impl FrameReceiver {
    /// Wait for the next frame
    ///
    /// Returns `None` once the sink is gone and the slot is empty.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(frame) = state.frame.take() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Take the current frame without waiting
    pub fn try_recv(&mut self) -> Option<AudioFrame> {
        self.shared.lock().frame.take()
    }

    /// Frames handed to the slot so far
    pub fn produced(&self) -> u64 {
        self.shared.lock().produced
    }

    /// Frames replaced before the consumer took them
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        // Late frames from a still-running device go nowhere
        self.shared.lock().closed = true;
    }
}
