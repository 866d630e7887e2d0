use tracing::{info, warn};

use crate::error::VoiceResult;

use super::backend::{CaptureBackend, CaptureConfig};
use super::slot::{frame_slot, FrameReceiver};

/// Owns the microphone backend for one session
///
/// `start` hands the backend a fresh capacity-1 sink and returns the
/// receiving half; `stop` releases the device and may be called any number
/// of times.
pub struct CaptureEncoder {
    backend: Box<dyn CaptureBackend>,
    config: CaptureConfig,
    running: bool,
}

impl CaptureEncoder {
    pub fn new(backend: Box<dyn CaptureBackend>, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            running: false,
        }
    }

    /// Acquire the device and begin producing frames
    ///
    /// Fails with `DeviceUnavailable` if the device cannot be opened. Calling
    /// `start` again while running restarts the backend with a new slot.
    pub async fn start(&mut self) -> VoiceResult<FrameReceiver> {
        if self.running {
            warn!("Capture already running on {}, restarting", self.backend.name());
            self.stop().await?;
        }

        let (sink, receiver) = frame_slot(self.config.sample_rate, self.config.samples_per_frame());

        info!(
            "Starting capture on {} ({}Hz, {}ms frames)",
            self.backend.name(),
            self.config.sample_rate,
            self.config.frame_duration_ms
        );

        self.backend.start(sink).await?;
        self.running = true;

        Ok(receiver)
    }

    /// Release the device; a no-op when not started
    pub async fn stop(&mut self) -> VoiceResult<()> {
        if !self.running {
            return Ok(());
        }

        info!("Stopping capture on {}", self.backend.name());
        self.running = false;
        self.backend.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.running && self.backend.is_capturing()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}
