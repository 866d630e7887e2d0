//! Pipeline controller
//!
//! Owns at most one live `VoiceSession` and the device/connection factories
//! used to build each new one.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::audio::{AudioSource, CaptureBackend, CaptureBackendFactory, CaptureConfig};
use crate::error::{VoiceError, VoiceResult};
use crate::playback::{OutputDevice, WavOutput};
use crate::realtime::Connector;
use crate::session::{SessionConfig, SessionHandle, SessionStats, VoiceSession};

/// Opens the devices for one session
///
/// Devices are released when the returned handles are dropped.
pub trait DeviceProvider: Send + Sync {
    fn open_capture(&self, config: CaptureConfig) -> VoiceResult<Box<dyn CaptureBackend>>;
    fn open_output(&self, sample_rate: u32) -> VoiceResult<Box<dyn OutputDevice>>;
}

/// Microphone or WAV input, speaker or WAV output
#[derive(Debug, Clone)]
pub struct DefaultDevices {
    pub source: AudioSource,
    pub output_wav: Option<PathBuf>,
}

impl DefaultDevices {
    pub fn new(source: AudioSource, output_wav: Option<PathBuf>) -> Self {
        Self { source, output_wav }
    }
}

impl DeviceProvider for DefaultDevices {
    fn open_capture(&self, config: CaptureConfig) -> VoiceResult<Box<dyn CaptureBackend>> {
        CaptureBackendFactory::create(self.source.clone(), config)
    }

    fn open_output(&self, sample_rate: u32) -> VoiceResult<Box<dyn OutputDevice>> {
        if let Some(path) = &self.output_wav {
            return Ok(Box::new(WavOutput::create(path, sample_rate)?));
        }

        #[cfg(feature = "device-audio")]
        {
            Ok(Box::new(crate::audio::CpalSpeaker::new(sample_rate)?))
        }

        #[cfg(not(feature = "device-audio"))]
        {
            Err(VoiceError::device(
                crate::error::DeviceRole::Output,
                crate::error::DeviceFailure::NoDevice,
                "built without the device-audio feature; write assistant audio to a WAV file instead",
            ))
        }
    }
}

/// Starts and ends conversations, one at a time
pub struct VoicePipeline {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    devices: Arc<dyn DeviceProvider>,
    active: Option<SessionHandle>,
}

impl VoicePipeline {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        devices: Arc<dyn DeviceProvider>,
    ) -> Self {
        Self {
            config,
            connector,
            devices,
            active: None,
        }
    }

    /// Open devices, connect and hand the running session back
    ///
    /// Fails with `InvalidState` while another conversation is live.
    pub async fn start_conversation(&mut self) -> VoiceResult<&mut SessionHandle> {
        if let Some(handle) = &self.active {
            if !handle.is_finished() {
                return Err(VoiceError::InvalidState {
                    operation: "start conversation",
                    state: handle.state(),
                });
            }
        }
        if let Some(finished) = self.active.take() {
            if let Err(e) = finished.join().await {
                warn!("Previous session did not shut down cleanly: {}", e);
            }
        }

        let config = self.config.with_fresh_id();
        info!("Starting conversation {}", config.session_id);

        let capture = self.devices.open_capture(config.capture_config())?;
        let output = self.devices.open_output(config.sample_rate)?;

        let mut session = VoiceSession::new(config, Arc::clone(&self.connector), capture, output);
        session.start().await?;

        Ok(self.active.insert(session.spawn()))
    }

    /// The live conversation, if any
    pub fn session(&mut self) -> Option<&mut SessionHandle> {
        self.active.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// End the live conversation; `None` if there was none
    pub async fn end_conversation(&mut self) -> VoiceResult<Option<SessionStats>> {
        match self.active.take() {
            Some(handle) => {
                let stats = handle.end().await?;
                info!(
                    "Conversation {} ended: {} frames sent, {} messages",
                    stats.session_id, stats.frames_sent, stats.messages_count
                );
                Ok(Some(stats))
            }
            None => Ok(None),
        }
    }
}
