use std::path::PathBuf;

use crate::error::VoiceResult;

use super::pcm;
use super::slot::FrameSink;

/// One fixed-duration slice of captured audio (16-bit PCM, mono)
///
/// Frames are immutable once built; the sequence number is assigned at
/// capture time and increases by one per frame produced, including frames
/// that are later dropped under backpressure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    sequence: u64,
    samples: Vec<i16>,
    sample_rate: u32,
    timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(sequence: u64, samples: Vec<i16>, sample_rate: u32, timestamp_ms: u64) -> Self {
        Self {
            sequence,
            samples,
            sample_rate,
            timestamp_ms,
        }
    }

    /// Local capture sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Raw audio samples (i16 PCM)
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Always mono
    pub fn channels(&self) -> u16 {
        pcm::CHANNELS
    }

    /// Milliseconds since capture started
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn duration_ms(&self) -> u64 {
        pcm::duration_ms(self.samples.len(), self.sample_rate)
    }

    /// Little-endian PCM16 bytes, base64 encoded for the wire
    pub fn to_base64(&self) -> String {
        pcm::encode_base64(&self.samples)
    }
}

/// Configuration for audio capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Sample rate in Hz (the wire format requires 24kHz)
    pub sample_rate: u32,
    /// Frame duration in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl CaptureConfig {
    pub fn samples_per_frame(&self) -> usize {
        pcm::samples_per_frame(self.sample_rate, self.frame_duration_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: pcm::SAMPLE_RATE, // 24kHz for the realtime service
            frame_duration_ms: 100,        // 100ms frames
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - `WavFileSource`: replays a WAV file in real time (testing, batch runs)
/// - `CpalMicrophone`: default input device (`device-audio` feature)
///
/// A started backend keeps producing until `stop()`; it never ends on its
/// own. Samples go into the sink as floats in [-1.0, 1.0].
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Acquire the device and start producing into `sink`
    async fn start(&mut self, sink: FrameSink) -> VoiceResult<()>;

    /// Release the device. Must be idempotent.
    async fn stop(&mut self) -> VoiceResult<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone (`device-audio` feature)
    Microphone,
    /// WAV file replayed as if it were live input
    File(PathBuf),
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(source: AudioSource, config: CaptureConfig) -> VoiceResult<Box<dyn CaptureBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "device-audio")]
                {
                    let backend = super::device::CpalMicrophone::new(config)?;
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "device-audio"))]
                {
                    let _ = config;
                    Err(crate::error::VoiceError::device(
                        crate::error::DeviceRole::Input,
                        crate::error::DeviceFailure::NoDevice,
                        "built without the device-audio feature",
                    ))
                }
            }

            AudioSource::File(path) => {
                let backend = super::file::WavFileSource::open(&path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}
