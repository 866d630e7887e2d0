use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{DeviceFailure, DeviceRole, VoiceError, VoiceResult};

use super::backend::{CaptureBackend, CaptureConfig};
use super::pcm;
use super::slot::FrameSink;

/// Capture backend that replays a WAV file as live microphone input
///
/// Frames are paced at real time. Once the file is exhausted the source keeps
/// producing silence, like an idle microphone, until stopped.
pub struct WavFileSource {
    path: String,
    samples: Vec<f32>,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
}

impl WavFileSource {
    pub fn open(path: impl AsRef<Path>, config: CaptureConfig) -> VoiceResult<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(|e| {
            VoiceError::device(
                DeviceRole::Input,
                DeviceFailure::NoDevice,
                format!("failed to open WAV file {}: {e}", path.display()),
            )
        })?;

        let spec = reader.spec();
        if spec.sample_rate != config.sample_rate {
            return Err(VoiceError::device(
                DeviceRole::Input,
                DeviceFailure::Unsupported,
                format!(
                    "expected {}Hz audio, got {}Hz (resampling not supported)",
                    config.sample_rate, spec.sample_rate
                ),
            ));
        }

        let interleaved = read_interleaved(reader)?;
        let samples = downmix_to_mono(&interleaved, spec.channels);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            samples.len() as f64 / spec.sample_rate as f64,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            samples,
            config,
            task: None,
        })
    }

    /// Mono samples that will be replayed
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

fn decode_failed(e: hound::Error) -> VoiceError {
    VoiceError::device(DeviceRole::Input, DeviceFailure::Backend, e.to_string())
}

/// Decode every sample to f32 on the same scale as live capture
///
/// 16-bit audio uses the PCM16 scaling exactly, so a file written from
/// encoded frames decodes back to the same samples.
fn read_interleaved<R: std::io::Read>(reader: WavReader<R>) -> VoiceResult<Vec<f32>> {
    let spec = reader.spec();
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(pcm::pcm16_to_f32).map_err(decode_failed))
            .collect(),
        (SampleFormat::Int, bits @ 8..=32) => {
            let full_scale = ((1i64 << (bits - 1)) - 1) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|v| (v as f32 / full_scale).clamp(-1.0, 1.0))
                        .map_err(decode_failed)
                })
                .collect()
        }
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| v.clamp(-1.0, 1.0)).map_err(decode_failed))
            .collect(),
        (format, bits) => Err(VoiceError::device(
            DeviceRole::Input,
            DeviceFailure::Unsupported,
            format!("unsupported WAV sample format: {bits}-bit {format:?}"),
        )),
    }
}

/// Average interleaved channels into one
fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[async_trait::async_trait]
impl CaptureBackend for WavFileSource {
    async fn start(&mut self, mut sink: FrameSink) -> VoiceResult<()> {
        if self.task.is_some() {
            return Err(VoiceError::device(
                DeviceRole::Input,
                DeviceFailure::Backend,
                "already capturing",
            ));
        }

        let samples = self.samples.clone();
        let chunk = sink.samples_per_frame();
        let period = Duration::from_millis(self.config.frame_duration_ms.max(1));
        let path = self.path.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let silence = vec![0.0f32; chunk];
            let mut offset = 0;

            loop {
                ticker.tick().await;
                if offset < samples.len() {
                    let end = (offset + chunk).min(samples.len());
                    sink.push_samples(&samples[offset..end]);
                    offset = end;
                    if offset == samples.len() {
                        debug!("Reached end of {}, streaming silence", path);
                    }
                } else {
                    sink.push_samples(&silence);
                }
            }
        });

        self.task = Some(task);
        Ok(())
    }

    async fn stop(&mut self) -> VoiceResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

impl Drop for WavFileSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
