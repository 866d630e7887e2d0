use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, warn};

use crate::audio::pcm;
use crate::error::{DeviceFailure, DeviceRole, VoiceError, VoiceResult};

use super::queue::OutputDevice;

/// Output device that records played audio into a WAV file
///
/// The device clock follows wall time from creation. A scheduled segment is
/// written once its start time has passed, so audio cancelled before it
/// would have started never reaches the file. Gaps are filled with silence.
pub struct WavOutput {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    sample_rate: u32,
    started_at: Instant,
    pending: VecDeque<(u64, Vec<i16>)>,
    written_until: u64,
}

impl WavOutput {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> VoiceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = WavSpec {
            channels: pcm::CHANNELS,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(&path, spec).map_err(|e| {
            VoiceError::device(
                DeviceRole::Output,
                DeviceFailure::Backend,
                format!("failed to create {}: {e}", path.display()),
            )
        })?;

        info!("Recording assistant audio to {}", path.display());

        Ok(Self {
            path,
            writer: Some(writer),
            sample_rate,
            started_at: Instant::now(),
            pending: VecDeque::new(),
            written_until: 0,
        })
    }

    /// Write every pending segment and close the file
    pub fn finish(&mut self) -> VoiceResult<()> {
        if self.writer.is_none() {
            return Ok(());
        }
        self.flush_until(u64::MAX)?;
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| VoiceError::PlaybackUnavailable(e.to_string()))?;
            info!("Finished {} ({} samples)", self.path.display(), self.written_until);
        }
        Ok(())
    }

    fn clock(&self) -> u64 {
        let elapsed = self.started_at.elapsed();
        (elapsed.as_secs_f64() * self.sample_rate as f64) as u64
    }

    /// Write segments whose start lies before `limit`
    fn flush_until(&mut self, limit: u64) -> VoiceResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(VoiceError::PlaybackUnavailable(format!(
                "{} already finalized",
                self.path.display()
            )));
        };

        while let Some((start, _)) = self.pending.front() {
            if *start > limit {
                break;
            }
            let Some((start, samples)) = self.pending.pop_front() else {
                break;
            };

            for _ in self.written_until..start {
                writer
                    .write_sample(0i16)
                    .map_err(|e| VoiceError::PlaybackUnavailable(e.to_string()))?;
            }
            for sample in &samples {
                writer
                    .write_sample(*sample)
                    .map_err(|e| VoiceError::PlaybackUnavailable(e.to_string()))?;
            }
            self.written_until = self.written_until.max(start) + samples.len() as u64;
        }

        Ok(())
    }
}

impl OutputDevice for WavOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn position(&self) -> u64 {
        self.clock()
    }

    fn schedule(&mut self, start: u64, samples: Vec<i16>) -> VoiceResult<()> {
        if self.writer.is_none() {
            return Err(VoiceError::PlaybackUnavailable(format!(
                "{} already finalized",
                self.path.display()
            )));
        }
        self.pending.push_back((start, samples));
        let now = self.clock();
        self.flush_until(now)
    }

    fn cancel_pending(&mut self, after: u64) {
        if let Err(e) = self.flush_until(after) {
            warn!("Failed to flush started audio before cancel: {}", e);
        }
        self.pending.clear();
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to finalize {}: {}", self.path.display(), e);
        }
    }
}
