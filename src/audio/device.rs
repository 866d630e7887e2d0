//! Live microphone and speaker via cpal
//!
//! cpal streams are not `Send`, so each device is built and held on its own
//! thread for as long as the owning handle lives. Dropping the handle stops
//! the stream and joins the thread.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use tracing::{debug, error, info};

use crate::error::{DeviceFailure, DeviceRole, VoiceError, VoiceResult};
use crate::playback::OutputDevice;

use super::backend::{CaptureBackend, CaptureConfig};
use super::pcm;
use super::slot::FrameSink;

/// Map a cpal error description onto the failure kinds callers act on
fn classify(role: DeviceRole, detail: String) -> VoiceError {
    let lower = detail.to_lowercase();
    let failure = if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("not authorized")
        || lower.contains("not permitted")
    {
        DeviceFailure::PermissionDenied
    } else if lower.contains("not available") || lower.contains("no such device") {
        DeviceFailure::NoDevice
    } else {
        DeviceFailure::Backend
    };
    VoiceError::device(role, failure, detail)
}

/// Thread that owns a running cpal stream
struct StreamThread {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Build a stream on a dedicated thread and wait until it is playing
    fn spawn<F>(name: &str, role: DeviceRole, build: F) -> VoiceResult<(Self, std_mpsc::Receiver<VoiceResult<()>>)>
    where
        F: FnOnce() -> VoiceResult<Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until stop is requested or the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| VoiceError::device(role, DeviceFailure::Backend, e.to_string()))?;

        Ok((
            Self {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            },
            ready_rx,
        ))
    }

    fn wait_ready(ready_rx: std_mpsc::Receiver<VoiceResult<()>>, role: DeviceRole) -> VoiceResult<()> {
        ready_rx.recv().map_err(|_| {
            VoiceError::device(role, DeviceFailure::Backend, "audio thread exited before start")
        })?
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio thread panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Default input device
pub struct CpalMicrophone {
    config: CaptureConfig,
    worker: Option<StreamThread>,
}

impl CpalMicrophone {
    pub fn new(config: CaptureConfig) -> VoiceResult<Self> {
        // Fail early when there is nothing to open
        let host = cpal::default_host();
        if host.default_input_device().is_none() {
            return Err(VoiceError::device(
                DeviceRole::Input,
                DeviceFailure::NoDevice,
                "no input device available",
            ));
        }
        Ok(Self { config, worker: None })
    }
}

fn open_input_stream(sample_rate: u32, mut sink: FrameSink) -> VoiceResult<Stream> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or_else(|| {
        VoiceError::device(DeviceRole::Input, DeviceFailure::NoDevice, "no input device available")
    })?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| classify(DeviceRole::Input, e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.min_sample_rate() <= SampleRate(sample_rate) && c.max_sample_rate() >= SampleRate(sample_rate))
        .min_by_key(|c| c.channels())
        .ok_or_else(|| {
            VoiceError::device(
                DeviceRole::Input,
                DeviceFailure::Unsupported,
                format!("no f32 input config at {sample_rate}Hz"),
            )
        })?;

    let config: StreamConfig = supported.with_sample_rate(SampleRate(sample_rate)).config();
    let channels = config.channels.max(1) as usize;

    info!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "audio capture initialized"
    );

    let mut mono = Vec::new();
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    sink.push_samples(data);
                    return;
                }
                mono.clear();
                mono.extend(
                    data.chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                );
                sink.push_samples(&mono);
            },
            |err| {
                error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| classify(DeviceRole::Input, e.to_string()))?;

    stream
        .play()
        .map_err(|e| classify(DeviceRole::Input, e.to_string()))?;
    Ok(stream)
}

#[async_trait::async_trait]
impl CaptureBackend for CpalMicrophone {
    async fn start(&mut self, sink: FrameSink) -> VoiceResult<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let sample_rate = self.config.sample_rate;
        let (worker, ready_rx) = StreamThread::spawn("loqa-capture", DeviceRole::Input, move || {
            open_input_stream(sample_rate, sink)
        })?;

        // Permission prompts can block; keep them off the runtime threads
        tokio::task::spawn_blocking(move || StreamThread::wait_ready(ready_rx, DeviceRole::Input))
            .await
            .map_err(|e| VoiceError::device(DeviceRole::Input, DeviceFailure::Backend, e.to_string()))??;

        self.worker = Some(worker);
        debug!("audio capture started");
        Ok(())
    }

    async fn stop(&mut self) -> VoiceResult<()> {
        if self.worker.take().is_some() {
            debug!("audio capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

// ---------------------------------------------------------------------------
// Speaker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SpeakerState {
    played: u64,
    pending: VecDeque<(u64, Vec<i16>)>,
    failed: Option<String>,
}

fn lock(state: &Mutex<SpeakerState>) -> MutexGuard<'_, SpeakerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Default output device, clocked by samples rendered
pub struct CpalSpeaker {
    state: Arc<Mutex<SpeakerState>>,
    sample_rate: u32,
    _worker: StreamThread,
}

impl CpalSpeaker {
    pub fn new(sample_rate: u32) -> VoiceResult<Self> {
        let state = Arc::new(Mutex::new(SpeakerState::default()));
        let callback_state = Arc::clone(&state);

        let (worker, ready_rx) = StreamThread::spawn("loqa-playback", DeviceRole::Output, move || {
            open_output_stream(sample_rate, callback_state)
        })?;
        StreamThread::wait_ready(ready_rx, DeviceRole::Output)?;

        Ok(Self {
            state,
            sample_rate,
            _worker: worker,
        })
    }
}

fn open_output_stream(sample_rate: u32, state: Arc<Mutex<SpeakerState>>) -> VoiceResult<Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        VoiceError::device(DeviceRole::Output, DeviceFailure::NoDevice, "no output device available")
    })?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| classify(DeviceRole::Output, e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32 && c.channels() <= 2)
        .filter(|c| c.min_sample_rate() <= SampleRate(sample_rate) && c.max_sample_rate() >= SampleRate(sample_rate))
        .min_by_key(|c| c.channels())
        .ok_or_else(|| {
            VoiceError::device(
                DeviceRole::Output,
                DeviceFailure::Unsupported,
                format!("no f32 output config at {sample_rate}Hz"),
            )
        })?;

    let config: StreamConfig = supported.with_sample_rate(SampleRate(sample_rate)).config();
    let channels = config.channels.max(1) as usize;

    info!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "audio playback initialized"
    );

    let error_state = Arc::clone(&state);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut st = lock(&state);
                for frame in data.chunks_mut(channels) {
                    let pos = st.played;
                    while st
                        .pending
                        .front()
                        .is_some_and(|(start, samples)| start + samples.len() as u64 <= pos)
                    {
                        st.pending.pop_front();
                    }

                    let sample = match st.pending.front() {
                        Some((start, samples)) if *start <= pos => {
                            pcm::pcm16_to_f32(samples[(pos - start) as usize])
                        }
                        _ => 0.0,
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                    st.played += 1;
                }
            },
            move |err| {
                error!(error = %err, "audio playback error");
                lock(&error_state).failed = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| classify(DeviceRole::Output, e.to_string()))?;

    stream
        .play()
        .map_err(|e| classify(DeviceRole::Output, e.to_string()))?;
    Ok(stream)
}

impl OutputDevice for CpalSpeaker {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn position(&self) -> u64 {
        lock(&self.state).played
    }

    fn schedule(&mut self, start: u64, samples: Vec<i16>) -> VoiceResult<()> {
        let mut st = lock(&self.state);
        if let Some(reason) = &st.failed {
            return Err(VoiceError::PlaybackUnavailable(reason.clone()));
        }
        st.pending.push_back((start, samples));
        Ok(())
    }

    fn cancel_pending(&mut self, after: u64) {
        lock(&self.state).pending.retain(|(start, _)| *start <= after);
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}
