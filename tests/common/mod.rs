// Test doubles shared by the integration tests
//
// - ChannelConnector / RemoteEnd: an in-memory transport whose far side is
//   driven by the test
// - ManualOutput: an output device whose clock only moves when told to
// - RenderingOutput: an output device that renders scheduled samples the
//   way the speaker callback does, keeping audio that already started
// - ScriptedCapture: a capture backend the test pushes samples into

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use loqa_voice::audio::{CaptureBackend, FrameSink};
use loqa_voice::realtime::{Connector, Transport};
use loqa_voice::{OutputDevice, VoiceError, VoiceResult};
use tokio::sync::mpsc;

// ----------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------

pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<VoiceResult<String>>,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: String) -> VoiceResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VoiceError::Transport("connection closed".to_string()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| VoiceError::Transport("remote gone".to_string()))
    }

    async fn recv(&mut self) -> Option<VoiceResult<String>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> VoiceResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The service side of a `ChannelTransport`
pub struct RemoteEnd {
    sent: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<VoiceResult<String>>>,
    closed: Arc<AtomicBool>,
}

impl RemoteEnd {
    /// Deliver a JSON frame to the client
    pub fn push(&self, frame: serde_json::Value) {
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, frame: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Ok(frame.to_string()));
        }
    }

    pub fn push_error(&self, err: VoiceError) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(err));
        }
    }

    /// Close the connection from the service side
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Frames the client sent so far, parsed
    pub fn take_sent(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("client sent invalid JSON"));
        }
        frames
    }

    /// `type` of each frame the client sent so far
    pub fn take_sent_types(&mut self) -> Vec<String> {
        self.take_sent()
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Wait for the next frame the client sends
    pub async fn next_sent(&mut self) -> serde_json::Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client transport dropped");
        serde_json::from_str(&frame).expect("client sent invalid JSON")
    }

    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn channel_transport() -> (ChannelTransport, RemoteEnd) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let transport = ChannelTransport {
        outbound: outbound_tx,
        inbound: inbound_rx,
        closed: Arc::clone(&closed),
    };
    let remote = RemoteEnd {
        sent: outbound_rx,
        inbound: Some(inbound_tx),
        closed,
    };
    (transport, remote)
}

/// Hands out one prepared transport, optionally after a delay
pub struct ChannelConnector {
    transport: Mutex<Option<ChannelTransport>>,
    delay: Option<Duration>,
}

impl ChannelConnector {
    pub fn new() -> (Arc<Self>, RemoteEnd) {
        Self::with_delay(None)
    }

    pub fn with_delay(delay: Option<Duration>) -> (Arc<Self>, RemoteEnd) {
        let (transport, remote) = channel_transport();
        let connector = Self {
            transport: Mutex::new(Some(transport)),
            delay,
        };
        (Arc::new(connector), remote)
    }

    /// A connector whose connection is always refused
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            transport: Mutex::new(None),
            delay: None,
        })
    }
}

#[async_trait::async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self) -> VoiceResult<Box<dyn Transport>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let transport = self.transport.lock().unwrap().take();
        match transport {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(VoiceError::Transport("connection refused".to_string())),
        }
    }

    fn endpoint(&self) -> String {
        "channel://test".to_string()
    }
}

// ----------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------

/// Output device with a hand-driven clock
#[derive(Clone, Default)]
pub struct ManualOutput {
    pub clock: Arc<AtomicU64>,
    pub scheduled: Arc<Mutex<Vec<(u64, usize)>>>,
    pub cancels: Arc<AtomicUsize>,
    pub broken: Arc<AtomicBool>,
}

impl ManualOutput {
    pub fn advance(&self, samples: u64) {
        self.clock.fetch_add(samples, Ordering::SeqCst);
    }

    pub fn scheduled(&self) -> Vec<(u64, usize)> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn break_device(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

impl OutputDevice for ManualOutput {
    fn sample_rate(&self) -> u32 {
        24_000
    }

    fn position(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    fn schedule(&mut self, start: u64, samples: Vec<i16>) -> VoiceResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(VoiceError::PlaybackUnavailable("speaker unplugged".to_string()));
        }
        self.scheduled.lock().unwrap().push((start, samples.len()));
        Ok(())
    }

    fn cancel_pending(&mut self, _after: u64) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "manual"
    }
}

#[derive(Default)]
struct RenderState {
    played: u64,
    pending: VecDeque<(u64, Vec<i16>)>,
    sounded: Vec<i16>,
}

/// Output device that renders on demand like the speaker callback
///
/// Every rendered sample is recorded, silence included, so a test can see
/// exactly what would have reached the hardware.
#[derive(Clone, Default)]
pub struct RenderingOutput {
    state: Arc<Mutex<RenderState>>,
}

impl RenderingOutput {
    /// Advance the clock by `samples`, sounding whatever is due
    pub fn render(&self, samples: usize) {
        let mut st = self.state.lock().unwrap();
        for _ in 0..samples {
            let pos = st.played;
            while st
                .pending
                .front()
                .is_some_and(|(start, samples)| start + samples.len() as u64 <= pos)
            {
                st.pending.pop_front();
            }
            let sample = match st.pending.front() {
                Some((start, samples)) if *start <= pos => samples[(pos - start) as usize],
                _ => 0,
            };
            st.sounded.push(sample);
            st.played += 1;
        }
    }

    /// How many rendered samples carried `value`
    pub fn sounded(&self, value: i16) -> usize {
        self.state
            .lock()
            .unwrap()
            .sounded
            .iter()
            .filter(|&&s| s == value)
            .count()
    }
}

impl OutputDevice for RenderingOutput {
    fn sample_rate(&self) -> u32 {
        24_000
    }

    fn position(&self) -> u64 {
        self.state.lock().unwrap().played
    }

    fn schedule(&mut self, start: u64, samples: Vec<i16>) -> VoiceResult<()> {
        self.state.lock().unwrap().pending.push_back((start, samples));
        Ok(())
    }

    fn cancel_pending(&mut self, after: u64) {
        self.state
            .lock()
            .unwrap()
            .pending
            .retain(|(start, _)| *start <= after);
    }

    fn name(&self) -> &str {
        "rendering"
    }
}

// ----------------------------------------------------------------------
// Capture
// ----------------------------------------------------------------------

/// Capture backend that only produces what the test pushes
#[derive(Clone, Default)]
pub struct ScriptedCapture {
    sink: Arc<Mutex<Option<FrameSink>>>,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub deny: Arc<AtomicBool>,
}

impl ScriptedCapture {
    /// Feed samples as if the microphone had produced them
    pub fn push(&self, samples: &[f32]) {
        if let Some(sink) = self.sink.lock().unwrap().as_mut() {
            sink.push_samples(samples);
        }
    }

    /// Simulate the device going away
    pub fn disconnect(&self) {
        self.sink.lock().unwrap().take();
    }

    pub fn is_live(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedCapture {
    async fn start(&mut self, sink: FrameSink) -> VoiceResult<()> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VoiceError::device(
                loqa_voice::DeviceRole::Input,
                loqa_voice::DeviceFailure::PermissionDenied,
                "microphone access denied",
            ));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn stop(&mut self) -> VoiceResult<()> {
        if self.sink.lock().unwrap().take().is_some() {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.is_live()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
