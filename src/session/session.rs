use super::config::SessionConfig;
use super::state::{Activity, SessionCommand, SessionEvent, SessionState};
use super::stats::SessionStats;
use super::transcript::{Message, TranscriptAggregator};
use crate::audio::{pcm, AudioFrame, CaptureBackend, CaptureEncoder, FrameReceiver};
use crate::error::{VoiceError, VoiceResult};
use crate::playback::{InboundAudioSegment, OutputDevice, PlaybackQueue};
use crate::realtime::{decode_server_frame, ClientEvent, Connector, Inbound, ServerEvent, Transport};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One conversation with the realtime service
///
/// Owns the transport, the capture encoder, the playback queue and the
/// transcript. Every mutation happens through `&mut self`, and the `run`
/// loop is the single context that feeds capture frames, inbound frames and
/// caller commands into it, one at a time.
pub struct VoiceSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,

    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    activity: Activity,

    /// Open connection; only this session writes to it
    transport: Option<Box<dyn Transport>>,

    capture: CaptureEncoder,
    frames: Option<FrameReceiver>,
    playback: PlaybackQueue,
    transcript: TranscriptAggregator,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,

    started_at: DateTime<Utc>,
    next_arrival: u64,
    frames_sent: u64,
    frames_dropped: u64,
    segments_enqueued: u64,
    segments_discarded: u64,
    protocol_errors: u64,
    playback_reported: bool,
}

impl VoiceSession {
    /// Create an idle session over the given devices
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        capture: Box<dyn CaptureBackend>,
        output: Box<dyn OutputDevice>,
    ) -> Self {
        info!("Creating voice session: {}", config.session_id);

        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let capture = CaptureEncoder::new(capture, config.capture_config());

        Self {
            config,
            connector,
            state: SessionState::Idle,
            state_tx,
            activity: Activity::default(),
            transport: None,
            capture,
            frames: None,
            playback: PlaybackQueue::new(output),
            transcript: TranscriptAggregator::new(),
            events_tx,
            events_rx: Some(events_rx),
            started_at: Utc::now(),
            next_arrival: 0,
            frames_sent: 0,
            frames_dropped: 0,
            segments_enqueued: 0,
            segments_discarded: 0,
            protocol_errors: 0,
            playback_reported: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn subscribe_transcript(&self) -> watch::Receiver<Vec<Message>> {
        self.transcript.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Event receiver; can be taken once
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }

    /// Take the next captured frame if one is waiting
    pub fn try_next_frame(&mut self) -> Option<AudioFrame> {
        self.frames.as_mut().and_then(FrameReceiver::try_recv)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Connect, configure the remote session and start capture
    ///
    /// Only legal from `Idle`. Any failure leaves the session `Failed` with
    /// every resource released and is returned to the caller.
    pub async fn start(&mut self) -> VoiceResult<()> {
        if self.state != SessionState::Idle {
            return Err(VoiceError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        info!(
            "Starting voice session {} against {}",
            self.config.session_id,
            self.connector.endpoint()
        );
        self.set_state(SessionState::Connecting);

        match self.establish().await {
            Ok(()) => {
                self.set_state(SessionState::Active);
                info!("Voice session {} active", self.config.session_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start voice session {}: {}", self.config.session_id, e);
                self.emit(SessionEvent::Failed(e.to_string()));
                self.teardown(SessionState::Failed).await;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> VoiceResult<()> {
        let timeout = self.config.connect_timeout;
        let mut transport = tokio::time::timeout(timeout, self.connector.connect())
            .await
            .map_err(|_| VoiceError::ConnectTimeout(timeout))??;

        let update = ClientEvent::SessionUpdate {
            session: self.config.settings.clone(),
        };
        if let Err(e) = transport.send(update.to_json()?).await {
            let _ = transport.close().await;
            return Err(e);
        }
        self.transport = Some(transport);

        let frames = self.capture.start().await?;
        self.frames = Some(frames);
        Ok(())
    }

    /// Stop capture, close the transport and drop queued audio
    ///
    /// A no-op on sessions that are idle or already finished.
    pub async fn end(&mut self) {
        match self.state {
            SessionState::Active | SessionState::Connecting => {}
            SessionState::Idle => {
                debug!("end() on idle session {} ignored", self.config.session_id);
                return;
            }
            SessionState::Closing | SessionState::Closed | SessionState::Failed => return,
        }

        info!("Ending voice session: {}", self.config.session_id);
        self.set_state(SessionState::Closing);
        self.teardown(SessionState::Closed).await;
    }

    async fn fail(&mut self, err: &VoiceError) {
        if self.state.is_terminal() {
            return;
        }
        error!("Voice session {} failed: {}", self.config.session_id, err);
        self.emit(SessionEvent::Failed(err.to_string()));
        self.teardown(SessionState::Failed).await;
    }

    async fn on_remote_closed(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        info!("Realtime service closed the connection");
        self.set_state(SessionState::Closing);
        self.teardown(SessionState::Closed).await;
    }

    /// Release mic, speaker queue and transport, then settle in `final_state`
    async fn teardown(&mut self, final_state: SessionState) {
        if let Err(e) = self.capture.stop().await {
            warn!("Failed to stop capture: {}", e);
        }
        if let Some(frames) = self.frames.take() {
            self.frames_dropped += frames.dropped();
        }

        let cancelled = self.playback.clear();
        if cancelled > 0 {
            debug!("Discarded {} queued segments on teardown", cancelled);
        }

        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Failed to close transport: {}", e);
            }
        }

        self.transcript.seal_open();
        self.activity = Activity::default();
        self.set_state(final_state);
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Inject a typed user message and ask for a response
    ///
    /// Always two frames: `conversation.item.create` then `response.create`.
    pub async fn send_text(&mut self, text: &str) -> VoiceResult<()> {
        self.require_active("send text")?;

        self.send_event(ClientEvent::user_text(text)).await?;
        self.send_event(ClientEvent::ResponseCreate {}).await?;
        self.transcript.push_user(text);
        Ok(())
    }

    /// Forward one capture frame
    pub async fn send_frame(&mut self, frame: AudioFrame) -> VoiceResult<()> {
        self.require_active("send audio")?;

        self.send_event(ClientEvent::InputAudioBufferAppend {
            audio: frame.to_base64(),
        })
        .await?;
        self.frames_sent += 1;
        Ok(())
    }

    async fn send_event(&mut self, event: ClientEvent) -> VoiceResult<()> {
        let json = event.to_json()?;
        debug!("Sending {}", event.kind());

        let result = match self.transport.as_mut() {
            Some(transport) => transport.send(json).await,
            None => Err(VoiceError::Transport("no open connection".to_string())),
        };

        if let Err(e) = result {
            self.fail(&e).await;
            return Err(e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local controls
    // ------------------------------------------------------------------

    /// Stop playing assistant audio; queued audio is discarded
    pub fn mute(&mut self) -> VoiceResult<()> {
        self.require_active("mute")?;
        if !self.activity.muted {
            self.activity.muted = true;
            self.activity.speaking = false;
            let cancelled = self.playback.clear();
            info!("Muted playback ({} queued segments discarded)", cancelled);
        }
        Ok(())
    }

    pub fn unmute(&mut self) -> VoiceResult<()> {
        self.require_active("unmute")?;
        if self.activity.muted {
            self.activity.muted = false;
            info!("Unmuted playback");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Process one inbound text frame
    ///
    /// Ignored outside `Active`. Returns an error only when the frame was
    /// fatal, in which case the session is already `Failed`.
    pub async fn handle_frame(&mut self, raw: &str) -> VoiceResult<()> {
        if self.state != SessionState::Active {
            debug!("Ignoring inbound frame while {}", self.state);
            return Ok(());
        }

        match decode_server_frame(raw) {
            Ok(Inbound::Event(event)) => {
                self.handle_event(event);
                Ok(())
            }
            Ok(Inbound::Ignored(err)) => {
                self.report_protocol_error(err);
                Ok(())
            }
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    /// Apply one decoded event
    pub fn handle_event(&mut self, event: ServerEvent) {
        if self.state != SessionState::Active {
            debug!("Ignoring {:?} while {}", event, self.state);
            return;
        }

        match event {
            ServerEvent::SpeechStarted {} => self.on_speech_started(),
            ServerEvent::SpeechStopped {} => {
                self.activity.listening = false;
                self.emit(SessionEvent::SpeechStopped);
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                self.transcript.push_user(&transcript);
            }
            ServerEvent::AudioDelta { delta } => self.on_audio_delta(&delta),
            ServerEvent::AudioDone {} => {
                self.activity.speaking = false;
                self.emit(SessionEvent::AssistantAudioDone);
            }
            ServerEvent::AudioTranscriptDelta { delta } => {
                self.transcript.push_assistant_delta(&delta);
            }
            ServerEvent::AudioTranscriptDone { transcript } => {
                self.transcript.seal_assistant(&transcript);
            }
            event @ ServerEvent::Error { .. } => {
                let message = event.error_message().unwrap_or_default();
                warn!("Remote error: {}", message);
                self.emit(SessionEvent::RemoteError(message));
            }
            ServerEvent::Unknown => {
                self.report_protocol_error(VoiceError::Protocol("unrecognized event type".to_string()));
            }
            ServerEvent::SessionCreated {}
            | ServerEvent::SessionUpdated {}
            | ServerEvent::InputAudioCommitted {}
            | ServerEvent::ConversationItemCreated {}
            | ServerEvent::ResponseCreated {}
            | ServerEvent::ResponseDone {}
            | ServerEvent::RateLimitsUpdated {} => {
                debug!("Informational event: {:?}", event);
            }
        }
    }

    fn on_speech_started(&mut self) {
        self.activity.listening = true;
        self.emit(SessionEvent::SpeechStarted);

        if self.activity.speaking || self.playback.is_playing() {
            let was_speaking = self.activity.speaking;
            let cancelled = self.playback.clear();
            self.activity.speaking = false;
            if was_speaking || cancelled > 0 {
                info!("Barge-in: cleared {} queued segments", cancelled);
                self.emit(SessionEvent::BargeIn {
                    cancelled_segments: cancelled,
                });
            }
        }
    }

    fn on_audio_delta(&mut self, delta: &str) {
        let samples = match pcm::decode_base64(delta) {
            Ok(samples) => samples,
            Err(e) => {
                self.report_protocol_error(e);
                return;
            }
        };

        let arrival = self.next_arrival;
        self.next_arrival += 1;

        // Decoded either way so muting never affects protocol sequencing
        if self.activity.muted {
            self.segments_discarded += 1;
            debug!("Muted, discarding segment {} ({} samples)", arrival, samples.len());
            return;
        }

        match self.playback.enqueue(InboundAudioSegment::new(arrival, samples)) {
            Ok(_) => {
                self.segments_enqueued += 1;
                self.activity.speaking = true;
            }
            Err(e) => {
                self.segments_discarded += 1;
                if !self.playback_reported {
                    self.playback_reported = true;
                    warn!("Assistant audio will be dropped: {}", e);
                    self.emit(SessionEvent::PlaybackUnavailable(e.to_string()));
                }
            }
        }
    }

    fn report_protocol_error(&mut self, err: VoiceError) {
        warn!("Ignoring inbound frame: {}", err);
        self.protocol_errors += 1;
        self.emit(SessionEvent::ProtocolError(err.to_string()));
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Drive the session until it reaches a terminal state
    ///
    /// Capture frames, inbound frames and commands are handled strictly one
    /// at a time. Dropping every command sender ends the session.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> SessionStats {
        while self.state == SessionState::Active {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(command).await,
                    None => {
                        debug!("All session handles dropped");
                        self.end().await;
                    }
                },
                inbound = next_inbound(&mut self.transport) => match inbound {
                    // Fatal frames have already failed the session
                    Some(Ok(text)) => { let _ = self.handle_frame(&text).await; }
                    Some(Err(e)) => self.fail(&e).await,
                    None => self.on_remote_closed().await,
                },
                frame = next_frame(&mut self.frames) => match frame {
                    Some(frame) => { let _ = self.send_frame(frame).await; }
                    None => {
                        warn!("Capture stopped producing frames");
                        if let Some(frames) = self.frames.take() {
                            self.frames_dropped += frames.dropped();
                        }
                        self.emit(SessionEvent::CaptureEnded);
                    }
                },
            }
        }

        info!(
            "Voice session {} finished: {}",
            self.config.session_id, self.state
        );
        self.stats()
    }

    async fn apply(&mut self, command: SessionCommand) {
        let result = match command {
            SessionCommand::SendText(text) => self.send_text(&text).await,
            SessionCommand::Mute => self.mute(),
            SessionCommand::Unmute => self.unmute(),
            SessionCommand::End => {
                self.end().await;
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("Session command failed: {}", e);
        }
    }

    /// Run the session on its own task
    pub fn spawn(mut self) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let handle_parts = (
            self.config.session_id.clone(),
            self.transcript.subscribe(),
            self.state_tx.subscribe(),
            self.events_rx.take(),
        );
        let task = tokio::spawn(self.run(commands_rx));

        let (session_id, transcript, state, events) = handle_parts;
        SessionHandle {
            session_id,
            commands: commands_tx,
            transcript,
            state,
            events,
            task,
        }
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        let live_dropped = self.frames.as_ref().map_or(0, FrameReceiver::dropped);

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: self.state,
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped + live_dropped,
            segments_enqueued: self.segments_enqueued,
            segments_discarded: self.segments_discarded,
            protocol_errors: self.protocol_errors,
            messages_count: self.transcript.messages().len(),
        }
    }

    fn require_active(&self, operation: &'static str) -> VoiceResult<()> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(VoiceError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!("Session {}: {} -> {}", self.config.session_id, self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
        self.emit(SessionEvent::StateChanged(next));
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.events_tx.send(event);
    }
}

async fn next_inbound(transport: &mut Option<Box<dyn Transport>>) -> Option<VoiceResult<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(frames: &mut Option<FrameReceiver>) -> Option<AudioFrame> {
    match frames {
        Some(frames) => frames.recv().await,
        None => std::future::pending().await,
    }
}

/// Control handle for a session running on its own task
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<SessionCommand>,
    transcript: watch::Receiver<Vec<Message>>,
    state: watch::Receiver<SessionState>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    task: JoinHandle<SessionStats>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Transcript snapshots, updated after every change
    pub fn subscribe_transcript(&self) -> watch::Receiver<Vec<Message>> {
        self.transcript.clone()
    }

    /// Event receiver; can be taken once
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn send_text(&self, text: impl Into<String>) -> VoiceResult<()> {
        self.command(SessionCommand::SendText(text.into())).await
    }

    pub async fn mute(&self) -> VoiceResult<()> {
        self.command(SessionCommand::Mute).await
    }

    pub async fn unmute(&self) -> VoiceResult<()> {
        self.command(SessionCommand::Unmute).await
    }

    async fn command(&self, command: SessionCommand) -> VoiceResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| VoiceError::InvalidState {
                operation: "send command",
                state: *self.state.borrow(),
            })
    }

    /// End the session and wait for its final stats
    pub async fn end(self) -> VoiceResult<SessionStats> {
        // A finished loop has dropped its receiver; that is fine
        let _ = self.commands.send(SessionCommand::End).await;
        self.join().await
    }

    /// Wait for the session to finish on its own
    pub async fn join(self) -> VoiceResult<SessionStats> {
        self.task
            .await
            .map_err(|e| VoiceError::Transport(format!("session task failed: {e}")))
    }
}
