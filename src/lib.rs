pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod realtime;
pub mod session;

pub use audio::{
    AudioFrame, AudioSource, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureEncoder,
    FrameReceiver, FrameSink, WavFileSource,
};
pub use config::Config;
pub use error::{DeviceFailure, DeviceRole, VoiceError, VoiceResult};
pub use pipeline::{DefaultDevices, DeviceProvider, VoicePipeline};
pub use playback::{InboundAudioSegment, OutputDevice, PlaybackQueue, ScheduledSegment, WavOutput};
pub use realtime::{ClientEvent, Connector, ServerEvent, Transport, WebSocketConnector};
pub use session::{
    Activity, Message, Role, SessionConfig, SessionEvent, SessionHandle, SessionState, SessionStats,
    TranscriptAggregator, VoiceSession,
};
