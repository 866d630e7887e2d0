use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{VoiceError, VoiceResult};

/// Frame received from the realtime service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {},

    #[serde(rename = "session.updated")]
    SessionUpdated {},

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {},

    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioCommitted {},

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {},

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },

    #[serde(rename = "response.created")]
    ResponseCreated {},

    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    #[serde(rename = "response.audio.done")]
    AudioDone {},

    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },

    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone { transcript: String },

    #[serde(rename = "response.done")]
    ResponseDone {},

    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated {},

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<ErrorDetail>,
    },

    /// Any `type` this client does not know about
    #[serde(other)]
    Unknown,
}

/// Nested error object some services send instead of a flat `message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

impl ServerEvent {
    /// Human readable text for an `error` frame
    pub fn error_message(&self) -> Option<String> {
        match self {
            ServerEvent::Error { message, error } => Some(
                message
                    .clone()
                    .or_else(|| error.as_ref().and_then(|e| e.message.clone()))
                    .unwrap_or_else(|| "unspecified remote error".to_string()),
            ),
            _ => None,
        }
    }
}

/// Result of decoding one inbound text frame
#[derive(Debug)]
pub enum Inbound {
    /// A recognised event
    Event(ServerEvent),
    /// Valid JSON this client cannot act on; logged and skipped
    Ignored(VoiceError),
}

/// Decode one inbound text frame
///
/// Text that is not JSON at all breaks the framing and is a transport error.
/// Well-formed JSON with an unknown `type` or a malformed payload is only a
/// protocol error, so newer event types never end a call.
pub fn decode_server_frame(text: &str) -> VoiceResult<Inbound> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| VoiceError::Transport(format!("inbound frame is not JSON: {e}")))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(kind) = kind else {
        return Ok(Inbound::Ignored(VoiceError::Protocol(
            "frame without a string `type`".to_string(),
        )));
    };

    match serde_json::from_value::<ServerEvent>(value) {
        Ok(ServerEvent::Unknown) => Ok(Inbound::Ignored(VoiceError::Protocol(format!(
            "unrecognized event type `{kind}`"
        )))),
        Ok(event) => Ok(Inbound::Event(event)),
        Err(e) => Ok(Inbound::Ignored(VoiceError::Protocol(format!(
            "malformed `{kind}` payload: {e}"
        )))),
    }
}

/// Frame sent to the realtime service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate {},
}

impl ClientEvent {
    /// Wire name of this frame
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate {} => "response.create",
        }
    }

    pub fn user_text(text: &str) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                kind: "message".to_string(),
                role: "user".to_string(),
                content: vec![ContentPart {
                    kind: "input_text".to_string(),
                    text: text.to_string(),
                }],
            },
        }
    }

    pub fn to_json(&self) -> VoiceResult<String> {
        serde_json::to_string(self)
            .map_err(|e| VoiceError::Protocol(format!("failed to serialize {}: {e}", self.kind())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Settings carried by the initial `session.update` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionSettings>,
    pub turn_detection: TurnDetection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSettings {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: None,
            voice: "alloy".to_string(),
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            input_audio_transcription: Some(TranscriptionSettings {
                model: "whisper-1".to_string(),
            }),
            turn_detection: TurnDetection {
                kind: "server_vad".to_string(),
            },
        }
    }
}
