use loqa_voice::realtime::messages::{decode_server_frame, ClientEvent, Inbound, ServerEvent, SessionSettings};
use loqa_voice::VoiceError;

fn decode(frame: &str) -> ServerEvent {
    match decode_server_frame(frame).unwrap() {
        Inbound::Event(event) => event,
        Inbound::Ignored(err) => panic!("frame ignored: {err}"),
    }
}

#[test]
fn test_audio_delta_deserialization() {
    let event = decode(r#"{"type":"response.audio.delta","response_id":"resp_1","delta":"AAD/fwCA"}"#);
    assert_eq!(
        event,
        ServerEvent::AudioDelta {
            delta: "AAD/fwCA".to_string()
        }
    );
}

#[test]
fn test_transcript_events_deserialization() {
    let delta = decode(r#"{"type":"response.audio_transcript.delta","delta":"Hel"}"#);
    assert_eq!(
        delta,
        ServerEvent::AudioTranscriptDelta {
            delta: "Hel".to_string()
        }
    );

    let done = decode(r#"{"type":"response.audio_transcript.done","transcript":"Hello."}"#);
    assert_eq!(
        done,
        ServerEvent::AudioTranscriptDone {
            transcript: "Hello.".to_string()
        }
    );

    let user = decode(
        r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"item_9","content_index":0,"transcript":"Hi"}"#,
    );
    assert_eq!(
        user,
        ServerEvent::InputTranscriptionCompleted {
            transcript: "Hi".to_string()
        }
    );
}

#[test]
fn test_error_message_flat_and_nested() {
    let flat = decode(r#"{"type":"error","message":"Session expired"}"#);
    assert_eq!(flat.error_message().as_deref(), Some("Session expired"));

    let nested = decode(
        r#"{"type":"error","error":{"type":"invalid_request_error","code":429,"message":"Too many requests"}}"#,
    );
    assert_eq!(nested.error_message().as_deref(), Some("Too many requests"));
}

#[test]
fn test_informational_events_recognized() {
    for kind in [
        "session.created",
        "session.updated",
        "input_audio_buffer.committed",
        "conversation.item.created",
        "response.created",
        "response.done",
        "rate_limits.updated",
        "response.audio.done",
        "input_audio_buffer.speech_stopped",
    ] {
        let frame = format!(r#"{{"type":"{kind}","event_id":"ev_1"}}"#);
        let event = decode(&frame);
        assert_ne!(event, ServerEvent::Unknown, "{kind} should be recognized");
    }
}

#[test]
fn test_non_json_is_transport_error() {
    let result = decode_server_frame("<html>502 Bad Gateway</html>");
    assert!(matches!(result, Err(VoiceError::Transport(_))));
}

#[test]
fn test_wrong_payload_type_is_protocol_error() {
    let result = decode_server_frame(r#"{"type":"response.audio.delta","delta":42}"#).unwrap();
    assert!(matches!(result, Inbound::Ignored(VoiceError::Protocol(_))));
}

#[test]
fn test_user_text_serialization() {
    let json = ClientEvent::user_text("Hello").to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["type"], "conversation.item.create");
    assert_eq!(value["item"]["type"], "message");
    assert_eq!(value["item"]["role"], "user");
    assert_eq!(value["item"]["content"][0]["type"], "input_text");
    assert_eq!(value["item"]["content"][0]["text"], "Hello");
}

#[test]
fn test_response_create_and_append_serialization() {
    let create = ClientEvent::ResponseCreate {}.to_json().unwrap();
    assert_eq!(create, r#"{"type":"response.create"}"#);

    let append = ClientEvent::InputAudioBufferAppend {
        audio: "AAA=".to_string(),
    }
    .to_json()
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&append).unwrap();
    assert_eq!(value["type"], "input_audio_buffer.append");
    assert_eq!(value["audio"], "AAA=");
}

#[test]
fn test_session_update_omits_unset_instructions() {
    let json = ClientEvent::SessionUpdate {
        session: SessionSettings::default(),
    }
    .to_json()
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["type"], "session.update");
    assert!(value["session"].get("instructions").is_none());
    assert_eq!(value["session"]["turn_detection"]["type"], "server_vad");
    assert_eq!(value["session"]["output_audio_format"], "pcm16");
}
