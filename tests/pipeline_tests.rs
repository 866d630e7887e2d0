// Integration tests for the pipeline controller

mod common;

use anyhow::Result;
use common::{ChannelConnector, ManualOutput, ScriptedCapture};
use loqa_voice::audio::{CaptureBackend, CaptureConfig};
use loqa_voice::{
    DeviceProvider, OutputDevice, SessionConfig, SessionState, VoiceError, VoicePipeline, VoiceResult,
};
use std::sync::Arc;

struct TestDevices {
    capture: ScriptedCapture,
    output: ManualOutput,
}

impl DeviceProvider for TestDevices {
    fn open_capture(&self, _config: CaptureConfig) -> VoiceResult<Box<dyn CaptureBackend>> {
        Ok(Box::new(self.capture.clone()))
    }

    fn open_output(&self, _sample_rate: u32) -> VoiceResult<Box<dyn OutputDevice>> {
        Ok(Box::new(self.output.clone()))
    }
}

#[tokio::test]
async fn test_one_live_conversation_at_a_time() -> Result<()> {
    let (connector, mut remote) = ChannelConnector::new();
    let capture = ScriptedCapture::default();
    let devices = TestDevices {
        capture: capture.clone(),
        output: ManualOutput::default(),
    };
    let mut pipeline = VoicePipeline::new(SessionConfig::default(), connector, Arc::new(devices));

    let handle = pipeline.start_conversation().await?;
    assert_eq!(handle.state(), SessionState::Active);
    assert!(handle.session_id().starts_with("voice-"));
    assert_eq!(remote.next_sent().await["type"], "session.update");
    assert!(pipeline.is_active());

    let second = pipeline.start_conversation().await;
    assert!(matches!(
        second,
        Err(VoiceError::InvalidState { operation: "start conversation", .. })
    ));

    let stats = pipeline.end_conversation().await?.expect("live session");
    assert_eq!(stats.state, SessionState::Closed);
    assert!(!pipeline.is_active());
    assert!(remote.client_closed());
    assert!(!capture.is_live());

    assert!(pipeline.end_conversation().await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_failed_start_leaves_no_session() -> Result<()> {
    let devices = TestDevices {
        capture: ScriptedCapture::default(),
        output: ManualOutput::default(),
    };
    let mut pipeline = VoicePipeline::new(
        SessionConfig::default(),
        ChannelConnector::refusing(),
        Arc::new(devices),
    );

    assert!(pipeline.start_conversation().await.is_err());
    assert!(!pipeline.is_active());
    assert!(pipeline.session().is_none());

    Ok(())
}
