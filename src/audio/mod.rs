//! Microphone capture and PCM16 framing
//!
//! Capture backends push raw samples into a `FrameSink`, which cuts them
//! into fixed-duration PCM16 frames and hands them to the session through a
//! one-frame, drop-oldest slot.

pub mod backend;
pub mod capture;
pub mod file;
pub mod pcm;
pub mod slot;

#[cfg(feature = "device-audio")]
pub mod device;

pub use backend::{AudioFrame, AudioSource, CaptureBackend, CaptureBackendFactory, CaptureConfig};
pub use capture::CaptureEncoder;
pub use file::WavFileSource;
pub use slot::{frame_slot, FrameReceiver, FrameSink};

#[cfg(feature = "device-audio")]
pub use device::{CpalMicrophone, CpalSpeaker};
