// PCM16 conversion and base64 framing
//
// Both directions of the wire use 16-bit signed little-endian PCM, mono,
// 24kHz, carried as base64 inside JSON strings.

use base64::Engine;

use crate::error::{VoiceError, VoiceResult};

/// Sample rate used on the wire in both directions
pub const SAMPLE_RATE: u32 = 24_000;

/// Channel count used on the wire
pub const CHANNELS: u16 = 1;

/// Convert one float sample in [-1.0, 1.0] to PCM16
///
/// Scaling is `round(sample * 32767)` clamped to the i16 range; NaN maps to 0.
pub fn f32_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Convert one PCM16 sample back to a float in [-1.0, 1.0]
pub fn pcm16_to_f32(sample: i16) -> f32 {
    (sample as f32 / 32767.0).clamp(-1.0, 1.0)
}

pub fn encode_samples(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(f32_to_pcm16).collect()
}

pub fn decode_samples(samples: &[i16]) -> Vec<f32> {
    samples.iter().copied().map(pcm16_to_f32).collect()
}

pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Reassemble little-endian PCM16 bytes
///
/// An odd byte count means the buffer was cut mid-sample and is rejected.
pub fn bytes_to_pcm16(bytes: &[u8]) -> VoiceResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Protocol(format!(
            "PCM16 buffer has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn encode_base64(samples: &[i16]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm16_to_bytes(samples))
}

pub fn decode_base64(payload: &str) -> VoiceResult<Vec<i16>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| VoiceError::Protocol(format!("invalid base64 audio: {e}")))?;
    bytes_to_pcm16(&bytes)
}

/// Number of samples in one frame of `duration_ms` at `sample_rate`
pub fn samples_per_frame(sample_rate: u32, duration_ms: u64) -> usize {
    ((sample_rate as u64 * duration_ms) / 1000).max(1) as usize
}

/// Duration in milliseconds of `samples` mono samples at `sample_rate`
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples as u64 * 1000 / sample_rate as u64
}
