// Integration tests for WAV-backed capture and playback
//
// These tests write small WAV files into a temp directory and check that
// they are replayed as capture frames, and that played audio lands in the
// output file.

use anyhow::Result;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use loqa_voice::audio::{frame_slot, pcm, CaptureBackend, CaptureConfig, WavFileSource};
use loqa_voice::{DeviceFailure, OutputDevice, VoiceError, WavOutput};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_wav_source_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("question.wav");
    write_wav(&path, 24_000, 1, &vec![16384; 4800])?;

    let source = WavFileSource::open(&path, CaptureConfig::default())?;

    assert_eq!(source.samples().len(), 4800);
    assert!((source.samples()[0] - 0.5).abs() < 1e-4);
    assert_eq!(source.name(), "WAV file");
    assert!(!source.is_capturing());

    Ok(())
}

#[test]
fn test_wav_source_downmixes_stereo() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    write_wav(&path, 24_000, 2, &[16384, 0, 16384, 0])?;

    let source = WavFileSource::open(&path, CaptureConfig::default())?;
    assert_eq!(source.samples().len(), 2);
    assert!((source.samples()[0] - 0.25).abs() < 1e-4);

    Ok(())
}

#[test]
fn test_wav_source_round_trips_through_pcm16() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("exact.wav");
    let original = [32767, -32767, 1234, -5, 0];
    write_wav(&path, 24_000, 1, &original)?;

    let source = WavFileSource::open(&path, CaptureConfig::default())?;
    assert_eq!(pcm::encode_samples(source.samples()), original.to_vec());

    Ok(())
}

#[test]
fn test_wav_source_reads_float_samples() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("float.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for sample in [0.5f32, -0.25, 1.5] {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    let source = WavFileSource::open(&path, CaptureConfig::default())?;
    assert_eq!(source.samples(), &[0.5, -0.25, 1.0]);

    Ok(())
}

#[test]
fn test_wav_source_reads_24_bit_samples() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("studio.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 24,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for sample in [8_388_607i32, -8_388_607, 0] {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    let source = WavFileSource::open(&path, CaptureConfig::default())?;
    assert_eq!(source.samples(), &[1.0, -1.0, 0.0]);
    assert_eq!(pcm::encode_samples(source.samples()), vec![32767, -32767, 0]);

    Ok(())
}

#[test]
fn test_wav_source_rejects_other_sample_rates() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cd.wav");
    write_wav(&path, 44_100, 1, &[0; 100])?;

    match WavFileSource::open(&path, CaptureConfig::default()) {
        Err(VoiceError::DeviceUnavailable { failure, .. }) => {
            assert_eq!(failure, DeviceFailure::Unsupported)
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("44.1kHz file should be rejected"),
    }

    Ok(())
}

#[test]
fn test_wav_source_nonexistent() {
    let result = WavFileSource::open("/nonexistent/path/to/audio.wav", CaptureConfig::default());

    match result {
        Err(VoiceError::DeviceUnavailable { failure, .. }) => assert_eq!(failure, DeviceFailure::NoDevice),
        _ => panic!("Opening nonexistent file should fail with NoDevice"),
    }
}

#[tokio::test]
async fn test_wav_source_streams_file_then_silence() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("short.wav");
    let config = CaptureConfig {
        sample_rate: 24_000,
        frame_duration_ms: 10,
    };
    write_wav(&path, 24_000, 1, &vec![8000; config.samples_per_frame()])?;

    let mut source = WavFileSource::open(&path, config)?;
    let (sink, mut frames) = frame_slot(config.sample_rate, config.samples_per_frame());

    source.start(sink).await?;
    assert!(source.is_capturing());

    let first = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await?
        .expect("frame");
    assert_eq!(first.sequence(), 0);
    assert_eq!(first.samples().len(), 240);
    assert!(first.samples().iter().all(|&s| s == 8000));

    let second = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await?
        .expect("frame");
    assert!(second.sequence() > first.sequence());
    assert!(second.samples().iter().all(|&s| s == 0));

    source.stop().await?;
    source.stop().await?;
    assert!(!source.is_capturing());

    // Stopping drops the sink, which ends the stream
    let rest = tokio::time::timeout(Duration::from_secs(2), async {
        while frames.recv().await.is_some() {}
    })
    .await;
    assert!(rest.is_ok());

    Ok(())
}

#[test]
fn test_wav_output_writes_started_audio() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("answer.wav");

    let mut output = WavOutput::create(&path, 24_000)?;
    // Start at 0, which is already in the past
    output.schedule(0, vec![1234; 480])?;
    output.finish()?;

    let reader = WavReader::open(&path)?;
    assert_eq!(reader.spec().sample_rate, 24_000);
    assert_eq!(reader.spec().channels, 1);
    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(samples, vec![1234; 480]);

    Ok(())
}

#[test]
fn test_wav_output_drops_cancelled_audio() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cancelled.wav");

    let mut output = WavOutput::create(&path, 24_000)?;
    // Far enough ahead that it cannot have started
    output.schedule(24_000 * 3600, vec![1234; 480])?;
    output.cancel_pending(0);
    output.finish()?;

    let reader = WavReader::open(&path)?;
    assert_eq!(reader.len(), 0);

    Ok(())
}
