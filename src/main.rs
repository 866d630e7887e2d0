// Talk to a realtime voice service from the terminal
//
// Microphone audio (or a WAV file) is streamed to the service; assistant
// audio goes to the speaker (or a WAV file). Lines typed on stdin are sent as
// user messages.
//
// Commands: /mute, /unmute, /quit. Ctrl+C ends the conversation.
//
// Usage: cargo run -- --input-wav question.wav --output-wav answer.wav

use anyhow::{Context, Result};
use clap::Parser;
use loqa_voice::{
    AudioSource, Config, DefaultDevices, Message, Role, SessionEvent, VoicePipeline, WebSocketConnector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loqa-voice")]
#[command(about = "Realtime voice conversation client")]
struct Args {
    /// Config file (TOML), extension optional
    #[arg(short, long, default_value = "config/loqa-voice")]
    config: String,

    /// Realtime endpoint, overrides the config file
    #[arg(long)]
    url: Option<String>,

    /// Replay this WAV file instead of the microphone
    #[arg(long)]
    input_wav: Option<PathBuf>,

    /// Write assistant audio to this WAV file instead of the speaker
    #[arg(long)]
    output_wav: Option<PathBuf>,

    /// Send this text as soon as the session is up
    #[arg(long)]
    say: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(url) = args.url {
        cfg.realtime.url = url;
    }
    if args.input_wav.is_some() {
        cfg.audio.input_wav = args.input_wav;
    }
    if args.output_wav.is_some() {
        cfg.audio.output_wav = args.output_wav;
    }

    info!("Loqa Voice v{}", env!("CARGO_PKG_VERSION"));
    info!("Endpoint: {}", cfg.realtime.url);

    let api_key = cfg.api_key();
    if api_key.is_none() {
        warn!("{} is not set; connecting without credentials", cfg.realtime.api_key_env);
    }

    let source = match &cfg.audio.input_wav {
        Some(path) => AudioSource::File(path.clone()),
        None => AudioSource::Microphone,
    };
    let devices = DefaultDevices::new(source, cfg.audio.output_wav.clone());
    let connector = WebSocketConnector::new(cfg.realtime.url.clone(), api_key);

    let mut pipeline = VoicePipeline::new(cfg.to_session_config(), Arc::new(connector), Arc::new(devices));

    let handle = pipeline
        .start_conversation()
        .await
        .context("Failed to start conversation")?;
    info!("Conversation {} started. Type to chat, /quit to leave.", handle.session_id());

    let mut events = handle.take_events().context("Session events already taken")?;
    let mut transcript = handle.subscribe_transcript();

    if let Some(text) = args.say {
        handle.send_text(text).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut printed = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let result = match line.trim() {
                        "" => Ok(()),
                        "/quit" => break,
                        "/mute" => handle.mute().await,
                        "/unmute" => handle.unmute().await,
                        text => handle.send_text(text).await,
                    };
                    if let Err(e) = result {
                        warn!("{}", e);
                    }
                }
                None => stdin_open = false,
            },
            changed = transcript.changed() => {
                if changed.is_err() {
                    break;
                }
                print_sealed(&transcript.borrow_and_update(), &mut printed);
            }
            event = events.recv() => match event {
                Some(event) => report(&event),
                None => break,
            },
        }
    }

    if let Some(stats) = pipeline.end_conversation().await? {
        info!("Session {} finished in state {}", stats.session_id, stats.state);
        info!(
            "Frames sent: {} (dropped {}), segments played: {} (discarded {})",
            stats.frames_sent, stats.frames_dropped, stats.segments_enqueued, stats.segments_discarded
        );
    }

    Ok(())
}

/// Print messages once they are sealed, in order
fn print_sealed(messages: &[Message], printed: &mut usize) {
    for message in messages.iter().skip(*printed) {
        if message.is_partial {
            break;
        }
        let speaker = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("[{}] {}", speaker, message.content);
        *printed += 1;
    }
}

fn report(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => info!("Session {}", state),
        SessionEvent::BargeIn { cancelled_segments } => {
            info!("Interrupted assistant ({} segments dropped)", cancelled_segments)
        }
        SessionEvent::RemoteError(message) => warn!("Service error: {}", message),
        SessionEvent::PlaybackUnavailable(message) => warn!("Playback unavailable: {}", message),
        SessionEvent::CaptureEnded => warn!("Audio input stopped"),
        SessionEvent::Failed(message) => warn!("Session failed: {}", message),
        SessionEvent::SpeechStarted
        | SessionEvent::SpeechStopped
        | SessionEvent::AssistantAudioDone
        | SessionEvent::ProtocolError(_) => {}
    }
}
