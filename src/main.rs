use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voicewire::audio::{AudioCapture, AudioPlayback, codec};
use voicewire::ui::UiState;
use voicewire::{Config, SessionManager};

/// Voicewire - realtime voice client for conversational AI endpoints
#[derive(Parser)]
#[command(name = "voicewire", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Override the realtime model identifier
    #[arg(long, env = "VOICEWIRE_MODEL")]
    model: Option<String>,

    /// Override the synthesized voice
    #[arg(long, env = "VOICEWIRE_VOICE")]
    voice: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and stream until interrupted (default)
    Run,
    /// Test microphone input with a level meter
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Write captured audio to a WAV file
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Test speaker output through the playback timeline
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voicewire=info",
        1 => "info,voicewire=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::TestMic { duration, dump }) => {
            return test_mic(duration, dump.as_deref()).await;
        }
        Some(Command::TestSpeaker) => return test_speaker().await,
        Some(Command::Run) | None => {}
    }

    let mut config = Config::load()?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(voice) = cli.voice {
        config.voice = voice;
    }

    tracing::info!(model = %config.model, voice = %config.voice, "starting voicewire");

    let mut manager = SessionManager::new(config);
    let mut ui_state = UiState::RequestingPermission;

    if let Err(e) = manager.connect().await {
        let snapshot = manager.snapshot();
        tracing::error!(error = %e, code = ?snapshot.error, "connect failed");
        return Err(e.into());
    }

    ui_state = apply_ui(ui_state, &manager);
    tracing::info!("listening - press ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
            event = manager.next_event() => {
                let Some(event) = event else { break };
                manager.handle_event(event);
                ui_state = apply_ui(ui_state, &manager);

                // No automatic reconnect; a surfaced error ends the run
                if manager.snapshot().error.is_some() {
                    break;
                }
            }
        }
    }

    manager.disconnect();

    for citation in manager.log().citations() {
        tracing::info!(uri = %citation.uri, title = ?citation.title, "source");
    }

    let snapshot = manager.snapshot();
    if let Some(code) = snapshot.error {
        anyhow::bail!("session ended with {code}");
    }
    Ok(())
}

/// Re-derive the display state and log transitions
fn apply_ui(previous: UiState, manager: &SessionManager) -> UiState {
    let next = UiState::derive(previous, &manager.snapshot());
    if next != previous {
        tracing::info!(state = ?next, "ui state");
    }
    next
}

/// Test microphone input with a level meter
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, dump: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    // Gate disabled so every block reaches the meter
    let mut capture = AudioCapture::new(voicewire::audio::DEFAULT_BLOCK_SIZE, 0.0);
    capture.arm()?;

    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(64);
    capture.start(tx)?;

    println!("Sample rate: {} Hz", codec::CAPTURE_SAMPLE_RATE);
    println!("---");

    let mut recorded: Vec<f32> = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);

    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            block = rx.recv() => {
                let Some(block) = block else { break };
                let samples = codec::decode_pcm16(&block)?;
                let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let meter_len = (peak * 100.0).min(50.0) as usize;
                let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);
                println!("Peak: {peak:.4} | [{meter}]");

                if dump.is_some() {
                    recorded.extend_from_slice(&samples);
                }
            }
        }
    }

    capture.teardown();

    if let Some(path) = dump {
        codec::write_wav(path, &recorded, codec::CAPTURE_SAMPLE_RATE)?;
        println!("\nWrote {} samples to {}", recorded.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working.");
    Ok(())
}

/// Test speaker output with a sine tone through the playback timeline
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;
    playback.start()?;

    let sample_rate = codec::PLAYBACK_SAMPLE_RATE;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    playback.enqueue(samples);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(4);
    while playback.is_speaking() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    playback.teardown();

    println!("\n---");
    println!("If you heard the tone, your speakers are working.");
    Ok(())
}
