//! CLI binary for tingxie.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tingxie::ocr::{HttpTextRecognizer, TextRecognizer};
use tingxie::playback::CpalOutput;
use tingxie::{EngineConfig, PlaybackOutcome, Player, SilenceSynth};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tingxie: streaming Chinese speech playback for dictation practice.
#[derive(Parser)]
#[command(name = "tingxie-speak", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Speak a passage of text.
    Speak {
        /// The text to speak.
        text: String,

        /// Voice to use, overriding the configured one.
        #[arg(short, long)]
        voice: Option<String>,
    },

    /// Dictate a list of words with a pause between them.
    Dictate {
        /// The words to dictate, in order.
        words: Vec<String>,
    },

    /// Recognize a word list from an image and dictate it.
    FromImage {
        /// Path to the image file.
        image: PathBuf,
    },

    /// List available audio output devices.
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to our own logs only; override with RUST_LOG as usual.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tingxie=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        EngineConfig::from_file(path)?
    } else {
        EngineConfig::load_default()?
    };

    match cli.command {
        Command::Speak { text, voice } => {
            let player = build_player(config)?;
            let outcome = player.speak_with_voice(&text, voice.as_deref()).await?;
            report(outcome);
        }
        Command::Dictate { words } => {
            let player = build_player(config)?;
            let outcome = player.dictate(&words).await?;
            report(outcome);
        }
        Command::FromImage { image } => {
            let recognizer = HttpTextRecognizer::new(&config.ocr)?;
            let bytes = std::fs::read(&image)?;
            let text = recognizer.recognize(&bytes).await?;
            let words = tingxie::words::segment_words(&text);
            if words.is_empty() {
                println!("No words recognized in {}", image.display());
                return Ok(());
            }
            println!("Recognized {} words: {}", words.len(), words.join(" / "));

            let player = build_player(config)?;
            let outcome = player.dictate(&words).await?;
            report(outcome);
        }
        Command::Devices => {
            for name in CpalOutput::list_output_devices()? {
                println!("{name}");
            }
        }
    }

    Ok(())
}

/// Build a player on the system speakers, with Ctrl+C wired to `stop()`.
fn build_player(config: EngineConfig) -> anyhow::Result<Arc<Player>> {
    let rate = config.audio.output_sample_rate;
    let player = Arc::new(Player::with_default_output(
        config,
        Box::new(SilenceSynth::new(rate)),
    )?);

    let stopper = Arc::clone(&player);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, stopping playback");
            stopper.stop();
        }
    });

    Ok(player)
}

fn report(outcome: PlaybackOutcome) {
    match outcome {
        PlaybackOutcome::Completed => info!("playback complete"),
        PlaybackOutcome::Superseded => info!("playback stopped"),
    }
}
