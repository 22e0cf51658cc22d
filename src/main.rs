// songstream - play one audio file to the end
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing::info;

use songstream::audio::{
    AudioDevice, ChannelNotifier, CpalDevice, MemoryDevice, Player, SymphoniaProvider,
};
use songstream::logging::init_logging;
use songstream::PlaybackSettings;

/// Command-line arguments for songstream
#[derive(Parser, Debug)]
#[command(name = "songstream")]
#[command(about = "Stream a compressed audio file to the default output device")]
#[command(version)]
struct Args {
    /// Audio file to play
    file: PathBuf,

    /// Playback gain, 0.0-1.0
    #[arg(long)]
    volume: Option<f32>,

    /// JSON settings file
    #[arg(long, env = "SONGSTREAM_SETTINGS")]
    settings: Option<PathBuf>,

    /// Decode and stream without opening an audio device
    #[arg(long)]
    null_output: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = match args.settings.as_deref() {
        Some(path) => PlaybackSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => PlaybackSettings::default(),
    };

    let device: Arc<dyn AudioDevice> = if args.null_output {
        Arc::new(MemoryDevice::new())
    } else {
        Arc::new(CpalDevice::new().context("Failed to open audio output")?)
    };

    let mut player = Player::open(&args.file, Arc::new(SymphoniaProvider), device, settings)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let (notifier, finished) = ChannelNotifier::new();
    player.set_notifier(Arc::new(notifier));

    info!(
        "Playing {} ({} ms)",
        player.name(),
        player.track().duration_ms()
    );
    let session = player.play()?;
    // Gain belongs to the session's source, so it goes on after play
    if let Some(volume) = args.volume {
        player.set_volume(volume)?;
    }

    loop {
        match finished.recv_timeout(Duration::from_millis(200)) {
            Ok(done) if done == session => break,
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) if player.is_streaming() => continue,
            Err(_) => {
                if let Some(e) = player.take_stream_error() {
                    player.stop()?;
                    bail!("Playback failed: {}", e);
                }
                break;
            }
        }
    }

    player.stop()?;
    info!("Done");
    Ok(())
}
