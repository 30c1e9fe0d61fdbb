//! Segue Player - demonstration entry point
//!
//! Plays a sequence of generated tones through the software render graph and
//! logs every engine event. With `--mixed-rates` the tones alternate between
//! sample rates, so the engine has to rebuild the graph between them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use segue_common::config::{OutputConfig, SegueConfig};
use segue_common::logging::init_tracing;
use segue_common::time::seconds_to_frames;
use segue_player::{
    DecoderHandle, DeviceQuery, PlaybackEngine, PlayerDelegate, PlayerEvent, ProcessingFormat,
    SoftwareGraph, ToneDecoder,
};
use tokio::signal;
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

/// Command-line arguments for segue-player
#[derive(Parser, Debug)]
#[command(name = "segue-player")]
#[command(about = "Gapless playback demonstration over a software render graph")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "SEGUE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of tones to play back to back
    #[arg(short, long, default_value = "3")]
    tones: usize,

    /// Length of each tone in seconds
    #[arg(short, long, default_value = "2.0")]
    seconds: f64,

    /// Alternate tone sample rates (44.1 kHz / 48 kHz) to force reconfiguration
    #[arg(long)]
    mixed_rates: bool,

    /// Print events as JSON lines on stdout
    #[arg(long)]
    json_events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        SegueConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!(
        "Starting Segue Player ({} tones, {} Hz output)",
        args.tones, config.output.sample_rate
    );

    let finished = Arc::new(Notify::new());
    let delegate = {
        let finished = Arc::clone(&finished);
        PlayerDelegate::new()
            .on_end_of_audio(move || finished.notify_one())
            .on_encountered_error(|e| warn!("Engine reported: {}", e))
    };

    let devices = output_devices(&config.output);
    let mut graph = SoftwareGraph::from_config(&config.output);
    match devices.default_output_device() {
        Ok(Some(device)) => {
            info!("Output device: {} ({} Hz)", device.name, device.sample_rate);
            graph = graph.with_device(&device);
        }
        Ok(None) => warn!("No output device reported; using configured format"),
        Err(e) => warn!("Failed to query output devices: {}", e),
    }

    let engine = PlaybackEngine::builder(Arc::new(graph.with_render_thread()))
        .config(config.playback.clone())
        .delegate(delegate)
        .devices(devices)
        .build()
        .context("Failed to initialize playback engine")?;
    info!("Playback engine initialized");

    let events = tokio::spawn(log_events(engine.subscribe_events(), args.json_events));

    for (index, decoder) in tone_sequence(&args, config.output.channels)
        .into_iter()
        .enumerate()
    {
        if index == 0 {
            engine
                .play_decoder(decoder)
                .context("Failed to start playback")?;
        } else {
            engine
                .enqueue_decoder(decoder)
                .context("Failed to queue tone")?;
        }
    }

    tokio::select! {
        _ = finished.notified() => info!("All tones played"),
        result = signal::ctrl_c() => {
            result.context("Failed to install Ctrl+C handler")?;
            info!("Received Ctrl+C, shutting down");
        }
    }

    engine.shutdown();
    drop(engine);
    let _ = events.await;

    info!("Shutdown complete");
    Ok(())
}

/// Device service: the host's devices with the `cpal` feature, otherwise a
/// single device matching the configured output
#[cfg(feature = "cpal")]
fn output_devices(_config: &OutputConfig) -> Arc<dyn DeviceQuery> {
    Arc::new(segue_player::audio::device::CpalDevices)
}

#[cfg(not(feature = "cpal"))]
fn output_devices(config: &OutputConfig) -> Arc<dyn DeviceQuery> {
    Arc::new(segue_player::StaticDevices::single(
        config.sample_rate,
        config.channels,
    ))
}

/// One decoder per tone, rising a whole tone each step
fn tone_sequence(args: &Args, channels: u16) -> Vec<DecoderHandle> {
    (0..args.tones)
        .map(|index| {
            let sample_rate = if args.mixed_rates && index % 2 == 1 {
                48000
            } else {
                44100
            };
            let format = ProcessingFormat::standard(sample_rate, channels);
            let frequency = 440.0 * 2f32.powf(index as f32 * 2.0 / 12.0);
            let frames = seconds_to_frames(args.seconds, sample_rate);
            DecoderHandle::new(
                ToneDecoder::sine(frequency, format, frames)
                    .named(format!("tone {} ({:.0} Hz @ {} Hz)", index + 1, frequency, sample_rate)),
            )
        })
        .collect()
}

/// Log engine events until the engine goes away
async fn log_events(mut events: broadcast::Receiver<PlayerEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize {}: {}", event.name(), e),
                    }
                } else {
                    info!("Event: {:?}", event);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event log lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
