//! Reel video playback (reel-vp) - demo entry point
//!
//! Runs the playback engine against the reference collaborators: a looping
//! test-pattern timeline, a recording surface and a null audio pipeline.
//! Halfway through the run the timeline is hot-swapped, then the pipeline
//! statistics are printed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use reel_common::config::ConfigResolver;
use reel_vp::sim::{
    EventRecorder, LoopingTimeline, NullAudio, RecordingSurface, TestPatternCompositor,
};
use reel_vp::{EngineConfig, InitOptions, PlaybackManager};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for reel-vp
#[derive(Parser, Debug)]
#[command(name = "reel-vp")]
#[command(about = "Real-time video playback scheduling engine (demo run)")]
#[command(version)]
struct Args {
    /// Config file (overrides REEL_CONFIG and the platform config file)
    #[arg(short, long, env = "REEL_CONFIG")]
    config: Option<PathBuf>,

    /// Stop generating after this many frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Number of presentation buffers
    #[arg(short, long)]
    buffers: Option<usize>,

    /// Present every second clock tick
    #[arg(long)]
    half_rate: bool,

    /// Upper bound on the run time
    #[arg(short, long, default_value = "10")]
    seconds: u64,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let toml = ConfigResolver::new("reel")
        .load(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!(
        "reel_vp={level},reel_common={level}",
        level = toml.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = EngineConfig::from_toml(&toml).context("Invalid configuration")?;
    if let Some(frames) = args.frames {
        config.frame_limit = Some(frames);
    }
    if let Some(buffers) = args.buffers {
        config.buffers.count = buffers;
    }
    if args.half_rate {
        config.full_rate = false;
    }
    let frame_limit = config.frame_limit.unwrap_or(300);
    config.frame_limit = Some(frame_limit);

    info!(
        "Starting reel-vp: {} frames, {} buffers, tick {:?}",
        frame_limit, config.buffers.count, config.tick_interval
    );

    let surface = Arc::new(RecordingSurface::new());
    let audio = Arc::new(NullAudio::new());
    let recorder = Arc::new(EventRecorder::new());
    let (width, height) = (toml.engine.width, toml.engine.height);

    let manager = PlaybackManager::init(
        surface.clone(),
        width,
        height,
        InitOptions::new(config, Arc::new(TestPatternCompositor::new())).with_audio(audio.clone()),
    )
    .context("Failed to initialize playback manager")?;
    manager.add_listener(recorder.clone());

    manager.start_playing().context("Failed to start playback")?;
    manager.set_timeline(Some(LoopingTimeline::shared("intro", 100)), 0);

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut switched = false;
    while manager.frame_count() < frame_limit && Instant::now() < deadline {
        if !manager.is_running() {
            break;
        }
        if !switched && manager.frame_count() >= frame_limit / 2 {
            manager.set_timeline(Some(LoopingTimeline::shared("feature", 240)), 0);
            switched = true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    // Let the displayer drain what is already rendered
    std::thread::sleep(manager.clock().time_per_unit(manager.config().rate_scale()) * 4);
    manager.stop_playing().ok();
    manager.shutdown(true).context("Shutdown failed")?;

    let stats = manager.stats();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to encode statistics")?
        );
    } else {
        println!("buffers:           {} x {}", manager.buffer_count(), manager.buffer_format());
        println!("frames generated:  {}", stats.frames_generated);
        println!("frames presented:  {}", stats.frames_presented);
        println!("frames dropped:    {}", stats.frames_dropped);
        println!("render failures:   {}", stats.render_failures);
        println!("timeline switches: {}", stats.timeline_switches);
        println!("surface presents:  {}", surface.presented_count());
        println!("listener events:   {}", recorder.events().len());
    }
    if let Some(error) = manager.last_error() {
        anyhow::bail!("playback stopped: {}", error);
    }

    info!("reel-vp finished");
    Ok(())
}
