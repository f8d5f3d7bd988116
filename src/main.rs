use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skeleton_osc_bridge::config::Config;
use skeleton_osc_bridge::processor::{BridgeStats, FrameProcessor, TickOutcome};
use skeleton_osc_bridge::source::{FrameSource, JsonLinesSource, RecordingPlayer};
use skeleton_osc_bridge::transport::UdpSender;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Skeleton tracking frames -> OSC over UDP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recorded session (JSON Lines). "-" or omitted reads live frames from stdin
    input: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// OSC target host
    #[arg(long)]
    host: Option<String>,

    /// OSC target port
    #[arg(long)]
    port: Option<u16>,

    /// Fast-forward through empty segments of a recording
    #[arg(long)]
    skip_empty: bool,

    /// Loop the recording from the first active frame
    #[arg(long = "loop")]
    loop_playback: bool,

    /// Normal playback speed multiplier
    #[arg(long)]
    speed: Option<f32>,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.osc.host = host.clone();
        }
        if let Some(port) = self.port {
            config.osc.port = port;
        }
        if self.skip_empty {
            config.playback.skip_empty_segments = true;
        }
        if self.loop_playback {
            config.playback.loop_playback = true;
        }
        if let Some(speed) = self.speed {
            config.playback.speed = speed;
        }
        if self.verbose {
            config.app.verbose = true;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    let default_level = if config.app.verbose { "debug" } else { "info" };
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| default_level.to_string());
    init_logging(&level)?;

    info!("Skeleton OSC bridge v{}", env!("CARGO_PKG_VERSION"));
    if args.config.exists() {
        info!("Configuration file: {}", args.config.display());
    } else {
        warn!("{} not found, using defaults", args.config.display());
    }
    info!("OSC target: {}", config.osc.target_addr());
    info!("Max packet size: {} bytes", config.osc.max_packet_size);

    let shutdown = Arc::new(AtomicBool::new(false));
    for sig in signal_hook::consts::TERM_SIGNALS {
        // 2回目のシグナルで即終了
        signal_hook::flag::register_conditional_shutdown(*sig, 1, Arc::clone(&shutdown))?;
        signal_hook::flag::register(*sig, Arc::clone(&shutdown))?;
    }

    match args.input.as_deref() {
        Some(path) if path.as_os_str() != "-" => {
            let player = RecordingPlayer::open(path)
                .with_context(|| format!("Failed to load recording {}", path.display()))?;
            info!(
                "Playback: skip_empty={}, speed={}x, fast_forward={}x, loop={}",
                config.playback.skip_empty_segments,
                config.playback.speed,
                config.playback.fast_forward_speed,
                config.playback.loop_playback
            );
            run(player, &config, &shutdown)
        }
        _ => {
            info!("Reading live frames from stdin");
            run(JsonLinesSource::stdin(), &config, &shutdown)
        }
    }
}

fn run<S: FrameSource>(source: S, config: &Config, shutdown: &AtomicBool) -> Result<()> {
    let sender = UdpSender::new(&config.osc.target_addr())
        .with_context(|| format!("Failed to open UDP socket to {}", config.osc.target_addr()))?;
    let mut processor = FrameProcessor::new(source, sender, config.osc.max_packet_size)
        .context("Packet size cannot hold the largest message")?
        .with_playback(&config.playback)
        .context("Failed to start playback")?;

    let stats_interval = Duration::from_secs_f32(config.app.stats_interval_secs);
    let mut stats_timer = Instant::now();
    let mut last_stats = BridgeStats::default();

    while !shutdown.load(Ordering::Relaxed) {
        match processor.tick() {
            Ok(TickOutcome::Frame(_)) | Ok(TickOutcome::Rewound(_)) => {}
            Ok(TickOutcome::NoFrame) => {
                if processor.is_finished() {
                    info!("No more frames");
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) if e.is_fatal() => {
                error!("{}", e);
                return Err(e.into());
            }
            Err(e) => warn!("{}", e),
        }

        // FPS表示
        let elapsed = stats_timer.elapsed();
        if elapsed >= stats_interval {
            let stats = processor.stats().clone();
            log_stats(&last_stats, &stats, elapsed);
            last_stats = stats;
            stats_timer = Instant::now();
        }
    }

    let stats = processor.stats();
    info!(
        "Shutting down: {} frames, {} packets ({} bytes), {} send failures, {} users seen",
        stats.frames,
        stats.packets_sent,
        stats.bytes_sent,
        stats.send_failures,
        processor.users().known_users()
    );
    Ok(())
}

fn log_stats(prev: &BridgeStats, now: &BridgeStats, elapsed: Duration) {
    let secs = elapsed.as_secs_f32();
    let frames = now.frames - prev.frames;
    info!(
        "FPS: {:.1} | packets {} ({} bytes) | states {} | joints {} | dropped {}",
        frames as f32 / secs,
        now.packets_sent - prev.packets_sent,
        now.bytes_sent - prev.bytes_sent,
        now.state_changes - prev.state_changes,
        now.joint_messages - prev.joint_messages,
        now.send_failures - prev.send_failures,
    );
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Invalid log level")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
