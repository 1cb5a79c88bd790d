//! MJPEG HTTP streaming CLI application

// Use jemalloc for better memory management (optional feature)
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Result;
use clap::Parser;
use mjpeg_streamer::config::Config;
use mjpeg_streamer::server::{self, AppState};
use mjpeg_streamer::{FrameHolder, PatternSource, StreamCounters, StreamMode, StreamerStats};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mjpeg-streamer")]
#[command(about = "Motion-JPEG over HTTP with on-the-fly JPEG encoding")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Stream re-encoded frames with chunked framing
    #[arg(long)]
    chunked: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    info!("MJPEG streamer starting");

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            Config::load(path)?
        }
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.chunked {
        config.stream.mode = StreamMode::Chunked;
    }
    config.validate()?;

    info!(
        port = %config.server.port,
        mode = ?config.stream.mode,
        quality = %config.stream.quality,
        source_enabled = %config.source.enabled,
        "Configuration loaded"
    );

    let holder = Arc::new(FrameHolder::new());
    let counters = Arc::new(StreamCounters::new());

    let mut source = PatternSource::new(config.source.clone(), Arc::clone(&holder));
    if config.source.enabled {
        source.start().await?;
    } else {
        warn!("Test-pattern source disabled; streams fail until a frame is published");
    }

    let state = AppState::new(&config, holder, Arc::clone(&counters));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    };

    // Wait for Ctrl+C
    info!("Streaming started, press Ctrl+C to stop");
    let started = Instant::now();
    server::run_server(&config, state, shutdown).await?;

    source.stop().await;

    let stats = counters.snapshot();
    let uptime = started.elapsed().as_secs_f64();
    let baseline = StreamerStats::default();
    info!(
        frames = %stats.frames_sent,
        encoded = %stats.frames_encoded,
        bytes = %stats.bytes_sent,
        errors = %(stats.encode_errors + stats.write_errors),
        error_rate = %format!("{:.3}", stats.error_rate()),
        fps = %format!("{:.1}", stats.calculate_fps(&baseline, uptime)),
        kbps = %format!("{:.1}", stats.calculate_bitrate_kbps(&baseline, uptime)),
        "MJPEG streamer stopped"
    );

    Ok(())
}
