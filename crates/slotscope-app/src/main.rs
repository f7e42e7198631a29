//! Slotscope - MITM capture proxy for slot-game traffic analysis.
//!
//! Runs one capture session: intercepts the client's HTTP(S)/websocket
//! traffic, correlates each exchange with a throttled screenshot, and
//! streams the records to the configured broker until interrupted.

mod broker;
mod capture;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;

use slotscope_core::{CaptureConfig, CaptureSession, SessionDescriptor};
use slotscope_proxy::{CaManager, HudsuckerAdapter, DEFAULT_PROXY_PORT};

use crate::broker::HttpBroker;
use crate::capture::DisplayCapturer;

/// Slotscope - capture proxy for slot-game traffic analysis
#[derive(Parser, Debug)]
#[command(name = "slotscope", version, about)]
struct Args {
    /// Casino the session captures
    #[arg(long)]
    casino: String,

    /// Game being captured
    #[arg(long)]
    game: String,

    /// Session id (derived from casino, game, and start time when omitted)
    #[arg(long)]
    session_id: Option<String>,

    /// Proxy listen host
    #[arg(long, default_value = "127.0.0.1")]
    listen_host: IpAddr,

    /// Proxy listen port
    #[arg(long, default_value_t = DEFAULT_PROXY_PORT)]
    listen_port: u16,

    /// CA certificate directory (defaults to the platform data dir)
    #[arg(long)]
    cert_dir: Option<PathBuf>,

    /// Screenshot root directory (defaults to the platform data dir)
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Minimum gap between screenshots, in milliseconds
    #[arg(long, default_value_t = 500)]
    throttle_ms: u64,

    /// Capture queue capacity; the oldest record is evicted on overflow
    #[arg(long, default_value_t = 1000)]
    max_queue_depth: usize,

    /// Broker endpoint capture records are POSTed to
    #[arg(long, default_value = "http://127.0.0.1:8799")]
    broker_url: String,

    /// Broker topic
    #[arg(long, default_value = "captures")]
    topic: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(args: &Args) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("slotscope={},warn", args.log_level)));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Platform data directory for CA material and screenshots.
fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "slotscope", "Slotscope").map(|dirs| dirs.data_dir().to_path_buf())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let data = data_dir();
    let cert_dir = args
        .cert_dir
        .clone()
        .or_else(|| data.as_ref().map(|d| d.join("ca")))
        .context("no certificate directory available")?;
    let screenshot_root = args
        .screenshot_dir
        .clone()
        .or_else(|| data.as_ref().map(|d| d.join("screenshots")))
        .context("no screenshot directory available")?;

    let descriptor =
        SessionDescriptor::new(args.casino.clone(), args.game.clone(), args.session_id.clone())?;

    let config = CaptureConfig {
        screenshot_root,
        throttle: Duration::from_millis(args.throttle_ms),
        max_queue_depth: args.max_queue_depth,
        topic: args.topic.clone(),
        ..CaptureConfig::default()
    };

    let addr = SocketAddr::new(args.listen_host, args.listen_port);
    let adapter = HudsuckerAdapter::new(addr, CaManager::new(&cert_dir), config.shutdown_grace);
    let ca_cert_path = adapter.ca_cert_path();

    let session = CaptureSession::new(
        descriptor,
        config,
        Box::new(adapter),
        Arc::new(DisplayCapturer),
        Arc::new(HttpBroker::new(args.broker_url.clone())),
    )
    .context("invalid capture configuration")?;

    session
        .start()
        .await
        .context("failed to start capture session")?;

    tracing::info!(
        session_id = %session.descriptor().session_id(),
        proxy = %addr,
        "capture session running, press Ctrl-C to stop"
    );
    tracing::info!(
        ca_cert = %ca_cert_path.display(),
        "install this CA certificate in the client's trust store"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    session.stop().await;

    let failed = session.failed_captures();
    if !failed.is_empty() {
        tracing::warn!(
            count = failed.len(),
            "records failed delivery and are held for manual resubmission"
        );
    }
    if session.evictions() > 0 {
        tracing::warn!(count = session.evictions(), "records were evicted from a full queue");
    }

    Ok(())
}
