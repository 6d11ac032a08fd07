//! Voice Notes - record voice notes from the microphone and play them back.
//!
//! A terminal front end over a small session engine: one recording and one
//! playback at a time, each owning an exclusive device handle, with pause and
//! resume, seeking and a live input level meter.

mod config;
mod console;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use config::{AppConfig, Command};
use voice_notes::audio::CpalBackend;
use voice_notes::session::SessionManager;

/// Resolve on SIGTERM; never resolves where SIGTERM does not exist.
async fn sigterm() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                return;
            }
            Err(e) => error!("Failed to register SIGTERM handler: {}", e),
        }
    }
    std::future::pending::<()>().await;
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = sigterm() => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::parse();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🎙️ Voice Notes v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }
    config.log_config();

    let backend = Arc::new(CpalBackend::new(config.sample_rate, config.pause_supported()));
    let manager = SessionManager::new(backend, config.scratch_dir.clone());
    let interval = Duration::from_millis(config.meter_interval_ms);

    let result = match config.command {
        Command::Record { name, max_seconds } => console::record(&manager, name, max_seconds, interval, wait_for_shutdown()).await.map(|_| ()),
        Command::Play { file } => console::play(&manager, file, interval, wait_for_shutdown()).await.map(|_| ()),
    };

    // Releases anything left open by an early error
    manager.shutdown().await;

    if result.is_ok() {
        info!("✅ Voice notes stopped");
    }
    result
}
