//! Watchdog CLI
//!
//! Command-line interface for the HTTP endpoint change monitoring service.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use watchdog::{load_config, Config, WatchdogBuilder};

#[derive(Parser)]
#[command(name = "watchdog")]
#[command(about = "Polls HTTP endpoints and alerts on meaningful response changes")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between poll cycles (overrides config file)
    #[arg(long)]
    poll_interval_seconds: Option<u64>,

    /// Dashboard port (overrides config file)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, poll_interval_seconds={:?}, dashboard_port={:?}, log_level={:?}",
        args.config,
        args.poll_interval_seconds,
        args.dashboard_port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    config.resolve_secrets()?;

    if let Some(interval) = args.poll_interval_seconds {
        config.poller.interval_seconds = interval;
    }
    if let Some(dashboard_port) = args.dashboard_port {
        config.dashboard.port = dashboard_port;
    }

    tracing::info!("Starting watchdog service");
    tracing::debug!(
        "Endpoints: {}, interval: {}s, max concurrent fetches: {}",
        config.endpoints.len(),
        config.poller.interval_seconds,
        config.poller.max_concurrent_fetches
    );

    WatchdogBuilder::new(config).build().await?.start().await?;

    Ok(())
}
