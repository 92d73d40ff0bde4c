//! p2p-signal-relay
//!
//! Signaling relay for a peer-to-peer chat and calling app. Routes chat
//! messages and WebRTC call signals between identified clients over Iroh P2P
//! connections and wakes offline recipients through push notifications.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use server::config::ServerConfig;
use server::network::RelayServer;
use server::{RelayCore, RelayStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "p2p-signal-relay")]
#[command(
    author,
    version,
    about = "P2P Signal Relay - presence and message routing for P2P chat and calls"
)]
#[command(long_about = "
Real-time signaling relay for a peer-to-peer encrypted chat and calling app.
Delivers chat messages and call signals to connected clients and falls back
to push notifications for offline recipients.

EXAMPLES:
    # Run with default config
    p2p-signal-relay

    # Run with custom config
    p2p-signal-relay --config /path/to/server.toml

    # Run with debug logging
    p2p-signal-relay --log-level debug

CONFIGURATION:
    The relay looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/p2p-signal-relay/server.toml
    3. /etc/p2p-signal-relay/server.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ServerConfig::default();
        let path = ServerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        ServerConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ServerConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("p2p-signal-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    run(config).await
}

async fn run(config: ServerConfig) -> Result<()> {
    let gateway = config
        .push
        .build_gateway()
        .context("Failed to initialize push gateway")?;
    info!("Push gateway: {}", gateway.name());

    let core = Arc::new(RelayCore::new(&config, gateway));
    let server = RelayServer::new(&config, core.clone())
        .await
        .context("Failed to initialize relay endpoint")?;

    info!("Relay EndpointId: {}", server.endpoint_id());
    info!("Listening on: {:?}", server.local_addrs());
    info!("Press Ctrl+C to shutdown");

    let stats_task = (config.server.stats_interval_secs > 0).then(|| {
        let core = core.clone();
        let interval = Duration::from_secs(config.server.stats_interval_secs);
        tokio::spawn(async move { log_stats_periodically(&core, interval).await })
    });

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {:#}", e);
            }
        }
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => error!("Error waiting for Ctrl+C: {}", e),
            }
        }
    }

    if let Some(task) = stats_task {
        task.abort();
    }
    server.shutdown().await;

    log_stats(core.stats(), core.registry().online_count());
    info!("Relay shutdown complete");
    Ok(())
}

async fn log_stats_periodically(core: &RelayCore, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        log_stats(core.stats(), core.registry().online_count());
    }
}

fn log_stats(stats: &RelayStats, online: usize) {
    info!("Relay stats: online={}, {}", online, stats.snapshot());
}
