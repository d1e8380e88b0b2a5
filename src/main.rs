use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley::{Config, RelayEvent, SignalingRelay, SignalingServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "WebRTC signaling relay server", long_about = None)]
struct Cli {
    /// Config file path (defaults to ~/.parley/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path).context("Failed to load config")?,
        None => Config::load()?,
    };
    let addr = cli.addr.unwrap_or_else(|| config.server.bind_address.clone());

    let relay = Arc::new(SignalingRelay::new(config.relay.clone()));

    // Presence logging for operators; real room bookkeeping belongs to the
    // application embedding the relay.
    let mut events = relay.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RelayEvent::Connection { client } => {
                    info!("peer {} joined (room: {})", client.id, client.room);
                }
                RelayEvent::Disconnect { client } => {
                    info!("peer {} left (room: {})", client.id, client.room);
                }
                RelayEvent::Error { message } => {
                    info!("relay error: {}", message);
                }
                RelayEvent::Message { .. } => {}
            }
        }
    });

    println!("Starting parley signaling relay on {}", addr);
    println!("Signaling endpoint: ws://{}/?id=<id>&token=<token>&key=<room>", addr);
    println!("Concurrent client limit: {}", config.relay.concurrent_limit);

    SignalingServer::new(relay, addr).run().await
}
