//! QuadFS Gateway - client-facing routing node

use anyhow::{Context, Result};
use clap::Parser;
use quadfs_common::GatewayConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "quadfs-gateway")]
#[command(about = "QuadFS client-facing gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/quadfs/gateway.toml")]
    config: String,

    /// Listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Local namespace root; relative roots live under $HOME
    #[arg(long)]
    root: Option<PathBuf>,

    /// Relay chunk size in bytes
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    gateway: GatewayConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
struct LoggingConfig {
    #[serde(default = "default_log_level")]
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config file if it exists
    let config: Config = if Path::new(&args.config).exists() {
        let config_str = std::fs::read_to_string(&args.config)?;
        toml::from_str(&config_str).with_context(|| format!("invalid config {}", args.config))?
    } else {
        Config::default()
    };

    // Merge CLI args with config file (CLI takes precedence)
    let mut gateway = config.gateway;
    if let Some(listen) = args.listen {
        gateway.listen = listen;
    }
    if let Some(root) = args.root {
        gateway.root = root;
    }
    if let Some(chunk_size) = args.chunk_size {
        gateway.chunk_size = chunk_size;
    }
    let log_level = if args.log_level == "info" {
        config.logging.level
    } else {
        args.log_level
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match std::env::var_os("HOME") {
        Some(home) => gateway.anchor_root(Path::new(&home)),
        None => warn!("HOME is not set; relative root resolves against the working directory"),
    }

    info!("Starting QuadFS gateway");
    info!("Config file: {}", args.config);
    info!("Namespace root: {}", gateway.root.display());
    info!("Chunk size: {} bytes", gateway.chunk_size);

    let listener = TcpListener::bind(gateway.listen)
        .await
        .with_context(|| format!("failed to bind {}", gateway.listen))?;

    quadfs_gateway::run(&gateway, listener, async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    })
    .await?;

    info!("Gateway shut down gracefully");
    Ok(())
}
