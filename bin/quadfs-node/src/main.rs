//! QuadFS Node - storage daemon for one file category

use anyhow::{Context, Result};
use clap::Parser;
use quadfs_common::{FileCategory, NodeConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "quadfs-node")]
#[command(about = "QuadFS storage node")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/quadfs/node.toml")]
    config: String,

    /// Category this node owns (document, text or archive)
    #[arg(long, value_parser = parse_category)]
    category: Option<FileCategory>,

    /// Listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Namespace root; relative roots live under $HOME
    #[arg(long)]
    root: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    node: Option<NodeConfig>,
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

fn parse_category(value: &str) -> std::result::Result<FileCategory, String> {
    FileCategory::ALL
        .into_iter()
        .find(|c| c.to_string() == value || c.tag() == value)
        .ok_or_else(|| format!("unknown category {value:?}"))
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
    let mut node = match (config.node, args.category) {
        (Some(mut node), Some(category)) => {
            node.category = category;
            node
        }
        (Some(node), None) => node,
        (None, category) => NodeConfig::for_category(category.unwrap_or(FileCategory::Document)),
    };
    if let Some(listen) = args.listen {
        node.listen = listen;
    }
    if let Some(root) = args.root {
        node.root = root;
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
        Some(home) => node.anchor_root(Path::new(&home)),
        None => warn!("HOME is not set; relative root resolves against the working directory"),
    }

    info!("Starting QuadFS {} node", node.category);
    info!("Config file: {}", args.config);
    info!("Namespace root: {}", node.root.display());

    let listener = TcpListener::bind(node.listen)
        .await
        .with_context(|| format!("failed to bind {}", node.listen))?;

    quadfs_node::run(&node, listener, async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    })
    .await?;

    info!("Node shut down gracefully");
    Ok(())
}
