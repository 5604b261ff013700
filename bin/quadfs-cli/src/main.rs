//! QuadFS CLI - Command Line Client
//!
//! Each subcommand opens one connection to the gateway, performs one
//! operation and prints the outcome. Arguments are checked before any
//! connection is made.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use quadfs_client::GatewayClient;
use quadfs_common::{FileCategory, StatusCode, Timeouts};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prefixes accepted for upload destinations
const DEST_MARKERS: [&str; 2] = ["~/S1", "~S1"];

#[derive(Parser, Debug)]
#[command(name = "quadfs-cli")]
#[command(about = "QuadFS command line client")]
#[command(version)]
struct Args {
    /// Gateway address
    #[arg(short, long, env = "QUADFS_GATEWAY", default_value = "127.0.0.1:3030")]
    gateway: SocketAddr,

    /// Timeout for each network operation, in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a local file into a gateway directory
    Uploadf {
        /// Local file
        file: PathBuf,
        /// Destination directory, e.g. ~S1/docs
        #[arg(value_parser = parse_destination)]
        dest: String,
    },
    /// Download a file into the current directory
    Downlf {
        /// File path, e.g. ~S1/docs/a.pdf
        #[arg(value_parser = parse_file_path)]
        path: String,
    },
    /// Remove a file
    Removef {
        /// File path, e.g. ~S1/src/main.c
        #[arg(value_parser = parse_file_path)]
        path: String,
    },
    /// Download the archive of every file of one type
    Downltar {
        /// File type: .c, .pdf or .txt
        #[arg(value_parser = parse_archive_tag)]
        category: FileCategory,
    },
    /// List the files in a gateway directory
    Dispfnames {
        /// Directory, e.g. ~S1/docs
        dir: String,
    },
}

fn parse_destination(s: &str) -> Result<String, String> {
    if DEST_MARKERS.iter().any(|marker| s.starts_with(marker)) {
        Ok(s.to_string())
    } else {
        Err("destination must start with ~/S1 or ~S1".to_string())
    }
}

fn parse_file_path(s: &str) -> Result<String, String> {
    match FileCategory::of_path(s) {
        Some(_) => Ok(s.to_string()),
        None => Err("only .c, .pdf, .txt and .zip files are supported".to_string()),
    }
}

fn parse_archive_tag(s: &str) -> Result<FileCategory, String> {
    match FileCategory::from_tag(s) {
        Some(category) if category != FileCategory::Archive => Ok(category),
        _ => Err("archives are available for .c, .pdf and .txt".to_string()),
    }
}

async fn upload(client: &GatewayClient, file: &Path, dest: &str) -> Result<()> {
    let size = client
        .upload_file(file, dest)
        .await
        .with_context(|| format!("upload of {} failed", file.display()))?;
    println!("Uploaded '{}' ({size} bytes) to '{dest}'", file.display());
    Ok(())
}

async fn download(client: &GatewayClient, path: &str) -> Result<()> {
    let saved = client
        .download_to(path, Path::new("."))
        .await
        .with_context(|| format!("download of {path} failed"))?;
    println!("Saved '{path}' as {}", saved.display());
    Ok(())
}

async fn remove(client: &GatewayClient, path: &str) -> Result<()> {
    let status = client
        .remove(path)
        .await
        .with_context(|| format!("remove of {path} failed"))?;
    match status {
        StatusCode::Success => {
            println!("Removed '{path}'");
            Ok(())
        }
        StatusCode::NotFound => bail!("'{path}' not found"),
        StatusCode::Denied => bail!("removal of '{path}' was denied"),
    }
}

async fn archive(client: &GatewayClient, category: FileCategory) -> Result<()> {
    let saved = client
        .archive_to(category, Path::new("."))
        .await
        .with_context(|| format!("archive of {} files failed", category.tag()))?;
    println!("Saved {} archive as {}", category.tag(), saved.display());
    Ok(())
}

async fn list(client: &GatewayClient, dir: &str) -> Result<()> {
    let names = client
        .list(dir)
        .await
        .with_context(|| format!("listing of {dir} failed"))?;
    if names.is_empty() {
        println!("No files in {dir}");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let timeout = Duration::from_secs(args.timeout);
    let client = GatewayClient::new(args.gateway).with_timeouts(Timeouts {
        connect: timeout,
        io: timeout,
    });
    debug!("using gateway {}", args.gateway);

    match args.command {
        Commands::Uploadf { file, dest } => upload(&client, &file, &dest).await,
        Commands::Downlf { path } => download(&client, &path).await,
        Commands::Removef { path } => remove(&client, &path).await,
        Commands::Downltar { category } => archive(&client, category).await,
        Commands::Dispfnames { dir } => list(&client, &dir).await,
    }
}
