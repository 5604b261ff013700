//! Configuration types for QuadFS
//!
//! Every component receives its configuration as an explicit value at
//! construction time. The binaries build these from a TOML file and command
//! line flags; nothing here reads the process environment.

use crate::error::{Error, Result};
use crate::types::{FileCategory, RoutingTable};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default relay chunk size (4 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Gateway configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Client-facing listen address
    pub listen: SocketAddr,
    /// Root of the locally owned namespace. Relative roots are anchored
    /// with [`GatewayConfig::anchor_root`].
    pub root: PathBuf,
    /// Shorthand markers that expand to the namespace root
    pub markers: Vec<String>,
    /// Relay chunk size in bytes
    pub chunk_size: usize,
    /// Largest accepted upload
    pub max_upload_size: u64,
    /// Backend connect timeout (milliseconds)
    pub connect_timeout_ms: u64,
    /// Per read/write timeout on any connection (milliseconds)
    pub io_timeout_ms: u64,
    /// Storage nodes, one per remote category
    pub backends: Vec<BackendConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3030)),
            root: PathBuf::from("S1"),
            markers: vec!["~S1".to_string(), "~/S1".to_string()],
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: 1024 * 1024 * 1024, // 1 GB
            connect_timeout_ms: 5_000,
            io_timeout_ms: 30_000,
            backends: vec![
                BackendConfig::local(FileCategory::Document, 3032, true),
                BackendConfig::local(FileCategory::Text, 3034, true),
                BackendConfig::local(FileCategory::Archive, 3036, false),
            ],
        }
    }
}

impl GatewayConfig {
    /// Anchor a relative root under `base` (usually the user's home directory)
    pub fn anchor_root(&mut self, base: &Path) {
        if self.root.is_relative() {
            self.root = base.join(&self.root);
        }
    }

    /// Timeouts applied to backend and client I/O
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            io: Duration::from_millis(self.io_timeout_ms),
        }
    }

    /// Build the routing table; the gateway always serves Source locally
    pub fn routing_table(&self) -> Result<RoutingTable> {
        RoutingTable::new(FileCategory::Source, &self.backends)
    }

    /// Check the configuration for values no component can run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be non-zero".into()));
        }
        if self.io_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(Error::Configuration("timeouts must be non-zero".into()));
        }
        if self.markers.iter().any(|m| !m.starts_with('~')) {
            return Err(Error::Configuration(
                "root markers must start with '~'".into(),
            ));
        }
        self.routing_table().map(|_| ())
    }
}

/// A storage node the gateway delegates to
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Category the node owns
    pub category: FileCategory,
    /// Node address
    pub address: SocketAddr,
    /// Whether the node offers archive downloads
    #[serde(default = "default_archive")]
    pub archive: bool,
}

impl BackendConfig {
    fn local(category: FileCategory, port: u16, archive: bool) -> Self {
        Self {
            category,
            address: SocketAddr::from(([127, 0, 0, 1], port)),
            archive,
        }
    }
}

const fn default_archive() -> bool {
    true
}

/// Storage node configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Listen address
    pub listen: SocketAddr,
    /// Root of the node's private namespace
    pub root: PathBuf,
    /// Category this node owns
    pub category: FileCategory,
    /// Whether archive downloads are offered
    pub archive: bool,
    /// Chunk size used when streaming payloads
    pub chunk_size: usize,
    /// Largest accepted upload
    pub max_upload_size: u64,
    /// Per read/write timeout (milliseconds)
    pub io_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_category(FileCategory::Document)
    }
}

impl NodeConfig {
    /// Defaults for the node owning `category`, matching the gateway's
    /// default backend table
    #[must_use]
    pub fn for_category(category: FileCategory) -> Self {
        let (suffix, port) = match category {
            FileCategory::Source => ("S1", 3030),
            FileCategory::Document => ("S2", 3032),
            FileCategory::Text => ("S3", 3034),
            FileCategory::Archive => ("S4", 3036),
        };
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], port)),
            root: PathBuf::from(suffix),
            category,
            archive: category != FileCategory::Archive,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: 1024 * 1024 * 1024, // 1 GB
            io_timeout_ms: 30_000,
        }
    }

    /// Anchor a relative root under `base`
    pub fn anchor_root(&mut self, base: &Path) {
        if self.root.is_relative() {
            self.root = base.join(&self.root);
        }
    }

    /// I/O timeout as a duration
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Check the configuration for values the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be non-zero".into()));
        }
        if self.io_timeout_ms == 0 {
            return Err(Error::Configuration("io_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }
}

/// Connect and I/O deadlines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        GatewayConfig::default().timeouts()
    }
}
