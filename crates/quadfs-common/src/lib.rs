//! QuadFS Common - Shared types and utilities
//!
//! This crate provides the file category model, the routing table,
//! validated namespace paths, configuration types and the error taxonomy
//! used across all QuadFS components.

pub mod config;
pub mod error;
pub mod path;
pub mod types;

pub use config::{BackendConfig, GatewayConfig, NodeConfig, Timeouts};
pub use error::{Error, Result};
pub use path::RelativePath;
pub use types::*;
