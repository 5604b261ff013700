//! QuadFS Storage - Local namespace persistence
//!
//! Every node (the gateway for its own category, and each storage node)
//! keeps its files under a private root. This crate implements the
//! operations on that root, keyed by validated [`RelativePath`]s:
//!
//! - Atomic writes (temporary file + rename)
//! - Streaming reads
//! - Removal with precise NotFound/Denied classification
//! - Per-category directory listing
//! - Archive snapshots written in-process with the `tar` crate
//!
//! [`RelativePath`]: quadfs_common::RelativePath

pub mod archive;
pub mod store;

pub use archive::ArchiveFile;
pub use store::{LocalStore, PendingWrite};
