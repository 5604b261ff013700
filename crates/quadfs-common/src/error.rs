//! Error types for QuadFS
//!
//! Failures are carried as typed values internally and only collapsed into
//! wire-compatible sentinels ([`StatusCode`], negative size headers) at the
//! connection boundary.

use crate::types::StatusCode;
use std::io;
use thiserror::Error;

/// Common result type for QuadFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for QuadFS
#[derive(Debug, Error)]
pub enum Error {
    // Routing errors
    #[error("unsupported file category: {0}")]
    UnsupportedCategory(String),

    #[error("path escapes namespace root: {0}")]
    PathEscapesRoot(String),

    // Namespace errors
    #[error("not found: {0}")]
    NotFound(String),

    #[error("denied: {0}")]
    Denied(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Transport errors
    #[error("transport failure talking to {backend}: {message}")]
    Transport { backend: String, message: String },

    #[error("timed out during {operation}")]
    Timeout { operation: String },

    #[error("short transfer: declared {expected} bytes, moved {actual}")]
    ShortTransfer { expected: u64, actual: u64 },

    // Protocol errors
    #[error("field {field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an unsupported category error
    pub fn unsupported(path: impl Into<String>) -> Self {
        Self::UnsupportedCategory(path.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a transport error for the given backend
    pub fn transport(backend: impl ToString, message: impl ToString) -> Self {
        Self::Transport {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Classify a filesystem error against the path it concerned
    #[must_use]
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.into()),
            io::ErrorKind::PermissionDenied => Self::Denied(path.into()),
            _ => Self::Io(err),
        }
    }

    /// Check if this is a transport-class failure (backend unreachable,
    /// stalled or hung up mid-stream)
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::ShortTransfer { .. }
        )
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Get the wire status code for this failure.
    ///
    /// Everything other than a missing path is reported as `Denied`, which
    /// keeps existing clients working while the typed error is logged.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NotFound,
            _ => StatusCode::Denied,
        }
    }
}
