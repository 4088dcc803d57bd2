//! Error types for ragstore operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all ragstore crates. Uses `thiserror` for derive macros.
//!
//! The variants are deliberately fine-grained: callers decide whether to
//! retry (a slow-loading embedding server) or fail fast (no server at all)
//! by inspecting the variant, never by matching on message text.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in ragstore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameters detected before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding server could not be reached (refused, reset, ...).
    #[error("Transport error talking to {addr}: {source}")]
    Transport {
        /// Address of the remote endpoint.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// A reply was received but is structurally invalid.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// No reply arrived within the configured bound.
    #[error("Timed out after {}ms waiting for {addr}", waited.as_millis())]
    Timeout {
        /// Address of the remote endpoint.
        addr: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// A failure reported by a pluggable ANN backend.
    #[error("Backend '{backend}' failed: {message}")]
    Backend {
        /// Name of the backend that failed.
        backend: String,
        /// Engine-specific failure description.
        message: String,
    },

    /// The store cannot accept writes in its current state.
    #[error("Read-only: {0}")]
    ReadOnly(String),

    /// An embedding provider failed on the direct path.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific file.
    #[error("I/O error at {}: {source}", path.display())]
    IoWithPath {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error for the given address.
    pub fn transport(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            addr: addr.into(),
            source,
        }
    }

    /// Create a protocol violation error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(addr: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            addr: addr.into(),
            waited,
        }
    }

    /// Create a backend error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a read-only error.
    pub fn read_only(msg: impl Into<String>) -> Self {
        Self::ReadOnly(msg.into())
    }

    /// Create an embedding error.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Wrap an I/O error with the path that caused it.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for configuration errors.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// True for connection-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// True for protocol violations.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }

    /// True when a reply did not arrive in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for failures raised by an ANN backend.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only timeouts qualify: a server that is still warming up may answer
    /// the next attempt, whereas a refused connection means nothing is
    /// listening and a protocol violation will repeat deterministically.
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias using ragstore's Error type.
pub type Result<T> = std::result::Result<T, Error>;
