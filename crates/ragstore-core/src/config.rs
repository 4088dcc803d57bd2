//! Configuration for ragstore vector stores.
//!
//! Provides the [`StoreConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit config path argument
//! 2. `RAGSTORE_CONFIG` environment variable
//! 3. XDG default: `~/.config/ragstore/config.toml`
//! 4. Built-in defaults
//!
//! `RAGSTORE_*` environment variables are layered over whichever file
//! was found.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque key/value options forwarded verbatim to providers and backends.
pub type Options = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Embedding mode
// ============================================================================

/// Identifier of the in-process embedding routine used on the direct path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingMode {
    /// Local transformer models (sentence-transformers compatible).
    #[serde(rename = "sentence-transformers")]
    SentenceTransformers,
    /// Apple MLX models.
    #[serde(rename = "mlx")]
    Mlx,
    /// OpenAI-compatible `/embeddings` endpoint.
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini embeddings.
    #[serde(rename = "gemini")]
    Gemini,
    /// Ollama `/api/embed` endpoint.
    #[serde(rename = "ollama")]
    Ollama,
    /// Local ONNX models via fastembed.
    #[serde(rename = "fastembed")]
    FastEmbed,
    /// Deterministic vectors for tests.
    #[serde(rename = "mock")]
    Mock,
}

impl EmbeddingMode {
    /// All known modes, in declaration order.
    pub const ALL: [EmbeddingMode; 7] = [
        Self::SentenceTransformers,
        Self::Mlx,
        Self::OpenAi,
        Self::Gemini,
        Self::Ollama,
        Self::FastEmbed,
        Self::Mock,
    ];

    /// The canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentenceTransformers => "sentence-transformers",
            Self::Mlx => "mlx",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::FastEmbed => "fastembed",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                Error::config(format!(
                    "Unknown embedding mode '{s}'. Supported: {}",
                    known.join(", ")
                ))
            })
    }
}

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Location of the index on disk.
    pub index_path: PathBuf,

    /// Registered backend name (e.g. "flat", "lancedb").
    pub backend: String,

    /// Embedding model name passed to providers and the server.
    pub embedding_model: String,

    /// Direct-path embedding routine.
    pub embedding_mode: EmbeddingMode,

    /// Result count used when a search does not specify one.
    pub default_top_k: usize,

    /// Compute ingestion embeddings through the embedding server.
    pub build_use_server: bool,

    /// Compute query embeddings through the embedding server.
    pub query_use_server: bool,

    /// Embedding server connection settings.
    pub server: ServerConfig,

    /// Options forwarded to the embedding provider.
    pub provider_options: Options,

    /// Options forwarded to the backend factory, builder and searcher.
    pub backend_options: Options,
}

/// Embedding server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host the embedding server listens on.
    pub host: String,

    /// Port of the embedding server; required for server-mode calls.
    pub port: Option<u16>,

    /// Bound on waiting for a reply, in milliseconds.
    pub timeout_ms: u64,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("ragstore.index"),
            backend: "flat".to_string(),
            embedding_model: "mock".to_string(),
            embedding_mode: EmbeddingMode::Mock,
            default_top_k: 5,
            build_use_server: false,
            query_use_server: true,
            server: ServerConfig::default(),
            provider_options: Options::new(),
            backend_options: Options::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    /// The reply timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================================
// Builder-style setters
// ============================================================================

impl StoreConfig {
    /// Create a config for the given index path and backend.
    pub fn new(index_path: impl Into<PathBuf>, backend: impl Into<String>) -> Self {
        Self {
            index_path: index_path.into(),
            backend: backend.into(),
            ..Default::default()
        }
    }

    /// Set the embedding model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the embedding mode.
    pub fn with_mode(mut self, mode: EmbeddingMode) -> Self {
        self.embedding_mode = mode;
        self
    }

    /// Set the embedding server port.
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server.port = Some(port);
        self
    }

    /// Set the embedding server reply timeout.
    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Choose whether query embeddings go through the server.
    pub fn with_query_server(mut self, enabled: bool) -> Self {
        self.query_use_server = enabled;
        self
    }

    /// Choose whether ingestion embeddings go through the server.
    pub fn with_build_server(mut self, enabled: bool) -> Self {
        self.build_use_server = enabled;
        self
    }

    /// Set the default result count.
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    /// Add a backend option.
    pub fn with_backend_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.backend_options.insert(key.into(), value.into());
        self
    }

    /// Add a provider option.
    pub fn with_provider_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl StoreConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                log::debug!("loading store config from {}", path.display());
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("RAGSTORE");
        env_opts.add_section("server");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit argument, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("RAGSTORE_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ragstore").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
