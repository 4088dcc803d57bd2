//! Embedding provider gateway.
//!
//! One entry point, [`EmbeddingGateway::compute`], turns a batch of text
//! chunks into an [`EmbeddingMatrix`] by one of two paths:
//!
//! ```text
//!                     ┌─ use_server = false ─> provider table[mode] ─> embed_batch
//! EmbeddingRequest ───┤
//!                     └─ use_server = true ──> EmbeddingServerClient ─> sidecar
//! ```
//!
//! Either way the result has exactly one row per chunk, or the call fails.
//! Nothing is cached: every call recomputes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ragstore_core::{EmbeddingMode, Error, Options, Result, ServerConfig};

use crate::embedding::{EmbedContext, EmbeddingProvider, MockEmbeddingProvider};
use crate::http::{OllamaEmbeddingProvider, OpenAiEmbeddingProvider};
use crate::matrix::EmbeddingMatrix;
use crate::protocol::{DEFAULT_TIMEOUT, EmbeddingServerClient};

/// Dimension of the vectors produced by the default `mock` provider.
pub const DEFAULT_MOCK_DIMENSION: usize = 384;

/// One embedding computation.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingRequest<'a> {
    /// Texts to embed, in order.
    pub chunks: &'a [&'a str],
    /// Model name forwarded to the provider or server.
    pub model_name: &'a str,
    /// Direct-path provider selector.
    pub mode: EmbeddingMode,
    /// Route through the embedding server instead of a provider.
    pub use_server: bool,
    /// True for ingestion, false for queries.
    pub is_build: bool,
    /// Opaque options for the provider or server.
    pub provider_options: Option<&'a Options>,
    /// Embedding server port; required when `use_server` is set.
    pub port: Option<u16>,
}

impl<'a> EmbeddingRequest<'a> {
    /// A direct-path query request.
    pub fn new(chunks: &'a [&'a str], model_name: &'a str, mode: EmbeddingMode) -> Self {
        Self {
            chunks,
            model_name,
            mode,
            use_server: false,
            is_build: false,
            provider_options: None,
            port: None,
        }
    }

    /// Route through the embedding server on `port`.
    pub fn via_server(mut self, use_server: bool, port: Option<u16>) -> Self {
        self.use_server = use_server;
        self.port = port;
        self
    }

    /// Mark the request as part of index building.
    pub fn for_build(mut self, is_build: bool) -> Self {
        self.is_build = is_build;
        self
    }

    /// Attach provider options.
    pub fn with_options(mut self, options: Option<&'a Options>) -> Self {
        self.provider_options = options;
        self
    }
}

/// Dispatches embedding requests to providers or the embedding server.
pub struct EmbeddingGateway {
    providers: HashMap<EmbeddingMode, Arc<dyn EmbeddingProvider>>,
    host: String,
    timeout: Duration,
}

impl EmbeddingGateway {
    /// A gateway with no direct-path providers, talking to a server on
    /// `127.0.0.1`.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            host: ServerConfig::default().host,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A gateway using `server` for the server path and the default
    /// providers for the direct path.
    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new()
            .with_server(server.host.clone(), server.timeout())
            .with_default_providers()
    }

    /// Register the providers that need no local model: `mock`, `openai`
    /// and `ollama`. Model-backed providers such as fastembed are added
    /// explicitly with [`with_provider`](Self::with_provider).
    pub fn with_default_providers(self) -> Self {
        self.with_provider(
            EmbeddingMode::Mock,
            Arc::new(MockEmbeddingProvider::new(DEFAULT_MOCK_DIMENSION)),
        )
        .with_provider(EmbeddingMode::OpenAi, Arc::new(OpenAiEmbeddingProvider::new()))
        .with_provider(EmbeddingMode::Ollama, Arc::new(OllamaEmbeddingProvider::new()))
    }

    /// Register or replace the provider for `mode`.
    pub fn with_provider(mut self, mode: EmbeddingMode, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.providers.insert(mode, provider);
        self
    }

    /// Set the server host and reply timeout.
    pub fn with_server(mut self, host: impl Into<String>, timeout: Duration) -> Self {
        self.host = host.into();
        self.timeout = timeout;
        self
    }

    /// The provider registered for `mode`, if any.
    pub fn provider(&self, mode: EmbeddingMode) -> Option<&Arc<dyn EmbeddingProvider>> {
        self.providers.get(&mode)
    }

    /// Compute one embedding row per chunk.
    ///
    /// Preconditions are checked before any I/O: `chunks` must be
    /// non-empty, and a server-path request must carry a port.
    pub async fn compute(&self, request: EmbeddingRequest<'_>) -> Result<EmbeddingMatrix> {
        if request.chunks.is_empty() {
            return Err(Error::config("cannot compute embeddings for zero chunks"));
        }

        let matrix = if request.use_server {
            let port = request
                .port
                .ok_or_else(|| Error::config("port is required when use_server is true"))?;
            log::debug!(
                "computing {} embeddings via server on port {port} (model '{}')",
                request.chunks.len(),
                request.model_name
            );
            EmbeddingServerClient::new(self.host.clone(), port)
                .with_timeout(self.timeout)
                .compute(request.chunks, request.model_name, request.provider_options)
                .await?
        } else {
            let provider = self.providers.get(&request.mode).ok_or_else(|| {
                Error::config(format!(
                    "no embedding provider registered for mode '{}'",
                    request.mode
                ))
            })?;
            log::debug!(
                "computing {} embeddings with provider '{}' (model '{}')",
                request.chunks.len(),
                provider.name(),
                request.model_name
            );
            let ctx = EmbedContext::new(request.model_name)
                .for_build(request.is_build)
                .with_options(request.provider_options);
            let rows = provider.embed_batch(request.chunks, &ctx).await?;
            EmbeddingMatrix::from_rows(rows)?
        };

        if matrix.len() != request.chunks.len() {
            return Err(Error::invalid_data(format!(
                "embedding returned {} rows for {} chunks",
                matrix.len(),
                request.chunks.len()
            )));
        }
        Ok(matrix)
    }
}

impl Default for EmbeddingGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut modes: Vec<&str> = self.providers.keys().map(EmbeddingMode::as_str).collect();
        modes.sort_unstable();
        f.debug_struct("EmbeddingGateway")
            .field("providers", &modes)
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::EmbeddingServer;
    use async_trait::async_trait;

    /// Returns one row fewer than requested.
    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        async fn embed_batch(&self, texts: &[&str], _: &EmbedContext<'_>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0, 1.0]).collect())
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    fn mock_gateway(dim: usize) -> EmbeddingGateway {
        EmbeddingGateway::new()
            .with_provider(EmbeddingMode::Mock, Arc::new(MockEmbeddingProvider::new(dim)))
    }

    #[tokio::test]
    async fn test_direct_path_row_per_chunk() {
        let gateway = mock_gateway(8);
        let chunks = ["a", "b", "c"];
        let matrix = gateway
            .compute(EmbeddingRequest::new(&chunks, "mock", EmbeddingMode::Mock).for_build(true))
            .await
            .unwrap();
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.dim(), 8);
    }

    #[tokio::test]
    async fn test_server_without_port_is_config_error() {
        let gateway = mock_gateway(8);
        let chunks = ["a"];
        let err = gateway
            .compute(EmbeddingRequest::new(&chunks, "m", EmbeddingMode::Mock).via_server(true, None))
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("port is required"));
    }

    #[tokio::test]
    async fn test_empty_chunks_is_config_error() {
        let gateway = mock_gateway(8);
        let err = gateway
            .compute(EmbeddingRequest::new(&[], "m", EmbeddingMode::Mock))
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_unregistered_mode_is_config_error() {
        let gateway = EmbeddingGateway::new();
        let chunks = ["a"];
        let err = gateway
            .compute(EmbeddingRequest::new(&chunks, "m", EmbeddingMode::Gemini))
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("gemini"));
    }

    #[tokio::test]
    async fn test_row_count_mismatch_is_fatal() {
        let gateway = EmbeddingGateway::new().with_provider(EmbeddingMode::Mock, Arc::new(ShortProvider));
        let chunks = ["a", "b"];
        let err = gateway
            .compute(EmbeddingRequest::new(&chunks, "m", EmbeddingMode::Mock))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_server_path_row_per_chunk() {
        let server = EmbeddingServer::bind("127.0.0.1:0", Arc::new(MockEmbeddingProvider::new(4)))
            .await
            .unwrap();
        let port = server.port().unwrap();
        tokio::spawn(server.serve());

        // No direct-path providers: the server path must not need them.
        let gateway = EmbeddingGateway::new();
        let chunks = ["test chunk 1", "test chunk 2"];
        let matrix = gateway
            .compute(
                EmbeddingRequest::new(&chunks, "mock", EmbeddingMode::Mock)
                    .via_server(true, Some(port)),
            )
            .await
            .unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.dim(), 4);
    }

    #[tokio::test]
    async fn test_server_path_propagates_transport_error() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let gateway = EmbeddingGateway::new().with_server("127.0.0.1", Duration::from_secs(2));
        let chunks = ["a"];
        let err = gateway
            .compute(
                EmbeddingRequest::new(&chunks, "m", EmbeddingMode::Mock)
                    .via_server(true, Some(port)),
            )
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_default_providers() {
        let gateway = EmbeddingGateway::from_config(&ServerConfig::default());
        assert!(gateway.provider(EmbeddingMode::Mock).is_some());
        assert!(gateway.provider(EmbeddingMode::OpenAi).is_some());
        assert!(gateway.provider(EmbeddingMode::Ollama).is_some());
        assert!(gateway.provider(EmbeddingMode::Gemini).is_none());
    }
}
