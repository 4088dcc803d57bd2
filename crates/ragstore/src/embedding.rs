//! Embedding provider trait and mock implementation.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! the in-process embedding routines reachable on the gateway's direct
//! path (fastembed, OpenAI-compatible endpoints, Ollama, ...).
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic fixed-dimension vectors for testing
//! - `OpenAiEmbeddingProvider` / `OllamaEmbeddingProvider`: HTTP endpoints
//! - `FastEmbedProvider`: Local embedding via fastembed (requires `vector-fastembed` feature)

use async_trait::async_trait;
use ragstore_core::{Options, Result};

/// Per-call context handed to a provider alongside the texts.
#[derive(Debug, Clone, Copy)]
pub struct EmbedContext<'a> {
    /// Model name requested by the caller.
    pub model_name: &'a str,

    /// True when embedding documents for indexing, false for queries.
    pub is_build: bool,

    /// Provider-specific options, passed through untouched.
    pub provider_options: Option<&'a Options>,
}

impl<'a> EmbedContext<'a> {
    /// Create a context for the given model.
    pub fn new(model_name: &'a str) -> Self {
        Self {
            model_name,
            is_build: false,
            provider_options: None,
        }
    }

    /// Mark the call as part of index building.
    pub fn for_build(mut self, is_build: bool) -> Self {
        self.is_build = is_build;
        self
    }

    /// Attach provider options.
    pub fn with_options(mut self, options: Option<&'a Options>) -> Self {
        self.provider_options = options;
        self
    }

    /// Look up a string option.
    pub fn option_str(&self, key: &str) -> Option<&'a str> {
        self.provider_options
            .and_then(|opts| opts.get(key))
            .and_then(|v| v.as_str())
    }
}

/// Trait for generating text embeddings.
///
/// Implementations wrap specific embedding libraries or services and
/// provide a uniform async interface. The trait requires `Send + Sync` to
/// allow safe sharing across async tasks.
///
/// # Thread Safety
///
/// Implementations should handle internal synchronization (e.g., `Arc<Mutex<>>`)
/// for thread-unsafe underlying libraries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts, one row per text.
    async fn embed_batch(&self, texts: &[&str], ctx: &EmbedContext<'_>) -> Result<Vec<Vec<f32>>>;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str, ctx: &EmbedContext<'_>) -> Result<Vec<f32>> {
        let mut rows = self.embed_batch(&[text], ctx).await?;
        rows.pop().ok_or_else(|| {
            ragstore_core::Error::embedding(format!("{} returned no embedding", self.name()))
        })
    }

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A mock embedding provider for testing.
///
/// Generates deterministic vectors based on the input text bytes, producing
/// consistent embeddings for the same input.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// The embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Generate a deterministic embedding from text.
    pub fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        let bytes = text.as_bytes();

        for (i, val) in embedding.iter_mut().enumerate() {
            let byte_val = if bytes.is_empty() {
                0u8
            } else {
                bytes[i % bytes.len()]
            };
            *val = ((byte_val as f32 + i as f32) % 256.0) / 256.0;
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str], _ctx: &EmbedContext<'_>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.deterministic_embedding(t))
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockEmbeddingProvider::new(384);
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.name(), "mock");
    }

    #[tokio::test]
    async fn test_mock_embed_single_is_unit_length() {
        let provider = MockEmbeddingProvider::new(8);
        let embedding = provider
            .embed("hello world", &EmbedContext::new("mock"))
            .await
            .unwrap();

        assert_eq!(embedding.len(), 8);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embed_deterministic() {
        let provider = MockEmbeddingProvider::new(16);
        let ctx = EmbedContext::new("mock");
        let e1 = provider.embed("same text", &ctx).await.unwrap();
        let e2 = provider.embed("same text", &ctx).await.unwrap();
        assert_eq!(e1, e2);

        let e3 = provider.embed("other text", &ctx).await.unwrap();
        assert_ne!(e1, e3);
    }

    #[tokio::test]
    async fn test_mock_embed_batch_row_per_text() {
        let provider = MockEmbeddingProvider::new(8);
        let texts = vec!["hello", "world", "test"];
        let embeddings = provider
            .embed_batch(&texts, &EmbedContext::new("mock").for_build(true))
            .await
            .unwrap();

        assert_eq!(embeddings.len(), 3);
        assert!(embeddings.iter().all(|e| e.len() == 8));
    }

    #[test]
    fn test_context_option_lookup() {
        let mut options = Options::new();
        options.insert("api_key".into(), "sk-test".into());
        options.insert("timeout".into(), 30.into());

        let ctx = EmbedContext::new("m").with_options(Some(&options));
        assert_eq!(ctx.option_str("api_key"), Some("sk-test"));
        assert_eq!(ctx.option_str("timeout"), None);
        assert_eq!(ctx.option_str("missing"), None);
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }
}
