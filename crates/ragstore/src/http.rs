//! HTTP embedding providers.
//!
//! Direct-path providers that call a remote embeddings API per batch:
//!
//! - [`OpenAiEmbeddingProvider`]: any OpenAI-compatible `/embeddings` endpoint
//! - [`OllamaEmbeddingProvider`]: Ollama's `/api/embed` endpoint
//!
//! Both honor per-call provider options (`base_url` / `host`, `api_key`)
//! over their constructor defaults.

use async_trait::async_trait;
use ragstore_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::{EmbedContext, EmbeddingProvider};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_HOST: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

/// Provider for OpenAI-compatible embedding endpoints.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiEmbeddingProvider {
    /// Create a provider using `OPENAI_API_KEY` and the public endpoint.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
        }
    }

    /// Point the provider at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API key explicitly.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl Default for OpenAiEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str], ctx: &EmbedContext<'_>) -> Result<Vec<Vec<f32>>> {
        let base_url = ctx.option_str("base_url").unwrap_or(self.base_url.as_str());
        let url = format!("{}/embeddings", base_url.trim_end_matches('/'));
        let api_key = ctx.option_str("api_key").or(self.api_key.as_deref());

        let mut request = self.client.post(&url).json(&EmbeddingsRequest {
            model: ctx.model_name,
            input: texts,
        });
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        log::debug!("requesting {} embeddings from {url}", texts.len());
        let response = request
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Failed to call {url}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::embedding(format!(
                "Embedding API error {status}: {body}"
            )));
        }

        let mut parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {e}")))?;

        // The API may reorder rows; `index` is authoritative.
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

impl std::fmt::Debug for OpenAiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// Ollama
// ============================================================================

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Provider for a local or remote Ollama daemon.
#[derive(Debug)]
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    host: String,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for `OLLAMA_HOST` or the default local daemon.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            host: std::env::var("OLLAMA_HOST").unwrap_or_else(|_| OLLAMA_DEFAULT_HOST.to_string()),
        }
    }

    /// Use a specific daemon address.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

impl Default for OllamaEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str], ctx: &EmbedContext<'_>) -> Result<Vec<Vec<f32>>> {
        let host = ctx.option_str("host").unwrap_or(self.host.as_str());
        let url = format!("{}/api/embed", host.trim_end_matches('/'));

        log::debug!("requesting {} embeddings from {url}", texts.len());
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingsRequest {
                model: ctx.model_name,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Failed to call {url}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::embedding(format!("Ollama error {status}: {body}")));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse Ollama response: {e}")))?;
        Ok(parsed.embeddings)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let texts = ["a", "b"];
        let body = serde_json::to_value(EmbeddingsRequest {
            model: "text-embedding-3-small",
            input: &texts,
        })
        .unwrap();
        assert_eq!(body["model"], "text-embedding-3-small");
        assert_eq!(body["input"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_openai_response_parse() {
        let json = r#"{"data":[{"index":1,"embedding":[0.3,0.4]},{"index":0,"embedding":[0.1,0.2]}],"model":"m"}"#;
        let mut parsed: OpenAiResponse = serde_json::from_str(json).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let provider = OpenAiEmbeddingProvider::new().with_api_key("sk-secret");
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("redacted"));
    }

    #[tokio::test]
    async fn test_openai_unreachable_is_embedding_error() {
        let provider = OpenAiEmbeddingProvider::new().with_base_url("http://127.0.0.1:1/v1");
        let err = provider
            .embed_batch(&["x"], &EmbedContext::new("m"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
