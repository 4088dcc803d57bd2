//! Local embedding via fastembed.
//!
//! Serves the `fastembed` embedding mode on the gateway's direct path,
//! and is the usual provider behind an [`EmbeddingServer`] sidecar since
//! its model load is the cost the sidecar exists to amortize.
//!
//! `fastembed::TextEmbedding` is not `Sync`, so the model sits behind a
//! mutex and every call runs on the blocking pool.
//!
//! Requires the `vector-fastembed` feature.
//!
//! [`EmbeddingServer`]: crate::protocol::EmbeddingServer

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ragstore_core::{Error, Result};

use crate::embedding::{EmbedContext, EmbeddingProvider};

fn resolve_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "BAAI/bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" | "BAAI/bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "all-minilm-l6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
        }
        other => Err(Error::config(format!(
            "Unknown fastembed model '{other}'. Supported: bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, all-minilm-l6-v2"
        ))),
    }
}

/// Provider backed by a locally cached fastembed model.
pub struct FastEmbedProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    dimension: usize,
    model_name: String,
}

impl FastEmbedProvider {
    /// Load `model_name`, downloading it into `cache_dir` if needed.
    pub fn new(model_name: &str, cache_dir: Option<&str>) -> Result<Self> {
        let mut init = fastembed::InitOptions::new(resolve_model(model_name)?);
        if let Some(dir) = cache_dir {
            init = init.with_cache_dir(std::path::PathBuf::from(dir));
        }

        let mut text_embedding = fastembed::TextEmbedding::try_new(init)
            .map_err(|e| Error::embedding(format!("failed to load fastembed model '{model_name}': {e}")))?;

        let dimension = text_embedding
            .embed(vec!["dimension probe"], None)
            .map_err(|e| Error::embedding(format!("failed to probe embedding width: {e}")))?
            .first()
            .map(Vec::len)
            .ok_or_else(|| Error::embedding("empty probe embedding"))?;

        log::info!("loaded fastembed model '{model_name}' ({dimension} dims)");
        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            dimension,
            model_name: model_name.to_string(),
        })
    }

    /// Width of the vectors this model produces.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[&str], ctx: &EmbedContext<'_>) -> Result<Vec<Vec<f32>>> {
        if !ctx.model_name.is_empty() && ctx.model_name != self.model_name {
            log::debug!(
                "request for '{}' served by loaded model '{}'",
                ctx.model_name,
                self.model_name
            );
        }

        let model = Arc::clone(&self.model);
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::embedding(format!("fastembed model lock poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::embedding(format!("fastembed batch failed: {e}")))
        })
        .await
        .map_err(|e| Error::embedding(format!("embedding task failed: {e}")))?
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_names_and_hub_ids() {
        assert!(resolve_model("bge-small-en-v1.5").is_ok());
        assert!(resolve_model("BAAI/bge-small-en-v1.5").is_ok());
        assert!(resolve_model("sentence-transformers/all-MiniLM-L6-v2").is_ok());
    }

    #[test]
    fn test_resolve_model_unknown_is_config_error() {
        let err = resolve_model("facebook/contriever").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("facebook/contriever"));
    }

    #[tokio::test]
    #[ignore = "requires model download (~50MB)"]
    async fn test_embed_batch_shape() {
        let provider = FastEmbedProvider::new("bge-small-en-v1.5", None).unwrap();
        let rows = provider
            .embed_batch(&["Hello", "World"], &EmbedContext::new("bge-small-en-v1.5"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == provider.dimension()));
    }
}
