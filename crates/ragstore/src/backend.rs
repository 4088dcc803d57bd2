//! Backend capability traits.
//!
//! An ANN engine plugs into the store through three traits:
//!
//! - [`BackendFactory`]: registered by name, produces builders and searchers
//! - [`IndexBuilder`]: write side, used while an index is being built
//! - [`IndexSearcher`]: read side, used once an index has been loaded
//!
//! The store never holds a builder and a searcher at the same time.
//! Backend-specific parameters travel as an opaque [`Options`] map that the
//! store forwards without inspecting.

use std::path::Path;

use async_trait::async_trait;
use ragstore_core::{Error, Options, Result};

use crate::matrix::EmbeddingMatrix;
use crate::types::{Dtype, Passage, SearchResult};

/// Option key the store sets to the embedding model name before handing
/// options to a factory.
pub const MODEL_OPTION: &str = "embedding_model";

/// Creates builders and searchers for one backend.
pub trait BackendFactory: Send + Sync {
    /// Create a builder for a new or extended index.
    fn builder(&self, options: &Options) -> Result<Box<dyn IndexBuilder>>;

    /// Create a searcher for the index at `index_path`.
    ///
    /// The searcher is not expected to read anything until
    /// [`IndexSearcher::load`] is called.
    fn searcher(&self, index_path: &Path, options: &Options) -> Result<Box<dyn IndexSearcher>>;
}

/// Write side of a backend.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    /// Add `vectors` to the index at `index_path`.
    ///
    /// Row `i` of `vectors` belongs to `passages[i]`; ids are taken from
    /// the passages. The index must be durable at `index_path` when this
    /// returns.
    async fn build(
        &mut self,
        vectors: &EmbeddingMatrix,
        passages: &[Passage],
        index_path: &Path,
        options: &Options,
    ) -> Result<()>;

    /// Number of documents built so far.
    fn count(&self) -> usize;
}

/// Read side of a backend.
#[async_trait]
pub trait IndexSearcher: Send + Sync {
    /// Return up to `top_k` nearest passages to `query`, best first.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        options: &Options,
    ) -> Result<Vec<SearchResult>>;

    /// Remove documents by id. Returns true when anything was removed.
    async fn delete(&mut self, ids: &[String]) -> Result<bool>;

    /// Whether [`insert`](Self::insert) is supported after load.
    fn supports_insert(&self) -> bool {
        false
    }

    /// Add documents to a loaded index.
    async fn insert(&mut self, _vectors: &EmbeddingMatrix, _passages: &[Passage]) -> Result<()> {
        Err(Error::read_only(
            "index is read-only after load: backend does not support incremental insert",
        ))
    }

    /// Persist the current state to the index path.
    async fn save(&mut self) -> Result<()>;

    /// Restore state from the index path.
    async fn load(&mut self) -> Result<()>;

    /// Number of documents currently searchable.
    fn count(&self) -> usize;

    /// Model the stored vectors were computed with.
    fn model_name(&self) -> &str;

    /// Width of the stored vectors.
    fn embedding_dim(&self) -> usize;

    /// Element type of the stored vectors.
    fn dtype(&self) -> Dtype {
        Dtype::Float32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trait_object_safety() {
        fn _factory(_: &dyn BackendFactory) {}
        fn _builder(_: &dyn IndexBuilder) {}
        fn _searcher(_: &dyn IndexSearcher) {}
    }
}
