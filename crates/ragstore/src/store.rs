//! The `VectorStore` façade.
//!
//! Combines a registered backend, the embedding gateway and the metadata
//! filter into add/search/delete/persist operations on one index path.
//!
//! # Lifecycle
//!
//! ```text
//!  Uninitialized ──add──> Building ──search/delete/load──> Searchable
//!        └────────────────search/delete/load──────────────────┘
//! ```
//!
//! A store holds at most one backend handle: loading a searcher drops the
//! builder. Adding after load works only when the searcher supports
//! incremental insert.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragstore_core::{EmbeddingMode, Error, Options, Result, StoreConfig};

use crate::backend::{BackendFactory, IndexBuilder, IndexSearcher, MODEL_OPTION};
use crate::filter;
use crate::gateway::{EmbeddingGateway, EmbeddingRequest};
use crate::matrix::EmbeddingMatrix;
use crate::persistence::{self, IndexMeta};
use crate::registry::{self, BackendRegistry};
use crate::types::{Document, Dtype, Passage, SearchRequest, SearchResult};

/// Hex characters kept from a generated id's digest.
const GENERATED_ID_LEN: usize = 16;

enum State {
    Uninitialized,
    Building(Box<dyn IndexBuilder>),
    Searchable(Box<dyn IndexSearcher>),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Uninitialized => "uninitialized",
            State::Building(_) => "building",
            State::Searchable(_) => "searchable",
        }
    }
}

/// A named vector index backed by a pluggable engine.
pub struct VectorStore {
    config: StoreConfig,
    factory: Arc<dyn BackendFactory>,
    gateway: EmbeddingGateway,
    state: State,
    meta: Option<IndexMeta>,
    documents_added: u64,
    embedding_dim: Option<usize>,
}

impl VectorStore {
    /// Create a store using the process-wide backend registry.
    ///
    /// Nothing is read from disk; see [`VectorStore::open`] to continue an
    /// index that was saved earlier.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::new_in(registry::global(), config)
    }

    /// Create a store resolving its backend in `registry`.
    ///
    /// Fails with a configuration error naming the requested and the
    /// available backends when the backend is not registered.
    pub fn new_in(registry: &BackendRegistry, config: StoreConfig) -> Result<Self> {
        let factory = registry.get(&config.backend).map_err(|_| {
            let available = registry.list_all();
            Error::config(format!(
                "Unknown backend '{}'. Available backends: {}",
                config.backend,
                if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                }
            ))
        })?;

        let gateway = EmbeddingGateway::from_config(&config.server);
        log::debug!(
            "opened store at {} with backend '{}'",
            config.index_path.display(),
            config.backend
        );
        Ok(Self {
            config,
            factory,
            gateway,
            state: State::Uninitialized,
            meta: None,
            documents_added: 0,
            embedding_dim: None,
        })
    }

    /// Create a store and load the index already saved at its path.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let mut store = Self::new(config)?;
        store.load().await?;
        Ok(store)
    }

    /// Replace the embedding gateway.
    pub fn with_gateway(mut self, gateway: EmbeddingGateway) -> Self {
        self.gateway = gateway;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Location of the index.
    pub fn index_path(&self) -> &Path {
        &self.config.index_path
    }

    /// Current lifecycle state: `uninitialized`, `building` or `searchable`.
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// True once a searcher is loaded.
    pub fn is_searchable(&self) -> bool {
        matches!(self.state, State::Searchable(_))
    }

    /// Vector width, once known.
    pub fn embedding_dim(&self) -> Option<usize> {
        self.embedding_dim
    }

    /// Metadata from the last successful save or load.
    pub fn meta(&self) -> Option<&IndexMeta> {
        self.meta.as_ref()
    }

    /// Number of documents in the index.
    pub fn get_document_count(&self) -> usize {
        match &self.state {
            State::Uninitialized => 0,
            State::Building(builder) => builder.count(),
            State::Searchable(searcher) => searcher.count(),
        }
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Add one document; returns its id.
    pub async fn add_one(&mut self, document: Document) -> Result<String> {
        let mut ids = self.add(vec![document]).await?;
        ids.pop()
            .ok_or_else(|| Error::invalid_data("add returned no id for one document"))
    }

    /// Add documents; returns their ids in input order.
    ///
    /// All texts are embedded in a single gateway call. Every text must be
    /// non-empty after trimming; nothing is embedded otherwise.
    ///
    /// On a store that has not been loaded, the first add starts a new
    /// build that replaces any index already saved at the path. Use
    /// [`VectorStore::open`] or [`load_index`] to extend an existing index.
    pub async fn add(&mut self, documents: Vec<Document>) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(pos) = documents.iter().position(|d| d.text.trim().is_empty()) {
            return Err(Error::config(format!(
                "Document text cannot be empty (document {pos})"
            )));
        }
        self.require_server_port(self.config.build_use_server)?;
        if let State::Searchable(searcher) = &self.state {
            if !searcher.supports_insert() {
                return Err(Error::read_only(format!(
                    "index '{}' is read-only after load: backend '{}' does not support insert",
                    self.config.index_path.display(),
                    self.config.backend
                )));
            }
        }

        let chunks: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let vectors = self
            .embed(&chunks, self.config.build_use_server, true)
            .await?;

        let passages: Vec<Passage> = documents
            .into_iter()
            .enumerate()
            .map(|(i, doc)| {
                let id = match doc.id {
                    Some(id) => id,
                    None => generate_id(
                        &self.config.index_path,
                        self.documents_added + i as u64,
                        &doc.text,
                    ),
                };
                Passage::new(id, doc.text, doc.metadata)
            })
            .collect();

        let options = self.backend_options();
        let state = std::mem::replace(&mut self.state, State::Uninitialized);
        let mut builder = match state {
            State::Searchable(mut searcher) => {
                let inserted = searcher.insert(&vectors, &passages).await;
                self.state = State::Searchable(searcher);
                inserted?;
                return Ok(self.finish_add(passages, vectors.dim()));
            }
            State::Building(builder) => builder,
            State::Uninitialized => {
                let meta_path = persistence::meta_path(&self.config.index_path);
                if meta_path.exists() {
                    log::warn!(
                        "{} already holds a saved index; building replaces it (use open or load_index to extend it)",
                        self.config.index_path.display()
                    );
                }
                log::info!(
                    "building new '{}' index at {}",
                    self.config.backend,
                    self.config.index_path.display()
                );
                self.factory.builder(&options)?
            }
        };
        let built = builder
            .build(&vectors, &passages, &self.config.index_path, &options)
            .await;
        self.state = State::Building(builder);
        built?;

        Ok(self.finish_add(passages, vectors.dim()))
    }

    fn finish_add(&mut self, passages: Vec<Passage>, dim: usize) -> Vec<String> {
        self.documents_added += passages.len() as u64;
        self.embedding_dim = Some(dim);
        log::debug!(
            "added {} documents to {}",
            passages.len(),
            self.config.index_path.display()
        );
        passages.into_iter().map(|p| p.id).collect()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Search the index.
    ///
    /// Loads the searcher on first use. The metadata filter is applied to
    /// the backend's top-k hits, so fewer than `top_k` results may come
    /// back; the backend is never re-queried.
    pub async fn search(&mut self, request: impl Into<SearchRequest>) -> Result<Vec<SearchResult>> {
        let request = request.into();
        if request.query.trim().is_empty() {
            return Err(Error::config("Query cannot be empty"));
        }
        let top_k = request.top_k.unwrap_or(self.config.default_top_k);
        self.require_server_port(self.config.query_use_server)?;

        self.ensure_searcher().await?;

        let query = self
            .embed(&[request.query.as_str()], self.config.query_use_server, false)
            .await?;
        let row = query
            .row(0)
            .ok_or_else(|| Error::invalid_data("query embedding has no rows"))?;

        let mut options = self.config.backend_options.clone();
        options.extend(request.backend_options.clone());

        let State::Searchable(searcher) = &self.state else {
            return Err(Error::invalid_data("searcher missing after load"));
        };
        let expected = searcher.embedding_dim();
        if expected != 0 && row.len() != expected {
            return Err(Error::invalid_data(format!(
                "query embedding has width {} but index '{}' stores width {expected}",
                row.len(),
                self.config.index_path.display()
            )));
        }

        let hits = searcher.search(row, top_k, &options).await?;
        let mut results = match &request.metadata_filter {
            Some(expr) => filter::filter(hits, expr),
            None => hits,
        };
        results.truncate(top_k);
        Ok(results)
    }

    /// Delete documents by id. Empty input is a successful no-op.
    pub async fn delete(&mut self, ids: &[String]) -> Result<bool> {
        if ids.is_empty() {
            return Ok(true);
        }
        self.ensure_searcher().await?;
        match &mut self.state {
            State::Searchable(searcher) => searcher.delete(ids).await,
            _ => Err(Error::invalid_data("searcher missing after load")),
        }
    }

    /// Delete one document by id.
    pub async fn delete_one(&mut self, id: impl Into<String>) -> Result<bool> {
        self.delete(&[id.into()]).await
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Persist the index and its metadata.
    ///
    /// The stored metadata descriptor is replaced only after both the
    /// backend and the metadata file have been written.
    pub async fn save(&mut self) -> Result<()> {
        let (count, dim, dtype) = match &mut self.state {
            State::Uninitialized => {
                log::debug!("nothing to save at {}", self.config.index_path.display());
                return Ok(());
            }
            // Builders persist on every build.
            State::Building(builder) => (
                builder.count(),
                self.embedding_dim.unwrap_or_default(),
                Dtype::default(),
            ),
            State::Searchable(searcher) => {
                searcher.save().await?;
                (
                    searcher.count(),
                    self.embedding_dim.unwrap_or(searcher.embedding_dim()),
                    searcher.dtype(),
                )
            }
        };

        let meta = IndexMeta {
            backend: self.config.backend.clone(),
            embedding_model: self.config.embedding_model.clone(),
            embedding_mode: self.config.embedding_mode,
            embedding_dim: dim,
            dtype,
            document_count: count,
            documents_added: self.documents_added,
            built_at: persistence::timestamp(),
        };
        persistence::save_meta(&self.config.index_path, &meta)?;
        log::info!(
            "saved {} documents to {}",
            count,
            self.config.index_path.display()
        );
        self.meta = Some(meta);
        Ok(())
    }

    /// Load the index at the store's path, replacing any builder.
    pub async fn load(&mut self) -> Result<()> {
        let meta = persistence::load_meta_if_exists(&self.config.index_path)?;
        if let Some(meta) = &meta {
            if meta.backend != self.config.backend {
                return Err(Error::config(format!(
                    "index at {} was built with backend '{}', not '{}'",
                    self.config.index_path.display(),
                    meta.backend,
                    self.config.backend
                )));
            }
        }

        let mut searcher = self
            .factory
            .searcher(&self.config.index_path, &self.backend_options())?;
        searcher.load().await?;

        if !searcher.model_name().is_empty() && searcher.model_name() != self.config.embedding_model {
            log::warn!(
                "index at {} was embedded with '{}' but store is configured for '{}'",
                self.config.index_path.display(),
                searcher.model_name(),
                self.config.embedding_model
            );
        }

        let restored_ordinal = meta
            .as_ref()
            .map(|m| m.documents_added)
            .unwrap_or(searcher.count() as u64);
        self.documents_added = self.documents_added.max(restored_ordinal);
        self.embedding_dim = match searcher.embedding_dim() {
            0 => meta.as_ref().map(|m| m.embedding_dim).or(self.embedding_dim),
            dim => Some(dim),
        };
        log::info!(
            "loaded {} documents from {}",
            searcher.count(),
            self.config.index_path.display()
        );
        self.state = State::Searchable(searcher);
        if meta.is_some() {
            self.meta = meta;
        }
        Ok(())
    }

    /// Save and release the store.
    pub async fn close(mut self) -> Result<()> {
        self.save().await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_server_port(&self, use_server: bool) -> Result<()> {
        if use_server && self.config.server.port.is_none() {
            return Err(Error::config("port is required when use_server is true"));
        }
        Ok(())
    }

    async fn ensure_searcher(&mut self) -> Result<()> {
        if !self.is_searchable() {
            self.load().await?;
        }
        Ok(())
    }

    async fn embed(&self, chunks: &[&str], use_server: bool, is_build: bool) -> Result<EmbeddingMatrix> {
        let request = EmbeddingRequest::new(
            chunks,
            &self.config.embedding_model,
            self.config.embedding_mode,
        )
        .via_server(use_server, self.config.server.port)
        .for_build(is_build)
        .with_options(Some(&self.config.provider_options));
        let matrix = self.gateway.compute(request).await?;

        if let Some(dim) = self.embedding_dim {
            if matrix.dim() != dim {
                return Err(Error::invalid_data(format!(
                    "embedding width {} does not match index width {dim}",
                    matrix.dim()
                )));
            }
        }
        Ok(matrix)
    }

    fn backend_options(&self) -> Options {
        let mut options = self.config.backend_options.clone();
        options
            .entry(MODEL_OPTION.to_string())
            .or_insert_with(|| self.config.embedding_model.clone().into());
        options
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VectorStore(index={}, backend={}, model={}, state={})",
            self.config.index_path.display(),
            self.config.backend,
            self.config.embedding_model,
            self.state.name()
        )
    }
}

/// Deterministic id for the `ordinal`-th document added to `index_path`.
pub fn generate_id(index_path: &Path, ordinal: u64, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(index_path.to_string_lossy().as_bytes());
    hasher.update(&ordinal.to_le_bytes());
    hasher.update(text.as_bytes());
    let hex = hasher.finalize().to_hex();
    hex[..GENERATED_ID_LEN].to_string()
}

/// Open a saved index.
///
/// `embedding_model` and `embedding_mode` default to the values recorded
/// in the index metadata, then to the configuration defaults.
pub async fn load_index(
    index_path: impl Into<PathBuf>,
    backend: &str,
    embedding_model: Option<&str>,
    embedding_mode: Option<EmbeddingMode>,
) -> Result<VectorStore> {
    let index_path = index_path.into();
    let meta = persistence::load_meta_if_exists(&index_path)?;

    let mut config = StoreConfig::new(&index_path, backend);
    if let Some(model) = embedding_model
        .map(str::to_string)
        .or_else(|| meta.as_ref().map(|m| m.embedding_model.clone()))
    {
        config = config.with_model(model);
    }
    if let Some(mode) = embedding_mode.or_else(|| meta.as_ref().map(|m| m.embedding_mode)) {
        config = config.with_mode(mode);
    }
    VectorStore::open(config).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::filter::MetadataFilter;
    use serde_json::json;
    use tempfile::tempdir;

    const DIM: usize = 8;

    fn flat_registry() -> BackendRegistry {
        let registry = BackendRegistry::new();
        registry::register_builtin_backends(&registry);
        registry
    }

    fn direct_config(path: &Path) -> StoreConfig {
        StoreConfig::new(path, "flat").with_query_server(false)
    }

    fn store_at(registry: &BackendRegistry, path: &Path) -> VectorStore {
        VectorStore::new_in(registry, direct_config(path))
            .unwrap()
            .with_gateway(mock_gateway())
    }

    fn mock_gateway() -> EmbeddingGateway {
        EmbeddingGateway::new()
            .with_provider(EmbeddingMode::Mock, Arc::new(MockEmbeddingProvider::new(DIM)))
    }

    #[test]
    fn test_unknown_backend_lists_available() {
        let registry = flat_registry();
        let err = VectorStore::new_in(&registry, StoreConfig::new("x.index", "hnsw")).unwrap_err();
        assert!(err.is_config());
        let msg = err.to_string();
        assert!(msg.contains("Unknown backend 'hnsw'"));
        assert!(msg.contains("flat"));
    }

    #[test]
    fn test_unknown_backend_with_empty_registry() {
        let err =
            VectorStore::new_in(&BackendRegistry::new(), StoreConfig::new("x.index", "mock")).unwrap_err();
        assert!(err.to_string().contains("(none)"));
    }

    #[test]
    fn test_debug_format() {
        let registry = flat_registry();
        let store = store_at(&registry, Path::new("/tmp/books.index"));
        assert_eq!(
            format!("{store:?}"),
            "VectorStore(index=/tmp/books.index, backend=flat, model=mock, state=uninitialized)"
        );
    }

    #[test]
    fn test_generate_id_deterministic() {
        let path = Path::new("a.index");
        assert_eq!(generate_id(path, 0, "x"), generate_id(path, 0, "x"));
        assert_ne!(generate_id(path, 0, "x"), generate_id(path, 1, "x"));
        assert_ne!(generate_id(path, 0, "x"), generate_id(Path::new("b.index"), 0, "x"));
        assert_eq!(generate_id(path, 0, "x").len(), GENERATED_ID_LEN);
    }

    #[tokio::test]
    async fn test_add_generates_distinct_ids_in_order() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = store_at(&registry, &dir.path().join("t.index"));

        let ids = store
            .add(vec![Document::new("doc a"), Document::new("doc b")])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(store.state_name(), "building");
        assert_eq!(store.get_document_count(), 2);
        assert_eq!(store.embedding_dim(), Some(DIM));
    }

    #[tokio::test]
    async fn test_explicit_ids_round_trip() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = store_at(&registry, &dir.path().join("t.index"));

        let ids = store
            .add(vec![
                Document::new("first").with_id("doc-1"),
                Document::new("second"),
                Document::new("third").with_id("doc-3"),
            ])
            .await
            .unwrap();
        assert_eq!(ids[0], "doc-1");
        assert_eq!(ids[2], "doc-3");

        let hits = store
            .search(SearchRequest::new("first").with_top_k(1))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "doc-1");
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_embedding() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = store_at(&registry, &dir.path().join("t.index"));

        let err = store
            .add(vec![Document::new("ok"), Document::new("   ")])
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(store.state_name(), "uninitialized");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = store_at(&registry, &dir.path().join("t.index"));

        let empty = store.search("").await.unwrap_err();
        let blank = store.search("   ").await.unwrap_err();
        assert!(empty.is_config());
        assert_eq!(empty.to_string(), blank.to_string());
        assert!(empty.to_string().contains("Query cannot be empty"));
    }

    #[tokio::test]
    async fn test_search_auto_loads_and_ranks() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = store_at(&registry, &dir.path().join("t.index"));

        store
            .add(vec![
                Document::new("rust ownership"),
                Document::new("python decorators"),
                Document::new("rust lifetimes"),
            ])
            .await
            .unwrap();

        let hits = store
            .search(SearchRequest::new("rust ownership").with_top_k(2))
            .await
            .unwrap();
        assert!(store.is_searchable());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "rust ownership");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = store_at(&registry, &dir.path().join("t.index"));

        store
            .add(vec![
                Document::new("alpha").with_metadata("lang", "en"),
                Document::new("beta").with_metadata("lang", "de"),
                Document::new("gamma").with_metadata("lang", "en"),
            ])
            .await
            .unwrap();

        let filter = MetadataFilter::from_value(&json!({"lang": {"==": "en"}})).unwrap();
        let hits = store
            .search(SearchRequest::new("alpha").with_top_k(3).with_filter(filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.metadata["lang"] == "en"));
    }

    #[tokio::test]
    async fn test_query_server_without_port_is_config_error() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = VectorStore::new_in(
            &registry,
            StoreConfig::new(dir.path().join("t.index"), "flat"),
        )
        .unwrap()
        .with_gateway(mock_gateway());

        store.add(vec![Document::new("a")]).await.unwrap();
        let err = store.search("a").await.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("port is required"));
    }

    #[tokio::test]
    async fn test_fresh_store_missing_port_fails_before_touching_disk() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let path = dir.path().join("fresh.index");
        let mut store = VectorStore::new_in(&registry, StoreConfig::new(&path, "flat"))
            .unwrap()
            .with_gateway(mock_gateway());

        let err = store.search("q").await.unwrap_err();
        assert!(err.is_config(), "expected config error, got {err:?}");
        assert!(err.to_string().contains("port is required"));
        assert_eq!(store.state_name(), "uninitialized");
    }

    #[tokio::test]
    async fn test_build_server_without_port_is_config_error() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let path = dir.path().join("t.index");
        let mut store = VectorStore::new_in(
            &registry,
            direct_config(&path).with_build_server(true),
        )
        .unwrap()
        .with_gateway(mock_gateway());

        let err = store.add(vec![Document::new("a")]).await.unwrap_err();
        assert!(err.is_config());
        assert!(!path.exists());
        assert_eq!(store.get_document_count(), 0);
    }

    #[tokio::test]
    async fn test_new_store_on_saved_index_replaces_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.index");
        let registry = flat_registry();

        let mut first = store_at(&registry, &path);
        first
            .add(vec![Document::new("a"), Document::new("b")])
            .await
            .unwrap();
        first.save().await.unwrap();

        let mut second = store_at(&registry, &path);
        second.add(vec![Document::new("c")]).await.unwrap();
        second.save().await.unwrap();

        let mut reopened = store_at(&registry, &path);
        reopened.load().await.unwrap();
        assert_eq!(reopened.get_document_count(), 1);
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.index");
        let registry = flat_registry();

        let mut store = store_at(&registry, &path);
        store
            .add(vec![Document::new("a"), Document::new("b"), Document::new("c")])
            .await
            .unwrap();
        store.save().await.unwrap();
        let saved = store.meta().unwrap().clone();
        assert_eq!(saved.document_count, 3);
        assert_eq!(saved.documents_added, 3);
        assert_eq!(saved.embedding_dim, DIM);

        let mut reopened = store_at(&registry, &path);
        reopened.load().await.unwrap();
        assert_eq!(reopened.get_document_count(), 3);
        assert_eq!(reopened.meta().unwrap().documents_added, 3);
    }

    #[tokio::test]
    async fn test_ids_stay_unique_across_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.index");
        let registry = flat_registry();

        let mut store = store_at(&registry, &path);
        let first = store.add_one(Document::new("same text")).await.unwrap();
        store.close().await.unwrap();

        let mut reopened = store_at(&registry, &path);
        reopened.load().await.unwrap();
        let second = reopened.add_one(Document::new("same text")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(reopened.get_document_count(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = store_at(&registry, &dir.path().join("t.index"));

        assert!(store.delete(&[]).await.unwrap());

        let ids = store
            .add(vec![Document::new("a"), Document::new("b")])
            .await
            .unwrap();
        assert!(store.delete_one(ids[0].clone()).await.unwrap());
        assert_eq!(store.get_document_count(), 1);
        assert!(!store.delete_one("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_load_rejects_backend_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.index");
        let registry = flat_registry();
        registry.register("other", Arc::new(crate::flat::FlatFactory));

        let mut store = store_at(&registry, &path);
        store.add(vec![Document::new("a")]).await.unwrap();
        store.save().await.unwrap();

        let mut other = VectorStore::new_in(&registry, StoreConfig::new(&path, "other"))
            .unwrap()
            .with_gateway(mock_gateway());
        assert!(other.load().await.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_search_missing_index_fails() {
        let dir = tempdir().unwrap();
        let registry = flat_registry();
        let mut store = store_at(&registry, &dir.path().join("missing.index"));
        assert!(store.search("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_save_without_documents_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.index");
        let registry = flat_registry();
        let mut store = store_at(&registry, &path);
        store.save().await.unwrap();
        assert!(store.meta().is_none());
        assert!(!persistence::meta_path(&path).exists());
    }
}
