//! Backend-agnostic vector store for retrieval-augmented generation.
//!
//! This crate decouples document ingestion, embedding computation,
//! nearest-neighbor search and result post-processing from the ANN engine
//! in use. Engines plug in by name through the backend registry;
//! embeddings come either from an in-process provider or from a warm
//! embedding server reached over a small request/reply protocol.
//!
//! # Features
//!
//! - `vector-lancedb`: the `lancedb` backend
//! - `vector-fastembed`: local embedding generation via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  VectorStore (add / search / delete / save / load)          │
//! │  ChatSession (retrieve, prompt, TextGenerator)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingGateway                                           │
//! │  ├── direct: EmbeddingProvider per EmbeddingMode            │
//! │  │   ├── MockEmbeddingProvider                              │
//! │  │   ├── OpenAiEmbeddingProvider / OllamaEmbeddingProvider  │
//! │  │   └── FastEmbedProvider (feature: vector-fastembed)      │
//! │  └── server: EmbeddingServerClient ──TCP──> EmbeddingServer │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BackendRegistry: name -> BackendFactory                    │
//! │  ├── flat (brute-force cosine, always available)            │
//! │  └── lancedb (feature: vector-lancedb)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MetadataFilter (post-filter of raw hits)                   │
//! │  IndexMeta persistence (<index>.meta.json)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ragstore::{Document, SearchRequest, StoreConfig, VectorStore};
//!
//! ragstore::register_builtin_backends(ragstore::registry::global());
//!
//! let config = StoreConfig::new("books.index", "flat").with_query_server(false);
//! let mut store = VectorStore::new(config)?;
//! store.add(vec![Document::new("The quick brown fox")]).await?;
//!
//! for hit in store.search(SearchRequest::new("fox").with_top_k(3)).await? {
//!     println!("{}: {:.3}", hit.id, hit.score);
//! }
//! store.close().await?;
//! ```

// Contracts and data
pub mod backend;
pub mod matrix;
pub mod types;

// Embeddings
pub mod embedding;
pub mod gateway;
pub mod http;
pub mod protocol;

// Backends
pub mod flat;
pub mod registry;

// Query-side helpers
pub mod filter;

// Façade
pub mod chat;
pub mod persistence;
pub mod store;

#[cfg(feature = "vector-fastembed")]
pub mod fastembed;

#[cfg(feature = "vector-lancedb")]
pub mod lancedb;

pub use ragstore_core::{EmbeddingMode, Error, Options, Result, ServerConfig, StoreConfig};

pub use backend::{BackendFactory, IndexBuilder, IndexSearcher};
pub use chat::{ChatAnswer, ChatSession, SimulatedGenerator, TextGenerator};
pub use embedding::{EmbedContext, EmbeddingProvider, MockEmbeddingProvider};
pub use filter::{FilterOp, MetadataFilter};
pub use flat::FlatFactory;
pub use gateway::{EmbeddingGateway, EmbeddingRequest};
pub use http::{OllamaEmbeddingProvider, OpenAiEmbeddingProvider};
pub use matrix::EmbeddingMatrix;
pub use persistence::IndexMeta;
pub use protocol::{EmbeddingServer, EmbeddingServerClient};
pub use registry::{
    BackendRegistry, get_backend, get_registered_backends, register_backend,
    register_builtin_backends,
};
pub use store::{VectorStore, load_index};
pub use types::{Document, Dtype, Metadata, Passage, SearchRequest, SearchResult};

#[cfg(feature = "vector-fastembed")]
pub use fastembed::FastEmbedProvider;

#[cfg(feature = "vector-lancedb")]
pub use lancedb::LancedbFactory;
