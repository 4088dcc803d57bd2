//! Common types for the vector store.
//!
//! These types are shared by the façade, the backends and the embedding
//! providers, and are always available regardless of feature flags.

use ragstore_core::Options;
use serde::{Deserialize, Serialize};

use crate::filter::MetadataFilter;

/// Document metadata: string keys to scalar or nested JSON values,
/// kept in insertion order.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Documents
// ============================================================================

/// A document supplied by the caller for ingestion.
///
/// Documents are embedded once, at add time, and are immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Text to embed. Must be non-empty after trimming.
    pub text: String,

    /// Arbitrary metadata, returned with search hits and used for filtering.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,

    /// Caller-chosen identifier; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Document {
    /// Create a document with empty metadata and no id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
            id: None,
        }
    }

    /// Set an explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a metadata key-value pair.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A document as handed to a backend: id resolved, text and metadata
/// carried alongside the vector row at the same position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Resolved document identifier.
    pub id: String,

    /// Original text.
    pub text: String,

    /// Original metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Passage {
    /// Create a passage.
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }
}

// ============================================================================
// Search types
// ============================================================================

/// Parameters for a search call.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Query text (will be embedded).
    pub query: String,

    /// Maximum results to return; the store default applies when `None`.
    pub top_k: Option<usize>,

    /// Post-filter applied to the backend's raw hits.
    pub metadata_filter: Option<MetadataFilter>,

    /// Backend-specific search options, forwarded verbatim.
    pub backend_options: Options,
}

impl SearchRequest {
    /// Create a request for the given query text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set the result limit.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set the metadata filter.
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.metadata_filter = Some(filter);
        self
    }

    /// Add a backend search option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.backend_options.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for SearchRequest {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

impl From<String> for SearchRequest {
    fn from(query: String) -> Self {
        Self::new(query)
    }
}

/// A single ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Document identifier.
    pub id: String,

    /// Stored document text.
    pub text: String,

    /// Stored document metadata.
    #[serde(default)]
    pub metadata: Metadata,

    /// Similarity score; higher is more similar.
    pub score: f32,
}

// ============================================================================
// Backend attributes
// ============================================================================

/// Element type a backend stores vectors in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// 32-bit floats.
    #[default]
    Float32,
    /// 16-bit floats.
    Float16,
}

impl Dtype {
    /// The canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float16 => "float16",
        }
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
    fn test_document_new_minimal() {
        let doc = Document::new("Test document");
        assert_eq!(doc.text, "Test document");
        assert!(doc.metadata.is_empty());
        assert!(doc.id.is_none());
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new("Test")
            .with_id("doc_123")
            .with_metadata("source", "test.txt")
            .with_metadata("page", 1);

        assert_eq!(doc.id.as_deref(), Some("doc_123"));
        assert_eq!(doc.metadata["source"], "test.txt");
        assert_eq!(doc.metadata["page"], 1);
    }

    #[test]
    fn test_document_metadata_keeps_insertion_order() {
        let doc = Document::new("x")
            .with_metadata("zeta", 1)
            .with_metadata("alpha", 2)
            .with_metadata("mid", 3);

        let keys: Vec<&str> = doc.metadata.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_document_unicode_round_trip() {
        let doc = Document::new("测试 🚀 émojis").with_metadata("unicode", "测试");
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_document_serialization_skips_empty() {
        let json = serde_json::to_string(&Document::new("text")).unwrap();
        assert!(!json.contains("metadata"));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_search_request_builder() {
        let request = SearchRequest::new("semantic query")
            .with_top_k(3)
            .with_option("complexity", 64);

        assert_eq!(request.query, "semantic query");
        assert_eq!(request.top_k, Some(3));
        assert!(request.metadata_filter.is_none());
        assert_eq!(request.backend_options["complexity"], 64);
    }

    #[test]
    fn test_dtype_serialization() {
        assert_eq!(serde_json::to_string(&Dtype::Float32).unwrap(), "\"float32\"");
        assert_eq!(Dtype::Float16.as_str(), "float16");
        assert_eq!(Dtype::default(), Dtype::Float32);
    }
}
