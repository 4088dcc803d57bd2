//! Brute-force `flat` backend.
//!
//! Keeps every vector in memory and scores queries by cosine similarity
//! against all of them. Exact, dependency-free, and fast enough for
//! indices up to a few hundred thousand rows; it is also the backend the
//! store falls back to by default.
//!
//! The index file is a MessagePack snapshot of all entries, replaced
//! atomically on every build and save.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ragstore_core::{Error, Options, Result};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendFactory, IndexBuilder, IndexSearcher, MODEL_OPTION};
use crate::matrix::EmbeddingMatrix;
use crate::persistence::write_atomic;
use crate::types::{Metadata, Passage, SearchResult};

/// Registry name of this backend.
pub const BACKEND_NAME: &str = "flat";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlatEntry {
    id: String,
    text: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlatSnapshot {
    version: u32,
    model_name: String,
    dim: usize,
    entries: Vec<FlatEntry>,
}

/// Entries plus the vector width they share.
#[derive(Debug, Default)]
struct FlatTable {
    dim: usize,
    entries: Vec<FlatEntry>,
}

impl FlatTable {
    /// Insert rows, replacing entries whose id already exists in place.
    fn upsert(&mut self, vectors: &EmbeddingMatrix, passages: &[Passage]) -> Result<()> {
        if vectors.len() != passages.len() {
            return Err(Error::invalid_data(format!(
                "{} vectors for {} passages",
                vectors.len(),
                passages.len()
            )));
        }
        if vectors.is_empty() {
            return Ok(());
        }
        if !self.entries.is_empty() && vectors.dim() != self.dim {
            return Err(Error::invalid_data(format!(
                "vector width {} does not match index width {}",
                vectors.dim(),
                self.dim
            )));
        }
        self.dim = vectors.dim();

        for (vector, passage) in vectors.iter_rows().zip(passages) {
            let entry = FlatEntry {
                id: passage.id.clone(),
                text: passage.text.clone(),
                metadata: passage.metadata.clone(),
                vector: vector.to_vec(),
            };
            match self.entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry,
                None => self.entries.push(entry),
            }
        }
        Ok(())
    }

    fn write(&self, path: &Path, model_name: &str) -> Result<()> {
        let snapshot = FlatSnapshot {
            version: SNAPSHOT_VERSION,
            model_name: model_name.to_string(),
            dim: self.dim,
            entries: self.entries.clone(),
        };
        let bytes = rmp_serde::to_vec_named(&snapshot)
            .map_err(|e| Error::serialization(format!("failed to encode flat index: {e}")))?;
        write_atomic(path, &bytes)
    }

    fn read(path: &Path) -> Result<(Self, String)> {
        let bytes = std::fs::read(path).map_err(|e| Error::io_with_path(e, path))?;
        let snapshot: FlatSnapshot = rmp_serde::from_slice(&bytes).map_err(|e| {
            Error::serialization(format!("corrupt flat index {}: {e}", path.display()))
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::invalid_data(format!(
                "unsupported flat index version {} in {}",
                snapshot.version,
                path.display()
            )));
        }
        Ok((
            Self {
                dim: snapshot.dim,
                entries: snapshot.entries,
            },
            snapshot.model_name,
        ))
    }
}

fn model_from_options(options: &Options) -> String {
    options
        .get(MODEL_OPTION)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Cosine similarity; zero when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

// ============================================================================
// Factory
// ============================================================================

/// Factory for the `flat` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatFactory;

impl BackendFactory for FlatFactory {
    fn builder(&self, options: &Options) -> Result<Box<dyn IndexBuilder>> {
        Ok(Box::new(FlatBuilder {
            model_name: model_from_options(options),
            table: FlatTable::default(),
        }))
    }

    fn searcher(&self, index_path: &Path, options: &Options) -> Result<Box<dyn IndexSearcher>> {
        Ok(Box::new(FlatSearcher {
            index_path: index_path.to_path_buf(),
            model_name: model_from_options(options),
            table: FlatTable::default(),
        }))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Write side of the `flat` backend.
#[derive(Debug)]
pub struct FlatBuilder {
    model_name: String,
    table: FlatTable,
}

#[async_trait]
impl IndexBuilder for FlatBuilder {
    async fn build(
        &mut self,
        vectors: &EmbeddingMatrix,
        passages: &[Passage],
        index_path: &Path,
        _options: &Options,
    ) -> Result<()> {
        self.table.upsert(vectors, passages)?;
        self.table.write(index_path, &self.model_name)?;
        log::debug!(
            "flat index at {} now holds {} entries",
            index_path.display(),
            self.table.entries.len()
        );
        Ok(())
    }

    fn count(&self) -> usize {
        self.table.entries.len()
    }
}

// ============================================================================
// Searcher
// ============================================================================

/// Read side of the `flat` backend.
#[derive(Debug)]
pub struct FlatSearcher {
    index_path: PathBuf,
    model_name: String,
    table: FlatTable,
}

#[async_trait]
impl IndexSearcher for FlatSearcher {
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        _options: &Options,
    ) -> Result<Vec<SearchResult>> {
        if self.table.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.table.dim {
            return Err(Error::invalid_data(format!(
                "query width {} does not match index width {}",
                query.len(),
                self.table.dim
            )));
        }

        let mut scored: Vec<(f32, &FlatEntry)> = self
            .table
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.vector), entry))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| SearchResult {
                id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn delete(&mut self, ids: &[String]) -> Result<bool> {
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.table.entries.len();
        self.table.entries.retain(|e| !doomed.contains(e.id.as_str()));
        Ok(self.table.entries.len() != before)
    }

    fn supports_insert(&self) -> bool {
        true
    }

    async fn insert(&mut self, vectors: &EmbeddingMatrix, passages: &[Passage]) -> Result<()> {
        self.table.upsert(vectors, passages)
    }

    async fn save(&mut self) -> Result<()> {
        self.table.write(&self.index_path, &self.model_name)
    }

    async fn load(&mut self) -> Result<()> {
        let (table, model_name) = FlatTable::read(&self.index_path)?;
        self.table = table;
        if !model_name.is_empty() {
            self.model_name = model_name;
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.table.entries.len()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embedding_dim(&self) -> usize {
        self.table.dim
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn passages(ids: &[&str]) -> Vec<Passage> {
        ids.iter()
            .map(|id| {
                let mut metadata = Metadata::new();
                metadata.insert("source".into(), format!("{id}.txt").into());
                Passage::new(*id, format!("text {id}"), metadata)
            })
            .collect()
    }

    fn matrix(rows: Vec<Vec<f32>>) -> EmbeddingMatrix {
        EmbeddingMatrix::from_rows(rows).unwrap()
    }

    fn model_options() -> Options {
        let mut options = Options::new();
        options.insert(MODEL_OPTION.into(), "mock".into());
        options
    }

    async fn built_searcher(dir: &Path) -> Box<dyn IndexSearcher> {
        let path = dir.join("flat.index");
        let mut builder = FlatFactory.builder(&model_options()).unwrap();
        builder
            .build(
                &matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]]),
                &passages(&["x", "y", "xy"]),
                &path,
                &Options::new(),
            )
            .await
            .unwrap();
        assert_eq!(builder.count(), 3);

        let mut searcher = FlatFactory.searcher(&path, &Options::new()).unwrap();
        searcher.load().await.unwrap();
        searcher
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_build_load_search() {
        let dir = tempdir().unwrap();
        let searcher = built_searcher(dir.path()).await;

        assert_eq!(searcher.count(), 3);
        assert_eq!(searcher.embedding_dim(), 2);
        assert_eq!(searcher.model_name(), "mock");

        let hits = searcher.search(&[1.0, 0.1], 2, &Options::new()).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "x");
        assert_eq!(hits[1].id, "xy");
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].text, "text x");
        assert_eq!(hits[0].metadata["source"], "x.txt");
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ties.index");
        let mut builder = FlatFactory.builder(&Options::new()).unwrap();
        builder
            .build(
                &matrix(vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]]),
                &passages(&["first", "second", "third"]),
                &path,
                &Options::new(),
            )
            .await
            .unwrap();

        let mut searcher = FlatFactory.searcher(&path, &Options::new()).unwrap();
        searcher.load().await.unwrap();
        let ids: Vec<String> = searcher
            .search(&[1.0, 0.0], 3, &Options::new())
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_query_width_mismatch() {
        let dir = tempdir().unwrap();
        let searcher = built_searcher(dir.path()).await;
        let err = searcher.search(&[1.0, 0.0, 0.0], 1, &Options::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_delete_then_save_and_reload() {
        let dir = tempdir().unwrap();
        let mut searcher = built_searcher(dir.path()).await;

        assert!(searcher.delete(&["y".to_string()]).await.unwrap());
        assert!(!searcher.delete(&["missing".to_string()]).await.unwrap());
        assert_eq!(searcher.count(), 2);
        searcher.save().await.unwrap();

        let mut reloaded = FlatFactory
            .searcher(&dir.path().join("flat.index"), &Options::new())
            .unwrap();
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.count(), 2);
    }

    #[tokio::test]
    async fn test_insert_after_load_upserts() {
        let dir = tempdir().unwrap();
        let mut searcher = built_searcher(dir.path()).await;
        assert!(searcher.supports_insert());

        searcher
            .insert(&matrix(vec![vec![0.0, 1.0], vec![0.5, 0.5]]), &passages(&["x", "new"]))
            .await
            .unwrap();
        assert_eq!(searcher.count(), 4);

        let top = searcher.search(&[0.0, 1.0], 1, &Options::new()).await.unwrap();
        // "x" was replaced in place and now ties with "y"; it is older.
        assert_eq!(top[0].id, "x");
        assert!((top[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_insert_width_mismatch() {
        let dir = tempdir().unwrap();
        let mut searcher = built_searcher(dir.path()).await;
        let err = searcher
            .insert(&matrix(vec![vec![1.0, 0.0, 0.0]]), &passages(&["z"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let mut searcher = FlatFactory
            .searcher(&dir.path().join("none.index"), &Options::new())
            .unwrap();
        assert!(searcher.load().await.is_err());
    }

    #[tokio::test]
    async fn test_load_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.index");
        std::fs::write(&path, b"\x00\x01garbage").unwrap();
        let mut searcher = FlatFactory.searcher(&path, &Options::new()).unwrap();
        assert!(matches!(
            searcher.load().await.unwrap_err(),
            Error::Serialization(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_index_search() {
        let dir = tempdir().unwrap();
        let searcher = FlatFactory
            .searcher(&dir.path().join("empty.index"), &Options::new())
            .unwrap();
        assert!(searcher.search(&[1.0], 5, &Options::new()).await.unwrap().is_empty());
    }
}
