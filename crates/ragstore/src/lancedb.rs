//! LanceDB backend.
//!
//! Stores passages in a LanceDB table under the index path and answers
//! queries with LanceDB's vector search.
//!
//! # Schema
//!
//! | Column | Type | Purpose |
//! |--------|------|---------|
//! | `id` | Utf8 | Document identifier |
//! | `text` | Utf8 | Original text |
//! | `metadata` | Utf8 | JSON-serialized metadata |
//! | `vector` | FixedSizeList<Float32> | Embedding |
//!
//! # Options
//!
//! - `table_name`: table inside the database directory (default `passages`)
//! - `where` (search only): a LanceDB SQL predicate applied before ranking
//!
//! Requires the `vector-lancedb` feature.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use ragstore_core::{Error, Options, Result};

use crate::backend::{BackendFactory, IndexBuilder, IndexSearcher, MODEL_OPTION};
use crate::matrix::EmbeddingMatrix;
use crate::types::{Metadata, Passage, SearchResult};

/// Registry name of this backend.
pub const BACKEND_NAME: &str = "lancedb";

const DEFAULT_TABLE: &str = "passages";

fn lance_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::backend(BACKEND_NAME, format!("{context}: {e}"))
}

fn string_option(options: &Options, key: &str) -> Option<String> {
    options.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn table_name(options: &Options) -> String {
    string_option(options, "table_name").unwrap_or_else(|| DEFAULT_TABLE.to_string())
}

async fn connect(index_path: &Path) -> Result<lancedb::Connection> {
    let uri = index_path.to_string_lossy();
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| lance_err("failed to connect", e))
}

async fn append(table: &lancedb::Table, batch: RecordBatch) -> Result<()> {
    let schema = batch.schema();
    let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
    table
        .add(Box::new(batches))
        .execute()
        .await
        .map_err(|e| lance_err("failed to append rows", e))?;
    Ok(())
}

// ============================================================================
// Factory
// ============================================================================

/// Factory for the `lancedb` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LancedbFactory;

impl BackendFactory for LancedbFactory {
    fn builder(&self, options: &Options) -> Result<Box<dyn IndexBuilder>> {
        Ok(Box::new(LancedbBuilder {
            table_name: table_name(options),
            table: None,
            count: 0,
        }))
    }

    fn searcher(&self, index_path: &Path, options: &Options) -> Result<Box<dyn IndexSearcher>> {
        Ok(Box::new(LancedbSearcher {
            index_path: index_path.to_path_buf(),
            table_name: table_name(options),
            model_name: string_option(options, MODEL_OPTION).unwrap_or_default(),
            table: None,
            count: 0,
            dim: 0,
        }))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Write side of the `lancedb` backend.
pub struct LancedbBuilder {
    table_name: String,
    table: Option<lancedb::Table>,
    count: usize,
}

#[async_trait]
impl IndexBuilder for LancedbBuilder {
    async fn build(
        &mut self,
        vectors: &EmbeddingMatrix,
        passages: &[Passage],
        index_path: &Path,
        _options: &Options,
    ) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        let batch = build_record_batch(vectors, passages)?;

        match &self.table {
            Some(table) => append(table, batch).await?,
            None => {
                let connection = connect(index_path).await?;
                let schema = batch.schema();
                let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
                let table = connection
                    .create_table(&self.table_name, Box::new(batches))
                    .mode(lancedb::database::CreateTableMode::Overwrite)
                    .execute()
                    .await
                    .map_err(|e| lance_err("failed to create table", e))?;
                self.table = Some(table);
            }
        }
        self.count += passages.len();
        Ok(())
    }

    fn count(&self) -> usize {
        self.count
    }
}

// ============================================================================
// Searcher
// ============================================================================

/// Read side of the `lancedb` backend.
pub struct LancedbSearcher {
    index_path: PathBuf,
    table_name: String,
    model_name: String,
    table: Option<lancedb::Table>,
    count: usize,
    dim: usize,
}

impl LancedbSearcher {
    fn table(&self) -> Result<&lancedb::Table> {
        self.table
            .as_ref()
            .ok_or_else(|| Error::backend(BACKEND_NAME, "index not loaded"))
    }

    async fn refresh_count(&mut self) -> Result<()> {
        self.count = self
            .table()?
            .count_rows(None)
            .await
            .map_err(|e| lance_err("failed to count rows", e))?;
        Ok(())
    }
}

#[async_trait]
impl IndexSearcher for LancedbSearcher {
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        options: &Options,
    ) -> Result<Vec<SearchResult>> {
        if self.count == 0 || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut search = self
            .table()?
            .vector_search(query.to_vec())
            .map_err(|e| lance_err("failed to create vector search", e))?
            .limit(top_k);
        if let Some(predicate) = string_option(options, "where") {
            search = search.only_if(predicate);
        }

        let batches: Vec<RecordBatch> = search
            .execute()
            .await
            .map_err(|e| lance_err("vector search failed", e))?
            .try_collect()
            .await
            .map_err(|e| lance_err("failed to collect results", e))?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(parse_search_results(batch)?);
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete(&mut self, ids: &[String]) -> Result<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        let before = self.count;
        self.table()?
            .delete(&id_predicate(ids))
            .await
            .map_err(|e| lance_err("delete failed", e))?;
        self.refresh_count().await?;
        Ok(self.count < before)
    }

    fn supports_insert(&self) -> bool {
        true
    }

    async fn insert(&mut self, vectors: &EmbeddingMatrix, passages: &[Passage]) -> Result<()> {
        if self.dim != 0 && vectors.dim() != self.dim {
            return Err(Error::invalid_data(format!(
                "vector width {} does not match index width {}",
                vectors.dim(),
                self.dim
            )));
        }
        append(self.table()?, build_record_batch(vectors, passages)?).await?;
        self.refresh_count().await
    }

    async fn save(&mut self) -> Result<()> {
        // Every write above is already committed to the dataset.
        self.table()?;
        Ok(())
    }

    async fn load(&mut self) -> Result<()> {
        let connection = connect(&self.index_path).await?;
        let table = connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| lance_err("failed to open table", e))?;
        let schema = table
            .schema()
            .await
            .map_err(|e| lance_err("failed to read schema", e))?;
        self.dim = vector_width(&schema).unwrap_or_default();
        self.table = Some(table);
        self.refresh_count().await
    }

    fn count(&self) -> usize {
        self.count
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }
}

// ============================================================================
// Arrow schema and batches
// ============================================================================

fn make_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ]))
}

fn vector_width(schema: &Schema) -> Option<usize> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
        _ => None,
    }
}

fn build_record_batch(vectors: &EmbeddingMatrix, passages: &[Passage]) -> Result<RecordBatch> {
    if vectors.len() != passages.len() {
        return Err(Error::invalid_data(format!(
            "{} vectors for {} passages",
            vectors.len(),
            passages.len()
        )));
    }
    let dimension = i32::try_from(vectors.dim())
        .map_err(|_| Error::invalid_data(format!("vector width {} too large", vectors.dim())))?;

    let ids: Vec<&str> = passages.iter().map(|p| p.id.as_str()).collect();
    let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
    let metadata = passages
        .iter()
        .map(|p| serde_json::to_string(&p.metadata))
        .collect::<std::result::Result<Vec<String>, _>>()?;
    let metadata_refs: Vec<&str> = metadata.iter().map(String::as_str).collect();

    let vector_array = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension,
        Arc::new(Float32Array::from(vectors.as_slice().to_vec())),
        None,
    )
    .map_err(|e| lance_err("failed to create vector array", e))?;

    RecordBatch::try_new(
        make_schema(dimension),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(metadata_refs)),
            Arc::new(vector_array),
        ],
    )
    .map_err(|e| lance_err("failed to create record batch", e))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::backend(BACKEND_NAME, format!("missing '{name}' column in results")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::backend(BACKEND_NAME, format!("'{name}' column is not Utf8")))
}

fn parse_search_results(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let distance = distances.map(|c| c.value(i)).unwrap_or(0.0);
        results.push(SearchResult {
            id: ids.value(i).to_string(),
            text: texts.value(i).to_string(),
            metadata: serde_json::from_str::<Metadata>(metadata.value(i)).unwrap_or_default(),
            score: 1.0 / (1.0 + distance),
        });
    }
    Ok(results)
}

fn id_predicate(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect();
    format!("id IN ({})", quoted.join(", "))
}

// ============================================================================
// Tests
// ============================================================================
