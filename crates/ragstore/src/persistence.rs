//! Index metadata persistence.
//!
//! Every saved index has a JSON sidecar at `<index_path>.meta.json`
//! describing how it was built: backend, embedding model and mode, vector
//! shape, and how many documents have ever been added (which seeds id
//! generation after a reload).
//!
//! Writes go through [`write_atomic`]: the bytes land in a temporary file
//! next to the target and are renamed over it, so a crash never leaves a
//! half-written file behind.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use ragstore_core::{EmbeddingMode, Error, Result};
use serde::{Deserialize, Serialize};

use crate::types::Dtype;

/// Suffix appended to an index path to locate its metadata.
pub const META_SUFFIX: &str = ".meta.json";

/// Metadata stored alongside a saved index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Registered backend name.
    pub backend: String,

    /// Model the vectors were computed with.
    pub embedding_model: String,

    /// Provider family the model was served by.
    pub embedding_mode: EmbeddingMode,

    /// Vector width.
    pub embedding_dim: usize,

    /// Vector element type.
    #[serde(default)]
    pub dtype: Dtype,

    /// Documents currently in the index.
    pub document_count: usize,

    /// Documents ever added, including deleted ones.
    #[serde(default)]
    pub documents_added: u64,

    /// Save timestamp (RFC 3339).
    pub built_at: String,
}

/// Path of the metadata file for `index_path`.
pub fn meta_path(index_path: &Path) -> PathBuf {
    let mut name = OsString::from(index_path.as_os_str());
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

/// Save metadata for the index at `index_path`.
pub fn save_meta(index_path: &Path, meta: &IndexMeta) -> Result<()> {
    let json = serde_json::to_vec_pretty(meta)?;
    write_atomic(&meta_path(index_path), &json)
}

/// Load metadata for the index at `index_path`.
pub fn load_meta(index_path: &Path) -> Result<IndexMeta> {
    let path = meta_path(index_path);
    let json = std::fs::read_to_string(&path).map_err(|e| Error::io_with_path(e, &path))?;
    Ok(serde_json::from_str(&json)?)
}

/// Load metadata if the file exists.
pub fn load_meta_if_exists(index_path: &Path) -> Result<Option<IndexMeta>> {
    if meta_path(index_path).exists() {
        load_meta(index_path).map(Some)
    } else {
        Ok(None)
    }
}

/// Replace `path` with `bytes` via a temporary file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }

    let mut tmp_name = OsString::from(path.as_os_str());
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let written = std::fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::io_with_path(e, &tmp));
    }

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        Error::io_with_path(e, path)
    })
}

/// Current time in the format stored in [`IndexMeta::built_at`].
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============================================================================
// Tests
// ============================================================================
