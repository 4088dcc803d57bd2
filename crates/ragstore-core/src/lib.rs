//! ragstore core: shared error types and configuration.
//!
//! This crate provides the foundational types used across all ragstore
//! crates. It has no internal ragstore dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`config`]: Store configuration and embedding mode identifiers

pub mod config;
pub mod error;

// Re-export key types at crate root for convenience
pub use config::{EmbeddingMode, Options, ServerConfig, StoreConfig};
pub use error::{Error, Result};
