//! Storage boundary: the persisted usage document.
//!
//! The document holds the latest percentage of every cap, the bounded
//! sample history and, as an advisory annex, the projections computed on
//! the last run. Older on-disk layouts are migrated once on load.

mod document;
mod file;
mod migrate;

use std::path::PathBuf;

use thiserror::Error;

pub use document::{CapMetric, HistoryPoint, Metrics, UsageDocument, ValidationIssue};
pub use file::DataFile;
pub use migrate::migrate;

/// Current schema version of the usage document
pub const SCHEMA_VERSION: &str = "2.0.0";

/// Errors raised while loading or saving the usage document
#[derive(Debug, Error)]
pub enum StoreError {
    /// The data file could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The data file could not be written
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The data file is not valid JSON or does not match the schema
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document could not be serialized
    #[error("failed to serialize usage document: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The document was written by a newer, incompatible version
    #[error("unsupported schema version {found} (newest supported is {})", SCHEMA_VERSION)]
    UnsupportedSchema { found: String },

    /// The top-level JSON value has an unexpected shape
    #[error("unrecognized usage document layout: {0}")]
    Layout(String),
}
