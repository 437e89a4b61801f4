//! emgrid_store: embedding records and the process-wide vector cache.
//!
//! Loads precomputed image embeddings from an append-only JSONL resource,
//! optionally compresses them with a variance-maximizing linear reduction,
//! and serves them keyed by id. Loading and reduction happen at most once
//! per (resource, target dimension) pair for the process lifetime.

use std::io;
use thiserror::Error;

mod record;
mod reduce;
mod store;

pub use record::{filename_stem, read_records, EmbeddingRecord};
pub use reduce::PrincipalComponents;
pub use store::{EmbeddingStore, StoreConfig};

/// Errors surfaced by record loading and vector lookup.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The embedding resource does not exist.
    #[error("embedding resource not found: {0}")]
    ResourceNotFound(String),
    /// A record line failed to parse, or record vector lengths disagree.
    #[error("malformed embedding record at {path}:{line}: {message}")]
    Format {
        path: String,
        line: usize,
        message: String,
    },
    /// Low-level IO failure while reading the resource.
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A requested id is absent from the loaded records.
    #[error("unknown id: {0}")]
    UnknownId(String),
    /// Numerical failure during dimensionality reduction.
    #[error("dimensionality reduction failed: {0}")]
    Reduction(String),
}
