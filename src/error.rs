//! Error types for the selection pipeline.
//!
//! Malformed documents and degenerate statistics are not errors: the former are
//! skipped and tallied, the latter score 0. What remains here are failures of the
//! surroundings (I/O, serialization) and caller mistakes (bad options).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Options that cannot drive a run (zero partitions, K of zero, ...).
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Workers produced shard sets for different partition counts.
    #[error("Partition layout mismatch: expected {expected} shards, got {found}")]
    PartitionLayout { expected: usize, found: usize },

    /// A worker's shard set holds an index out of range or the same index twice.
    #[error("Invalid shard index {index} for {partitions} partitions")]
    ShardIndex { index: usize, partitions: usize },

    /// No input files were found under the given path.
    #[error("No input files found at {0}")]
    NoInput(PathBuf),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
