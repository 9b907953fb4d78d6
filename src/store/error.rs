use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`VectorStore`](super::VectorStore) operations.
///
/// Every variant carries enough context (operation, record count) for a caller
/// to decide whether to retry or alert. None of them leave the corpus partially
/// mutated.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("embedding provider failed during {operation} ({records} records): {reason}")]
    EmbeddingProvider {
        operation: &'static str,
        records: usize,
        reason: String,
    },

    #[error("dimension mismatch: corpus holds {expected}-dim vectors, batch has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("persistence failed during {operation} ({records} records): {reason}")]
    Persistence {
        operation: &'static str,
        records: usize,
        reason: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{operation} timed out after {after:?} ({records} records)")]
    Timeout {
        operation: &'static str,
        records: usize,
        after: Duration,
    },
}

impl StoreError {
    pub(crate) fn provider(operation: &'static str, records: usize, err: impl std::fmt::Display) -> Self {
        Self::EmbeddingProvider {
            operation,
            records,
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn persistence(
        operation: &'static str,
        records: usize,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::Persistence {
            operation,
            records,
            reason: format!("{err:#}"),
        }
    }
}
