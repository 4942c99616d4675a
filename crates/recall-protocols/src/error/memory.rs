//! Memory engine errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Memory content must not be empty")]
    EmptyContent,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl MemoryError {
    /// Whether the error was caused by caller input rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::EmptyContent)
    }
}
