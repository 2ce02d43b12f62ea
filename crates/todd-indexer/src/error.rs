//! Error types for the indexer.

use thiserror::Error;
use todd_embed::EmbedError;

/// Result type alias for indexer operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised while producing a vector side effect.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedding request failed for good.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    /// Writing the vector failed.
    #[error("Vector storage failed: {0}")]
    Storage(String),

    /// The statement shape registry does not agree with the canonical statements.
    #[error("Statement shape error: {0}")]
    Shape(String),
}

impl From<todd_store::StoreError> for IndexError {
    fn from(e: todd_store::StoreError) -> Self {
        IndexError::Storage(e.to_string())
    }
}

impl From<tokio::task::JoinError> for IndexError {
    fn from(e: tokio::task::JoinError) -> Self {
        IndexError::Storage(format!("Vector write task failed: {}", e))
    }
}
