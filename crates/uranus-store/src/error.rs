//! Store error types

use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
