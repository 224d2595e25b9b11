//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause (database, encoding, etc.).

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (e.g., directory creation failure).
    #[error("internal error: {0}")]
    Internal(String),
}
