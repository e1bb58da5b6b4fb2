//! Error types for snapshot storage operations.

use thiserror::Error;

/// Result type for snapshot-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors a [`crate::SnapshotStore`] backend can produce.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No snapshot exists for the requested execution.
    #[error("snapshot not found for execution: {0}")]
    NotFound(String),

    /// JSON serialization of the snapshot body failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization of the snapshot body failed.
    #[error("binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// The storage backend itself reported a failure (connection, query, I/O).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored record failed a structural sanity check on read.
    #[error("invalid snapshot record: {0}")]
    Invalid(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}
