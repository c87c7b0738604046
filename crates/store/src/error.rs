//! Store error taxonomy

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt data in {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] vigia_core::Error),
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
