//! Storage error types
//!
//! Defines the recoverable errors of the storage layer. Layout violations on
//! the hot path are assertions, not errors.

use thiserror::Error;

use crate::schema::SchemaError;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// A record did not have the expected byte length
    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    RecordSize { expected: usize, actual: usize },

    /// Column requested with the wrong element type
    #[error("Column {column} is {actual}, not {requested}")]
    ColumnType {
        column: usize,
        actual: &'static str,
        requested: &'static str,
    },

    /// Shard index out of range
    #[error("Shard {0} does not exist")]
    UnknownShard(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker thread could not be spawned or joined
    #[error("Worker error: {0}")]
    Worker(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Worker(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
