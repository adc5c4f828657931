//! Query error types
//!
//! Errors raised while creating or running scan queries. Failures inside a
//! running query never escape as errors; they end up in the result payload.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// The schema lacks an attribute the query reads
    #[error("Attribute not in schema: {0}")]
    MissingAttribute(String),

    /// Query kind outside 1..=7
    #[error("Unknown query kind: {0}")]
    UnknownQuery(u8),

    /// Arguments rejected before the query was registered
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Result payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The communication layer shut down before the result arrived
    #[error("Query channel closed: {0}")]
    Closed(String),
}

impl From<bincode::Error> for QueryError {
    fn from(err: bincode::Error) -> Self {
        QueryError::Serialization(err.to_string())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
