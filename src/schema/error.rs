//! Schema error types

use thiserror::Error;

/// Errors raised while building or applying a schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The same (metric, aggregation, filter, window) appears twice
    #[error("Duplicate attribute: {0}")]
    DuplicateAttribute(String),

    /// Record length does not match the schema
    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Metadata describes something the engine cannot represent
    #[error("Unsupported attribute definition: {0}")]
    Unsupported(String),

    /// Event bytes could not be decoded
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

/// Result type alias for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
