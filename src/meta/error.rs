//! Metadata store error types

use thiserror::Error;

use crate::campaign::CampaignError;
use crate::schema::SchemaError;

/// Errors raised while creating, filling or loading the metadata store
#[derive(Error, Debug)]
pub enum MetaError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Campaign(#[from] CampaignError),

    /// Rows that do not describe a valid schema or campaign
    #[error("Invalid metadata: {0}")]
    Invalid(String),
}

/// Result type alias for metadata operations
pub type MetaResult<T> = Result<T, MetaError>;
