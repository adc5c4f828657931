//! Campaign index error types

use thiserror::Error;

use crate::schema::DataType;

/// Errors raised while building the campaign index
#[derive(Error, Debug)]
pub enum CampaignError {
    /// Operator string not in lt/lte/e/gre/gr
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// Constant could not be parsed as its data type
    #[error("Invalid {data_type} constant: {value}")]
    InvalidConstant { data_type: DataType, value: String },

    /// Predicate reads past the end of the record
    #[error("Predicate at offset {offset} does not fit a {record_size}-byte record")]
    OffsetOutOfRange { offset: usize, record_size: usize },

    /// Predicate constant and attribute disagree on the type
    #[error("Attribute at offset {offset} is {expected}, predicate constant is {actual}")]
    TypeMismatch {
        offset: usize,
        expected: DataType,
        actual: DataType,
    },

    #[error("Unknown predicate: {0}")]
    UnknownPredicate(usize),

    #[error("Unknown campaign: {0}")]
    UnknownCampaign(u32),

    #[error("Duplicate campaign: {0}")]
    DuplicateCampaign(u32),

    /// Firing interval string not recognised
    #[error("Unknown firing policy: {0}")]
    UnknownFiringPolicy(String),
}

/// Result type alias for campaign index construction
pub type CampaignResult<T> = Result<T, CampaignError>;
