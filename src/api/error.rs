//! HTTP errors
//!
//! Every handler returns [`ApiResult`]. Errors render as
//! `{"error": {"code", "message"}, "request_id"}` with a matching status.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::query::QueryError;
use crate::schema::SchemaError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Rejected event or batch
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Unknown subscriber {0}")]
    UnknownSubscriber(u64),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Query {kind} gave no result within {after:?}")]
    QueryTimeout { kind: u8, after: Duration },

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Stored record bytes do not match the schema
    #[error("Corrupt record: {0}")]
    Record(#[from] SchemaError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidEvent(_) => (StatusCode::BAD_REQUEST, "INVALID_EVENT"),
            ApiError::UnknownSubscriber(_) => (StatusCode::NOT_FOUND, "UNKNOWN_SUBSCRIBER"),
            ApiError::Query(QueryError::UnknownQuery(_)) => (StatusCode::NOT_FOUND, "UNKNOWN_QUERY"),
            ApiError::Query(QueryError::InvalidArgument(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
            }
            ApiError::Query(QueryError::Closed(_)) => (StatusCode::SERVICE_UNAVAILABLE, "ENGINE_CLOSED"),
            ApiError::Query(_) => (StatusCode::INTERNAL_SERVER_ERROR, "QUERY_FAILED"),
            ApiError::QueryTimeout { .. } => (StatusCode::SERVICE_UNAVAILABLE, "QUERY_TIMEOUT"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_FAILED"),
            ApiError::Record(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPT_RECORD"),
            ApiError::Server(_) | ApiError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(%request_id, code, "{}", self);
        } else {
            tracing::debug!(%request_id, code, "{}", self);
        }

        let envelope = ErrorEnvelope {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
            request_id,
        };
        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::InvalidEvent("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::UnknownSubscriber(7), StatusCode::NOT_FOUND),
            (ApiError::Query(QueryError::UnknownQuery(9)), StatusCode::NOT_FOUND),
            (
                ApiError::Query(QueryError::InvalidArgument("alpha".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::QueryTimeout {
                    kind: 3,
                    after: Duration::from_secs(1),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Query(QueryError::Closed("delivery stopped".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Query(QueryError::Serialization("eof".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::Server("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_message() {
        assert_eq!(ApiError::UnknownSubscriber(7).to_string(), "Unknown subscriber 7");
        let timeout = ApiError::QueryTimeout {
            kind: 1,
            after: Duration::from_millis(500),
        };
        assert_eq!(timeout.to_string(), "Query 1 gave no result within 500ms");
    }
}
