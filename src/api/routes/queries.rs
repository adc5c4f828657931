//! Query Routes
//!
//! - POST /api/v1/queries/:kind - Run query `kind` (1..=7) with its JSON
//!   arguments and return the result POD as JSON

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::query::{QueryRequest, QueryResponse};

/// POST /api/v1/queries/:kind
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<u8>,
    body: Option<Json<serde_json::Value>>,
) -> ApiResult<Json<QueryResponse>> {
    let args = body.map(|Json(v)| v).unwrap_or(serde_json::Value::Null);
    let request = QueryRequest::from_json(kind, args)?;
    tracing::debug!(?request, "Query received");

    let response = tokio::time::timeout(state.config.query_timeout, state.delivery.execute(&request))
        .await
        .map_err(|_| ApiError::QueryTimeout {
            kind,
            after: state.config.query_timeout,
        })??;

    Ok(Json(response))
}
