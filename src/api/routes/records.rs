//! Record Routes
//!
//! - GET /api/v1/records/:id - Full record of one subscriber, decoded into
//!   named analytics attributes and dimension values

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{AttributeValue, DimensionValue, RecordResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::schema::{DimensionAttribute, DimensionRecord, RecordView};

/// GET /api/v1/records/:id
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<RecordResponse>> {
    let full = state
        .controller()
        .read_full_record(id)
        .ok_or(ApiError::UnknownSubscriber(id))?;

    let am_size = state.controller().layout().am_size();
    let (am, dim) = full.split_at(am_size);
    let attributes = state
        .schema()
        .decode(am)?
        .into_iter()
        .map(|(name, value)| AttributeValue::new(name, value))
        .collect();

    let dim = DimensionRecord::from_bytes(dim)
        .ok_or_else(|| ApiError::Server(format!("malformed dimension record of {}", id)))?;
    let dimensions = DimensionAttribute::all()
        .into_iter()
        .map(|attr| {
            let value = dim.get(attr);
            DimensionValue {
                name: attr.name().to_string(),
                id: value,
                label: attr.value_name(value).map(str::to_string),
            }
        })
        .collect();

    Ok(Json(RecordResponse {
        subscriber_id: id,
        last_updated: RecordView::new(am).timestamp(),
        attributes,
        dimensions,
    }))
}
