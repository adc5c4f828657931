//! Probes
//!
//! - GET /health/live - process is up
//! - GET /health/ready - event backlog below ten full batches
//! - GET /health - shard, record and backlog summary

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if backlogged(&state) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let controller = state.controller().stats();
    let queued_events = state.processor.stats().queued_events;
    let status = match (controller.shards.is_empty(), backlogged(&state)) {
        (true, _) => "unhealthy",
        (false, true) => "degraded",
        (false, false) => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        shards: controller.shards.len(),
        records: controller.total_records(),
        queued_events,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn backlogged(state: &AppState) -> bool {
    state.processor.stats().queued_events > state.config.max_batch_size.saturating_mul(10)
}
