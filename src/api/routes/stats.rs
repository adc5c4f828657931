//! Stats Routes
//!
//! - GET /api/v1/stats - Controller, event processing and index statistics

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{CampaignSummary, SchemaSummary, StatsResponse};
use crate::api::state::AppState;

/// GET /api/v1/stats
///
/// Latency figures cover the whole uptime; they are not reset by reading.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let campaigns = state.campaigns();
    Json(StatsResponse {
        controller: state.controller().stats(),
        processor: state.processor.stats(),
        latency: state.processor.latency().snapshot(),
        schema: SchemaSummary {
            attributes: state.schema().len(),
            record_size: state.schema().total_size(),
        },
        campaigns: CampaignSummary {
            campaigns: campaigns.campaigns().len(),
            predicates: campaigns.num_predicates(),
            entry_indexes: campaigns.num_entry_indexes(),
            indexed_conjuncts: campaigns.num_indexed(),
            unindexed_conjuncts: campaigns.num_unindexed(),
        },
        uptime_seconds: state.uptime_seconds(),
    })
}
