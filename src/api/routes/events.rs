//! Event Routes
//!
//! Endpoints feeding call events into the event processor. Events are queued
//! by caller and applied by the processing threads.
//!
//! - POST /api/v1/events - Single event
//! - POST /api/v1/events/batch - Batch of events

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{BatchEventRequest, EventRequest, EventResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::schema::{Event, MSECS_PER_WEEK};

/// POST /api/v1/events
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EventRequest>,
) -> ApiResult<(StatusCode, Json<EventResponse>)> {
    let event = validate_event(req, Utc::now().timestamp_millis())
        .map_err(|err| ApiError::InvalidEvent(err.to_string()))?;
    state.processor.enqueue_updates(&[event]);

    Ok((
        StatusCode::ACCEPTED,
        Json(EventResponse {
            status: "queued".to_string(),
            accepted: 1,
        }),
    ))
}

/// POST /api/v1/events/batch
pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchEventRequest>,
) -> ApiResult<(StatusCode, Json<EventResponse>)> {
    if req.events.is_empty() {
        return Err(ApiError::InvalidEvent("empty batch".to_string()));
    }
    if req.events.len() > state.config.max_batch_size {
        return Err(ApiError::InvalidEvent(format!(
            "batch exceeds the maximum of {} events",
            state.config.max_batch_size
        )));
    }

    let now = Utc::now().timestamp_millis();
    let events = req
        .events
        .into_iter()
        .enumerate()
        .map(|(i, e)| {
            validate_event(e, now).map_err(|err| ApiError::InvalidEvent(format!("event {}: {}", i, err)))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let accepted = events.len();
    state.processor.enqueue_updates(&events);
    tracing::debug!(accepted, "Queued event batch");

    Ok((
        StatusCode::ACCEPTED,
        Json(EventResponse {
            status: "queued".to_string(),
            accepted,
        }),
    ))
}

/// Window arithmetic adds at most one week to an event timestamp
const MAX_EVENT_TIMESTAMP: i64 = i64::MAX - MSECS_PER_WEEK;

fn validate_event(req: EventRequest, now: i64) -> Result<Event, &'static str> {
    if !req.cost.is_finite() || req.cost < 0.0 {
        return Err("cost must be a finite, non-negative number");
    }
    if req.timestamp.is_some_and(|ts| ts < 0) {
        return Err("timestamp must not be negative");
    }
    if req.timestamp.is_some_and(|ts| ts > MAX_EVENT_TIMESTAMP) {
        return Err("timestamp out of range");
    }
    Ok(req.into_event(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(timestamp: Option<i64>) -> EventRequest {
        EventRequest {
            caller_id: 1,
            callee_id: 2,
            call_id: 3,
            duration: 60,
            cost: 1.5,
            long_distance: false,
            timestamp,
        }
    }

    #[test]
    fn test_validate_event_timestamp_range() {
        let event = validate_event(request(None), 1_000).unwrap();
        assert_eq!(event.timestamp, 1_000);
        assert!(validate_event(request(Some(MAX_EVENT_TIMESTAMP)), 0).is_ok());

        assert_eq!(
            validate_event(request(Some(MAX_EVENT_TIMESTAMP + 1)), 0).unwrap_err(),
            "timestamp out of range"
        );
        assert!(validate_event(request(Some(i64::MAX)), 0).is_err());
        assert!(validate_event(request(Some(-1)), 0).is_err());
    }
}
