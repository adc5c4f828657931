//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::schema::{Event, Value};
use crate::sep::{LatencyReport, ProcessorStats};
use crate::storage::ControllerStats;

// ============================================
// EVENT DTOs
// ============================================

/// One call event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    /// Subscriber whose record is updated
    pub caller_id: u64,
    #[serde(default)]
    pub callee_id: u64,
    #[serde(default)]
    pub call_id: u64,
    /// Call duration in seconds
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub long_distance: bool,
    /// Optional timestamp (ms since epoch), defaults to now
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl EventRequest {
    pub fn into_event(self, now: i64) -> Event {
        Event {
            call_id: self.call_id,
            caller_id: self.caller_id,
            callee_id: self.callee_id,
            cost: self.cost,
            duration: self.duration,
            long_distance: self.long_distance,
            caller_place: 0,
            callee_place: 0,
            timestamp: self.timestamp.unwrap_or(now),
        }
    }
}

impl From<&Event> for EventRequest {
    fn from(event: &Event) -> Self {
        Self {
            caller_id: event.caller_id,
            callee_id: event.callee_id,
            call_id: event.call_id,
            duration: event.duration,
            cost: event.cost,
            long_distance: event.long_distance,
            timestamp: Some(event.timestamp),
        }
    }
}

/// Batch of call events
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchEventRequest {
    pub events: Vec<EventRequest>,
}

/// Events accepted for processing
#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    /// Status: "queued"
    pub status: String,
    pub accepted: usize,
}

// ============================================
// RECORD DTOs
// ============================================

/// One named attribute of the analytics record
#[derive(Debug, Serialize, Deserialize)]
pub struct AttributeValue {
    pub name: String,
    pub value: serde_json::Value,
}

impl AttributeValue {
    pub fn new(name: String, value: Value) -> Self {
        let value = match value {
            Value::Int(v) => serde_json::json!(v),
            Value::UInt(v) => serde_json::json!(v),
            Value::ULong(v) => serde_json::json!(v),
            Value::Double(v) => serde_json::json!(v),
        };
        Self { name, value }
    }
}

/// One dimension attribute with its display name
#[derive(Debug, Serialize, Deserialize)]
pub struct DimensionValue {
    pub name: String,
    pub id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Full subscriber record
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    pub subscriber_id: u64,
    /// Timestamp of the last applied event (ms since epoch)
    pub last_updated: i64,
    pub attributes: Vec<AttributeValue>,
    pub dimensions: Vec<DimensionValue>,
}

// ============================================
// STATS DTOs
// ============================================

#[derive(Debug, Serialize)]
pub struct SchemaSummary {
    pub attributes: usize,
    pub record_size: usize,
}

#[derive(Debug, Serialize)]
pub struct CampaignSummary {
    pub campaigns: usize,
    pub predicates: usize,
    pub entry_indexes: usize,
    pub indexed_conjuncts: usize,
    pub unindexed_conjuncts: usize,
}

/// Engine statistics
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub controller: ControllerStats,
    pub processor: ProcessorStats,
    pub latency: LatencyReport,
    pub schema: SchemaSummary,
    pub campaigns: CampaignSummary,
    pub uptime_seconds: u64,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", "unhealthy"
    pub status: String,
    pub shards: usize,
    pub records: usize,
    /// Queued but unprocessed events
    pub queued_events: usize,
    pub uptime_seconds: u64,
    pub version: String,
}
