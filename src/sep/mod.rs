//! Stream Event Processing
//!
//! Applies call events to the analytics matrix and evaluates the campaign
//! conditions on every updated record.
//!
//! - **processor**: event queues, worker threads and the initial population
//! - **stats**: per-event latency counters

mod processor;
mod stats;

pub use processor::{belongs_to_server, EventProcessor, ProcessorConfig, ProcessorStats};
pub use stats::{LatencyReport, LatencyStats, THRESHOLDS_NS};
