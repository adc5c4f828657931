//! # AIM
//!
//! Analytics in Motion - a real-time analytics engine that keeps one
//! analytics record per subscriber up to date while answering ad-hoc scan
//! queries and matching marketing campaigns on every update.
//!
//! ## Features
//!
//! - **Windowed aggregates**: per-subscriber sums, minima and maxima over
//!   tumbling day and week windows
//! - **Delta + column store**: writes go to a per-shard delta, merged into
//!   fixed-size column buckets between scans
//! - **Shared scans**: one pass per shard answers every pending query
//! - **Campaign matching**: interval trees over pivot attributes find the
//!   campaigns whose conditions an updated record satisfies
//!
//! ## Modules
//!
//! - [`schema`]: analytics attributes, records, events, dimensions
//! - [`storage`]: column buckets, delta logs, sharded controller
//! - [`query`]: the seven scan queries and result delivery
//! - [`campaign`]: predicates, campaigns and the matching index
//! - [`meta`]: SQLite schema and campaign metadata
//! - [`sep`]: event processing
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aim::{Config, Engine};
//! use aim::query::{Q1In, QueryRequest};
//! use aim::schema::Event;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::build(&Config::default())?;
//!     engine.start(10_000, 0)?;
//!
//!     engine.processor.enqueue_updates(&[Event::new(42, 1_325_376_000_000).call(60, 1.5)]);
//!     let reply = engine.delivery.execute_blocking(&QueryRequest::Q1(Q1In { alpha: 2 }))?;
//!     println!("{:?}", reply);
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod campaign;
pub mod config;
pub mod engine;
pub mod meta;
pub mod query;
pub mod schema;
pub mod sep;
pub mod storage;

pub use schema::{AnalyticsSchema, DimensionSchema, Event, SchemaError, SchemaResult};

pub use storage::{
    ControllerConfig, ControllerStats, ShardedController, StorageError, StorageResult,
    StoreLayout,
};

pub use query::{
    LocalRtaCommunication, QueryError, QueryRequest, QueryResponse, QueryResult,
    RtaCommunication,
};

pub use campaign::{CampaignError, CampaignIndex, CampaignIndexBuilder, CampaignResult};

pub use meta::{MetaError, MetaResult, MetaStore};

pub use sep::{EventProcessor, LatencyReport, ProcessorConfig};

pub use api::{build_router, serve, ApiError, AppState};

pub use engine::{Engine, EngineError, EngineResult};

pub use config::{
    ApiConfig as ConfigApiConfig, Config, ConfigError, EngineConfig, LoggingConfig, MetaConfig,
    SepConfig,
};
