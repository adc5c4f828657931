//! AIM Storage Engine
//!
//! This module keeps the analytics matrix of every subscriber in memory:
//!
//! - **bucket**: column-oriented buckets of fixed capacity (PAX layout)
//! - **delta**: per-shard write buffer and the swap gate guarding it
//! - **controller**: sharding, delta merging and the scan cycle
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Event → SEP read/modify → current delta (shard = id % shards)
//!
//! Merge:
//!   current delta → old delta → column buckets
//!
//! Read Path:
//!   current delta → old delta → column buckets
//!
//! Scan:
//!   queued queries → every bucket of every shard → end() → results
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use aim::storage::{ControllerConfig, ShardedController};
//!
//! let ctrl = ShardedController::new(ControllerConfig::default(), layout, rta)?;
//! ctrl.write(42, schema.default_record(0))?;
//! ctrl.run_cycle()?;
//! assert!(ctrl.read(42).is_some());
//! ```

pub mod bucket;
pub mod controller;
pub mod delta;
pub mod error;

pub use bucket::{Bucket, Column, ColumnBucketStore, ColumnType, ColumnValue, StoreLayout};
pub use controller::{ControllerConfig, ControllerStats, ShardStats, ShardedController};
pub use delta::{DeltaLog, GateGuard, SwapGate};
pub use error::{StorageError, StorageResult};
