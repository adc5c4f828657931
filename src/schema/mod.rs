//! Analytics Matrix Schema
//!
//! Describes the per-subscriber analytics record and the data that flows
//! into it:
//!
//! - **types**: metric, aggregation, filter and window enums
//! - **entry**: one attribute and its init/update/maintain kernels
//! - **analytics**: the ordered attribute list with byte offsets
//! - **record**: typed little-endian field access
//! - **event**: call detail events
//! - **dimension**: static subscriber dimension data
//!
//! # Record layout
//!
//! ```text
//! | last_updated: i64 | attr 0 | attr 1 | ... | attr n-1 |
//! ```
//!
//! Stored rows additionally carry the dimension columns after the analytics
//! attributes.

pub mod analytics;
pub mod dimension;
pub mod entry;
pub mod error;
pub mod event;
pub mod record;
pub mod types;

pub use analytics::{AnalyticsSchema, AttrKey};
pub use dimension::{tables, DimensionAttribute, DimensionRecord, DimensionSchema};
pub use entry::{AttrKind, SchemaEntry, Window};
pub use error::{SchemaError, SchemaResult};
pub use event::Event;
pub use record::{RecordBuf, RecordView, Value};
pub use types::{
    AggrFun, DataType, FilterType, Metric, WindowLength, WindowType, FIRST_MONDAY,
    MSECS_PER_DAY, MSECS_PER_WEEK, TIMESTAMP_SIZE,
};
