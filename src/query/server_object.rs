//! Server-side query objects
//!
//! A query object lives from registration until its result is popped. Every
//! scan thread feeds it the buckets of its shard and calls [`end`] once; the
//! call that completes the quorum merges the per-thread partials into the
//! final payload.
//!
//! [`end`]: QueryServerObject::end

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{QueryError, QueryResult};
use super::protocol::QueryResponse;
use crate::schema::{AggrFun, AnalyticsSchema, DimensionAttribute, FilterType, Metric, WindowLength};
use crate::storage::{Bucket, ColumnType, StorageResult, StoreLayout};

/// Whether more result payloads follow the one just popped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    HasNext,
    Done,
}

/// A registered query, shared by all scan threads
pub trait QueryServerObject: Send + Sync {
    /// Query kind, 1..=7
    fn kind(&self) -> u8;

    /// Number assigned by the communication layer
    fn query_id(&self) -> u64;

    /// A bucket filled to capacity
    fn process_bucket(&self, thread: usize, bucket: &Bucket);

    /// The last bucket of a shard, possibly partial
    fn process_last_bucket(&self, thread: usize, bucket: &Bucket);

    /// Called once per scan thread; returns `true` for the call that made
    /// the result ready
    fn end(&self) -> bool;

    /// Next result payload, once the result is ready
    fn pop_result(&self) -> Option<(Vec<u8>, Status)>;
}

/// Everything a query needs to resolve its columns
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub schema: Arc<AnalyticsSchema>,
    pub layout: Arc<StoreLayout>,
    /// Scan threads that will call `end`
    pub threads: usize,
}

impl ScanContext {
    pub fn new(schema: Arc<AnalyticsSchema>, layout: Arc<StoreLayout>, threads: usize) -> Self {
        Self {
            schema,
            layout,
            threads: threads.max(1),
        }
    }

    /// Column of an analytics attribute, checked against the expected type
    pub fn attribute(
        &self,
        metric: Metric,
        aggr: AggrFun,
        filter: FilterType,
        window: WindowLength,
    ) -> QueryResult<usize> {
        let name = || {
            format!(
                "{}_{}_{}_{}",
                metric.name(),
                aggr.name(),
                filter.name(),
                window.name()
            )
        };
        let index = self
            .schema
            .index_of(metric, aggr, filter, window)
            .ok_or_else(|| QueryError::MissingAttribute(name()))?;
        let column = StoreLayout::attribute_column(index);
        self.expect_type(column, ColumnType::from(metric.data_type()), &name())?;
        Ok(column)
    }

    pub fn dimension(&self, attribute: DimensionAttribute) -> QueryResult<usize> {
        let column = self.layout.dimension_column(attribute);
        self.expect_type(column, ColumnType::U16, attribute.name())?;
        Ok(column)
    }

    pub fn subscriber_id(&self) -> QueryResult<usize> {
        let column = self.layout.subscriber_id_column();
        self.expect_type(column, ColumnType::U64, "subscriber_id")?;
        Ok(column)
    }

    fn expect_type(&self, column: usize, expected: ColumnType, name: &str) -> QueryResult<()> {
        if column >= self.layout.num_columns() || self.layout.column_type(column) != expected {
            return Err(QueryError::MissingAttribute(format!(
                "{} as {}",
                name,
                expected.name()
            )));
        }
        Ok(())
    }
}

/// Per-thread partials, end-quorum counter and the finished payload
pub struct ScanState<P> {
    kind: u8,
    partials: Vec<Mutex<P>>,
    finished: AtomicUsize,
    error: Mutex<Option<String>>,
    result: Mutex<Option<Vec<u8>>>,
}

impl<P: Default> ScanState<P> {
    pub fn new(kind: u8, threads: usize) -> Self {
        Self {
            kind,
            partials: (0..threads.max(1)).map(|_| Mutex::new(P::default())).collect(),
            finished: AtomicUsize::new(0),
            error: Mutex::new(None),
            result: Mutex::new(None),
        }
    }

    /// Record a failure; the first one wins
    pub fn fail(&self, error: impl Into<String>) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error.into());
        }
    }

    /// Run `f` on the partial of `thread`, capturing storage errors
    pub fn accumulate(&self, thread: usize, f: impl FnOnce(&mut P) -> StorageResult<()>) {
        let Some(slot) = self.partials.get(thread) else {
            self.fail(format!("scan thread {} out of range", thread));
            return;
        };
        if let Err(e) = f(&mut slot.lock()) {
            self.fail(e.to_string());
        }
    }

    /// Count one `end`; the last caller merges with `finalize`
    pub fn end(&self, finalize: impl FnOnce(Vec<P>) -> QueryResponse) -> bool {
        let done = self.finished.fetch_add(1, Ordering::AcqRel) + 1;
        if done != self.partials.len() {
            return false;
        }

        let response = match self.error.lock().take() {
            Some(error) => QueryResponse::failure(self.kind, error),
            None => {
                let parts = self
                    .partials
                    .iter()
                    .map(|m| std::mem::take(&mut *m.lock()))
                    .collect();
                Ok(finalize(parts))
            }
        };
        let payload = response
            .and_then(|r| r.encode())
            .or_else(|e| QueryResponse::failure(self.kind, e.to_string()).and_then(|r| r.encode()))
            .unwrap_or_default();
        *self.result.lock() = Some(payload);
        true
    }

    pub fn pop(&self) -> Option<(Vec<u8>, Status)> {
        self.result.lock().take().map(|bytes| (bytes, Status::Done))
    }
}
