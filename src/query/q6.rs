//! Q6: longest local and long distance call of a country, today and this
//! week, each with the subscriber holding it
//!
//! Ties keep the first maximum found: a later value replaces the current one
//! only if strictly greater, within a thread and when merging threads in
//! thread order.

use super::protocol::{Q6In, Q6Out, QueryResponse};
use super::server_object::{QueryServerObject, ScanContext, ScanState, Status};
use super::QueryError;
use crate::schema::{AggrFun, DimensionAttribute, FilterType, Metric, WindowLength};
use crate::storage::Bucket;

/// Running maximum and the subscriber it belongs to
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Max {
    value: u32,
    subscriber: u64,
}

impl Max {
    #[inline]
    fn offer(&mut self, value: u32, subscriber: u64) {
        if self.value < value {
            self.value = value;
            self.subscriber = subscriber;
        }
    }
}

/// local day, local week, long distance day, long distance week
#[derive(Debug, Default)]
struct Partial([Max; 4]);

struct Columns {
    country: usize,
    subscriber: usize,
    maxes: [usize; 4],
}

pub struct Q6ServerObject {
    id: u64,
    args: Q6In,
    columns: Option<Columns>,
    state: ScanState<Partial>,
}

impl Q6ServerObject {
    pub fn new(id: u64, args: Q6In, ctx: &ScanContext) -> Self {
        let state = ScanState::new(6, ctx.threads);
        let resolve = || -> Result<Columns, QueryError> {
            let dur_max = |filter, window| ctx.attribute(Metric::Dur, AggrFun::Max, filter, window);
            Ok(Columns {
                country: ctx.dimension(DimensionAttribute::Country)?,
                subscriber: ctx.subscriber_id()?,
                maxes: [
                    dur_max(FilterType::Local, WindowLength::Day)?,
                    dur_max(FilterType::Local, WindowLength::Week)?,
                    dur_max(FilterType::NonLocal, WindowLength::Day)?,
                    dur_max(FilterType::NonLocal, WindowLength::Week)?,
                ],
            })
        };
        let columns = resolve().map_err(|e| state.fail(e.to_string())).ok();
        Self {
            id,
            args,
            columns,
            state,
        }
    }

    fn scan(&self, thread: usize, bucket: &Bucket) {
        let Some(cols) = &self.columns else { return };
        let country_id = self.args.country_id;
        self.state.accumulate(thread, |p| {
            let country = bucket.column::<u16>(cols.country)?;
            let ids = bucket.column::<u64>(cols.subscriber)?;
            for (slot, &col) in p.0.iter_mut().zip(&cols.maxes) {
                let values = bucket.column::<u32>(col)?;
                for ((&c, &id), &v) in country.iter().zip(ids).zip(values) {
                    if c == country_id {
                        slot.offer(v, id);
                    }
                }
            }
            Ok(())
        });
    }
}

fn merge(parts: &[Partial]) -> [Max; 4] {
    let mut total = [Max::default(); 4];
    for part in parts {
        for (t, m) in total.iter_mut().zip(&part.0) {
            t.offer(m.value, m.subscriber);
        }
    }
    total
}

impl QueryServerObject for Q6ServerObject {
    fn kind(&self) -> u8 {
        6
    }

    fn query_id(&self) -> u64 {
        self.id
    }

    fn process_bucket(&self, thread: usize, bucket: &Bucket) {
        debug_assert!(bucket.is_full());
        self.scan(thread, bucket);
    }

    fn process_last_bucket(&self, thread: usize, bucket: &Bucket) {
        self.scan(thread, bucket);
    }

    fn end(&self) -> bool {
        self.state.end(|parts| {
            let [local_day, local_week, long_day, long_week] = merge(&parts);
            QueryResponse::Q6(Q6Out {
                success: true,
                error: String::new(),
                max_local_day: local_day.value,
                max_local_day_id: local_day.subscriber,
                max_local_week: local_week.value,
                max_local_week_id: local_week.subscriber,
                max_distant_day: long_day.value,
                max_distant_day_id: long_day.subscriber,
                max_distant_week: long_week.value,
                max_distant_week_id: long_week.subscriber,
            })
        })
    }

    fn pop_result(&self) -> Option<(Vec<u8>, Status)> {
        self.state.pop()
    }
}
