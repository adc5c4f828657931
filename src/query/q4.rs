//! Q4: per city, average weekly local calls and total weekly local duration
//! of subscribers above both thresholds
//!
//! City slots are shared by all scan threads and updated with atomic adds.

use std::sync::atomic::{AtomicU64, Ordering};

use super::protocol::{Q4In, Q4Out, Q4Tuple, QueryResponse};
use super::server_object::{QueryServerObject, ScanContext, ScanState, Status};
use super::QueryError;
use crate::schema::{tables, AggrFun, DimensionAttribute, FilterType, Metric, WindowLength};
use crate::storage::Bucket;

#[derive(Debug, Default)]
struct CitySlot {
    calls: AtomicU64,
    count: AtomicU64,
    dur: AtomicU64,
}

struct Columns {
    calls_local_week: usize,
    dur_local_week: usize,
    city: usize,
}

pub struct Q4ServerObject {
    id: u64,
    args: Q4In,
    columns: Option<Columns>,
    cities: Vec<CitySlot>,
    state: ScanState<()>,
}

impl Q4ServerObject {
    pub fn new(id: u64, args: Q4In, ctx: &ScanContext) -> Self {
        let state = ScanState::new(4, ctx.threads);
        let resolve = || -> Result<Columns, QueryError> {
            Ok(Columns {
                calls_local_week: ctx.attribute(Metric::Call, AggrFun::Sum, FilterType::Local, WindowLength::Week)?,
                dur_local_week: ctx.attribute(Metric::Dur, AggrFun::Sum, FilterType::Local, WindowLength::Week)?,
                city: ctx.dimension(DimensionAttribute::City)?,
            })
        };
        let columns = resolve().map_err(|e| state.fail(e.to_string())).ok();
        Self {
            id,
            args,
            columns,
            cities: (0..tables::CITIES.len()).map(|_| CitySlot::default()).collect(),
            state,
        }
    }

    fn scan(&self, thread: usize, bucket: &Bucket) {
        let Some(cols) = &self.columns else { return };
        let Q4In { alpha, beta } = self.args;
        self.state.accumulate(thread, |_| {
            let calls = bucket.column::<u32>(cols.calls_local_week)?;
            let dur = bucket.column::<u32>(cols.dur_local_week)?;
            let city = bucket.column::<u16>(cols.city)?;

            let mut local = [(0u64, 0u64, 0u64); tables::CITIES.len()];
            for ((&c, &d), &city) in calls.iter().zip(dur).zip(city) {
                if c > alpha && d > beta {
                    if let Some(slot) = local.get_mut(city as usize) {
                        slot.0 += c as u64;
                        slot.1 += 1;
                        slot.2 += d as u64;
                    }
                }
            }
            for (slot, (c, n, d)) in self.cities.iter().zip(local) {
                if n > 0 {
                    slot.calls.fetch_add(c, Ordering::Relaxed);
                    slot.count.fetch_add(n, Ordering::Relaxed);
                    slot.dur.fetch_add(d, Ordering::Relaxed);
                }
            }
            Ok(())
        });
    }
}

impl QueryServerObject for Q4ServerObject {
    fn kind(&self) -> u8 {
        4
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
        self.state.end(|_| {
            let results = tables::CITIES
                .iter()
                .zip(&self.cities)
                .map(|(name, slot)| {
                    let count = slot.count.load(Ordering::Acquire);
                    let calls = slot.calls.load(Ordering::Acquire);
                    Q4Tuple {
                        city: name.to_string(),
                        avg: if count == 0 { 0.0 } else { calls as f64 / count as f64 },
                        sum: slot.dur.load(Ordering::Acquire),
                    }
                })
                .collect();
            QueryResponse::Q4(Q4Out {
                success: true,
                error: String::new(),
                results,
            })
        })
    }

    fn pop_result(&self) -> Option<(Vec<u8>, Status)> {
        self.state.pop()
    }
}
