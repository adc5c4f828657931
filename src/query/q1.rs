//! Q1: average weekly duration of subscribers with more than `alpha` local
//! calls this week

use super::protocol::{Q1In, Q1Out, QueryResponse};
use super::server_object::{QueryServerObject, ScanContext, ScanState, Status};
use super::QueryError;
use crate::schema::{AggrFun, FilterType, Metric, WindowLength};
use crate::storage::Bucket;

#[derive(Debug, Default)]
struct Partial {
    sum: u64,
    count: u64,
}

struct Columns {
    calls_local_week: usize,
    dur_week: usize,
}

pub struct Q1ServerObject {
    id: u64,
    args: Q1In,
    columns: Option<Columns>,
    state: ScanState<Partial>,
}

impl Q1ServerObject {
    pub fn new(id: u64, args: Q1In, ctx: &ScanContext) -> Self {
        let state = ScanState::new(1, ctx.threads);
        let resolve = || -> Result<Columns, QueryError> {
            Ok(Columns {
                calls_local_week: ctx.attribute(Metric::Call, AggrFun::Sum, FilterType::Local, WindowLength::Week)?,
                dur_week: ctx.attribute(Metric::Dur, AggrFun::Sum, FilterType::No, WindowLength::Week)?,
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
        let alpha = self.args.alpha;
        self.state.accumulate(thread, |p| {
            let calls = bucket.column::<u32>(cols.calls_local_week)?;
            let dur = bucket.column::<u32>(cols.dur_week)?;
            let (mut sum, mut count) = (0u64, 0u64);
            for (&c, &d) in calls.iter().zip(dur) {
                let hit = (c > alpha) as u64;
                sum += d as u64 * hit;
                count += hit;
            }
            p.sum += sum;
            p.count += count;
            Ok(())
        });
    }
}

impl QueryServerObject for Q1ServerObject {
    fn kind(&self) -> u8 {
        1
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
            let (sum, count) = parts
                .iter()
                .fold((0u64, 0u64), |(s, c), p| (s + p.sum, c + p.count));
            let avg = if count == 0 { 0.0 } else { sum as f64 / count as f64 };
            QueryResponse::Q1(Q1Out {
                success: true,
                error: String::new(),
                avg,
            })
        })
    }

    fn pop_result(&self) -> Option<(Vec<u8>, Status)> {
        self.state.pop()
    }
}
