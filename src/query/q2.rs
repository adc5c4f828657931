//! Q2: most expensive call this week among subscribers with more than
//! `alpha` calls this week

use super::protocol::{Q2In, Q2Out, QueryResponse};
use super::server_object::{QueryServerObject, ScanContext, ScanState, Status};
use super::QueryError;
use crate::schema::{AggrFun, FilterType, Metric, WindowLength};
use crate::storage::Bucket;

#[derive(Debug, Default)]
struct Partial {
    max: f64,
}

struct Columns {
    calls_week: usize,
    cost_max_week: usize,
}

pub struct Q2ServerObject {
    id: u64,
    args: Q2In,
    columns: Option<Columns>,
    state: ScanState<Partial>,
}

impl Q2ServerObject {
    pub fn new(id: u64, args: Q2In, ctx: &ScanContext) -> Self {
        let state = ScanState::new(2, ctx.threads);
        let resolve = || -> Result<Columns, QueryError> {
            Ok(Columns {
                calls_week: ctx.attribute(Metric::Call, AggrFun::Sum, FilterType::No, WindowLength::Week)?,
                cost_max_week: ctx.attribute(Metric::Cost, AggrFun::Max, FilterType::No, WindowLength::Week)?,
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
            let calls = bucket.column::<u32>(cols.calls_week)?;
            let cost = bucket.column::<f64>(cols.cost_max_week)?;
            let max = calls
                .iter()
                .zip(cost)
                .filter(|&(&c, _)| c > alpha)
                .fold(p.max, |m, (_, &v)| m.max(v));
            p.max = max;
            Ok(())
        });
    }
}

impl QueryServerObject for Q2ServerObject {
    fn kind(&self) -> u8 {
        2
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
            let max = parts.iter().fold(0.0f64, |m, p| m.max(p.max));
            QueryResponse::Q2(Q2Out {
                success: true,
                error: String::new(),
                max,
            })
        })
    }

    fn pop_result(&self) -> Option<(Vec<u8>, Status)> {
        self.state.pop()
    }
}
