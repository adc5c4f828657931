//! Q7: subscriber with the lowest flat rate (cost per duration unit) among
//! those of a given value type, over the day or week window
//!
//! Subscribers without duration have no rate and are skipped.

use super::protocol::{Q7In, Q7Out, QueryResponse};
use super::server_object::{QueryServerObject, ScanContext, ScanState, Status};
use super::QueryError;
use crate::schema::{AggrFun, DimensionAttribute, FilterType, Metric, WindowLength};
use crate::storage::Bucket;

#[derive(Debug, Clone, Copy)]
struct Partial {
    rate: f64,
    subscriber: u64,
    found: bool,
}

impl Default for Partial {
    fn default() -> Self {
        Self {
            rate: f64::MAX,
            subscriber: 0,
            found: false,
        }
    }
}

impl Partial {
    #[inline]
    fn offer(&mut self, rate: f64, subscriber: u64) {
        if rate < self.rate {
            self.rate = rate;
            self.subscriber = subscriber;
            self.found = true;
        }
    }
}

struct Columns {
    value_type: usize,
    subscriber: usize,
    cost: usize,
    dur: usize,
}

pub struct Q7ServerObject {
    id: u64,
    args: Q7In,
    columns: Option<Columns>,
    state: ScanState<Partial>,
}

impl Q7ServerObject {
    pub fn new(id: u64, args: Q7In, ctx: &ScanContext) -> Self {
        let state = ScanState::new(7, ctx.threads);
        let resolve = || -> Result<Columns, QueryError> {
            let window = WindowLength::from_code(args.window_length).ok_or_else(|| {
                QueryError::InvalidArgument(format!("window_length {}", args.window_length))
            })?;
            Ok(Columns {
                value_type: ctx.dimension(DimensionAttribute::ValueType)?,
                subscriber: ctx.subscriber_id()?,
                cost: ctx.attribute(Metric::Cost, AggrFun::Sum, FilterType::No, window)?,
                dur: ctx.attribute(Metric::Dur, AggrFun::Sum, FilterType::No, window)?,
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
        let value_type = self.args.subscriber_value_type;
        self.state.accumulate(thread, |p| {
            let types = bucket.column::<u16>(cols.value_type)?;
            let ids = bucket.column::<u64>(cols.subscriber)?;
            let cost = bucket.column::<f64>(cols.cost)?;
            let dur = bucket.column::<u32>(cols.dur)?;
            for i in 0..bucket.len() {
                if types[i] == value_type && dur[i] != 0 {
                    p.offer(cost[i] / dur[i] as f64, ids[i]);
                }
            }
            Ok(())
        });
    }
}

impl QueryServerObject for Q7ServerObject {
    fn kind(&self) -> u8 {
        7
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
            let mut best = Partial::default();
            for p in parts.iter().filter(|p| p.found) {
                best.offer(p.rate, p.subscriber);
            }
            QueryResponse::Q7(Q7Out {
                success: true,
                error: String::new(),
                subscriber_id: best.subscriber,
                flat_rate: if best.found { best.rate } else { 0.0 },
            })
        })
    }

    fn pop_result(&self) -> Option<(Vec<u8>, Status)> {
        self.state.pop()
    }
}
