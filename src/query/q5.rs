//! Q5: per region, weekly local and long distance cost of subscribers with
//! a given subscription type and category

use super::protocol::{Q5In, Q5Out, Q5Tuple, QueryResponse};
use super::server_object::{QueryServerObject, ScanContext, ScanState, Status};
use super::QueryError;
use crate::schema::{tables, AggrFun, DimensionAttribute, FilterType, Metric, WindowLength};
use crate::storage::Bucket;

const REGIONS: usize = tables::REGIONS.len();

#[derive(Debug, Default)]
struct Partial {
    local: [f64; REGIONS],
    long_distance: [f64; REGIONS],
}

struct Columns {
    cost_local_week: usize,
    cost_long_week: usize,
    sub_type: usize,
    category: usize,
    region: usize,
}

pub struct Q5ServerObject {
    id: u64,
    args: Q5In,
    columns: Option<Columns>,
    state: ScanState<Partial>,
}

impl Q5ServerObject {
    pub fn new(id: u64, args: Q5In, ctx: &ScanContext) -> Self {
        let state = ScanState::new(5, ctx.threads);
        let resolve = || -> Result<Columns, QueryError> {
            Ok(Columns {
                cost_local_week: ctx.attribute(Metric::Cost, AggrFun::Sum, FilterType::Local, WindowLength::Week)?,
                cost_long_week: ctx.attribute(Metric::Cost, AggrFun::Sum, FilterType::NonLocal, WindowLength::Week)?,
                sub_type: ctx.dimension(DimensionAttribute::SubscriptionType)?,
                category: ctx.dimension(DimensionAttribute::CategoryType)?,
                region: ctx.dimension(DimensionAttribute::Region)?,
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
        let Q5In { sub_type, sub_category } = self.args;
        self.state.accumulate(thread, |p| {
            let local = bucket.column::<f64>(cols.cost_local_week)?;
            let long = bucket.column::<f64>(cols.cost_long_week)?;
            let types = bucket.column::<u16>(cols.sub_type)?;
            let categories = bucket.column::<u16>(cols.category)?;
            let regions = bucket.column::<u16>(cols.region)?;

            for i in 0..bucket.len() {
                if types[i] != sub_type || categories[i] != sub_category {
                    continue;
                }
                let r = regions[i] as usize;
                if r < REGIONS {
                    p.local[r] += local[i];
                    p.long_distance[r] += long[i];
                }
            }
            Ok(())
        });
    }
}

impl QueryServerObject for Q5ServerObject {
    fn kind(&self) -> u8 {
        5
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
            let mut total = Partial::default();
            for p in &parts {
                for r in 0..REGIONS {
                    total.local[r] += p.local[r];
                    total.long_distance[r] += p.long_distance[r];
                }
            }
            let results = tables::REGIONS
                .iter()
                .enumerate()
                .map(|(r, name)| Q5Tuple {
                    region: name.to_string(),
                    sum_local_cost: total.local[r],
                    sum_long_distance_cost: total.long_distance[r],
                })
                .collect();
            QueryResponse::Q5(Q5Out {
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
