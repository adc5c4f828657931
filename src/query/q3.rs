//! Q3: cost per duration unit, grouped by the number of calls this week
//!
//! Call counts below [`SMALL_THRESHOLD`] are counted in a dense array indexed
//! by the count itself; larger counts go to a hash map.

use std::collections::HashMap;

use super::protocol::{Q3In, Q3Out, Q3Tuple, QueryResponse};
use super::server_object::{QueryServerObject, ScanContext, ScanState, Status};
use super::QueryError;
use crate::schema::{AggrFun, FilterType, Metric, WindowLength};
use crate::storage::Bucket;

/// Group values below this are tracked in the dense array
pub const SMALL_THRESHOLD: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Group {
    count: u64,
    cost: f64,
    dur: u64,
}

impl Group {
    #[inline]
    fn add(&mut self, cost: f64, dur: u32) {
        self.count += 1;
        self.cost += cost;
        self.dur += dur as u64;
    }

    fn merge(&mut self, other: &Group) {
        self.count += other.count;
        self.cost += other.cost;
        self.dur += other.dur;
    }
}

#[derive(Debug)]
struct Partial {
    small: Vec<Group>,
    outliers: HashMap<u32, Group>,
}

impl Default for Partial {
    fn default() -> Self {
        Self {
            small: vec![Group::default(); SMALL_THRESHOLD],
            outliers: HashMap::new(),
        }
    }
}

struct Columns {
    calls_week: usize,
    cost_week: usize,
    dur_week: usize,
}

pub struct Q3ServerObject {
    id: u64,
    columns: Option<Columns>,
    state: ScanState<Partial>,
}

impl Q3ServerObject {
    pub fn new(id: u64, _args: Q3In, ctx: &ScanContext) -> Self {
        let state = ScanState::new(3, ctx.threads);
        let resolve = || -> Result<Columns, QueryError> {
            Ok(Columns {
                calls_week: ctx.attribute(Metric::Call, AggrFun::Sum, FilterType::No, WindowLength::Week)?,
                cost_week: ctx.attribute(Metric::Cost, AggrFun::Sum, FilterType::No, WindowLength::Week)?,
                dur_week: ctx.attribute(Metric::Dur, AggrFun::Sum, FilterType::No, WindowLength::Week)?,
            })
        };
        let columns = resolve().map_err(|e| state.fail(e.to_string())).ok();
        Self { id, columns, state }
    }

    fn scan(&self, thread: usize, bucket: &Bucket) {
        let Some(cols) = &self.columns else { return };
        self.state.accumulate(thread, |p| {
            let calls = bucket.column::<u32>(cols.calls_week)?;
            let cost = bucket.column::<f64>(cols.cost_week)?;
            let dur = bucket.column::<u32>(cols.dur_week)?;
            for ((&c, &co), &d) in calls.iter().zip(cost).zip(dur) {
                match p.small.get_mut(c as usize) {
                    Some(group) => group.add(co, d),
                    None => p.outliers.entry(c).or_default().add(co, d),
                }
            }
            Ok(())
        });
    }
}

fn merge(parts: Vec<Partial>) -> Vec<Q3Tuple> {
    let mut small = vec![Group::default(); SMALL_THRESHOLD];
    let mut outliers: HashMap<u32, Group> = HashMap::new();
    for part in &parts {
        for (total, g) in small.iter_mut().zip(&part.small) {
            total.merge(g);
        }
        for (calls, g) in &part.outliers {
            outliers.entry(*calls).or_default().merge(g);
        }
    }

    let ratio = |g: &Group| if g.dur == 0 { 0.0 } else { g.cost / g.dur as f64 };
    let mut results: Vec<Q3Tuple> = small
        .iter()
        .enumerate()
        .filter(|(_, g)| g.count > 0)
        .map(|(calls, g)| Q3Tuple {
            calls: calls as u32,
            cost_ratio: ratio(g),
        })
        .collect();
    let mut large: Vec<Q3Tuple> = outliers
        .iter()
        .map(|(calls, g)| Q3Tuple {
            calls: *calls,
            cost_ratio: ratio(g),
        })
        .collect();
    large.sort_by_key(|t| t.calls);
    results.extend(large);
    results
}

impl QueryServerObject for Q3ServerObject {
    fn kind(&self) -> u8 {
        3
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
            QueryResponse::Q3(Q3Out {
                success: true,
                error: String::new(),
                results: merge(parts),
            })
        })
    }

    fn pop_result(&self) -> Option<(Vec<u8>, Status)> {
        self.state.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_small_and_outliers() {
        let mut a = Partial::default();
        a.small[3].add(6.0, 2);
        a.outliers.entry(250).or_default().add(10.0, 5);
        let mut b = Partial::default();
        b.small[3].add(3.0, 1);
        b.small[0].add(0.0, 0);
        b.outliers.entry(250).or_default().add(5.0, 0);
        b.outliers.entry(120).or_default().add(1.0, 4);

        let results = merge(vec![a, b]);
        assert_eq!(
            results,
            vec![
                Q3Tuple { calls: 0, cost_ratio: 0.0 },
                Q3Tuple { calls: 3, cost_ratio: 3.0 },
                Q3Tuple { calls: 120, cost_ratio: 0.25 },
                Q3Tuple { calls: 250, cost_ratio: 3.0 },
            ]
        );
    }
}
