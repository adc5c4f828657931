//! Random campaign generation for the standard schema

use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::params;

use super::error::MetaResult;
use super::store::{encode_metric, MetaStore, MetaSummary};
use crate::schema::{AnalyticsSchema, FilterType, Metric, WindowLength, MSECS_PER_DAY};

/// Attributes `1..=PIVOT_ATTRIBUTES` are pivots
pub const PIVOT_ATTRIBUTES: i64 = 20;

const METRICS: [(Metric, FilterType, &str); 9] = [
    (Metric::Cost, FilterType::No, "cost"),
    (Metric::Call, FilterType::No, "call"),
    (Metric::Dur, FilterType::No, "duration"),
    (Metric::Cost, FilterType::Local, "local cost"),
    (Metric::Call, FilterType::Local, "local call"),
    (Metric::Dur, FilterType::Local, "local duration"),
    (Metric::Cost, FilterType::NonLocal, "non local cost"),
    (Metric::Call, FilterType::NonLocal, "non local call"),
    (Metric::Dur, FilterType::NonLocal, "non local duration"),
];

fn campaign_epoch() -> i64 {
    NaiveDate::from_ymd_opt(2012, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp_millis())
        .unwrap_or(1_325_376_000_000)
}

fn window_code(length: WindowLength) -> &'static str {
    match length {
        WindowLength::Day => "d",
        WindowLength::Week => "w",
    }
}

fn pick_operator(rng: &mut StdRng) -> &'static str {
    let d: f64 = rng.gen();
    if d <= 0.4 {
        "gr"
    } else if d <= 0.5 {
        "lt"
    } else if d <= 0.9 {
        "gre"
    } else {
        "lte"
    }
}

fn pick_interval(rng: &mut StdRng) -> &'static str {
    let d: f64 = rng.gen();
    if d <= 0.2 {
        "0"
    } else if d <= 0.4 {
        "1d"
    } else if d <= 0.6 {
        "2d"
    } else {
        "w"
    }
}

/// Insert ids shared by identical rows
struct Dedup {
    constants: HashMap<(String, String), i64>,
    predicates: HashMap<(i64, &'static str, i64), i64>,
}

impl MetaStore {
    /// Fill an empty store with the standard 42 attributes and `campaigns`
    /// randomly generated campaigns
    pub fn populate_standard(&mut self, seed: u64, campaigns: usize) -> MetaResult<MetaSummary> {
        let mut rng = StdRng::seed_from_u64(seed);
        let tx = self.conn.transaction()?;

        for (metric, filter, name) in METRICS {
            tx.execute(
                "INSERT INTO metric (id, name, data_type) VALUES (?1, ?2, ?3)",
                params![encode_metric(metric, filter), name, metric.data_type().to_string()],
            )?;
        }

        let mut attribute_types = Vec::new();
        for entry in AnalyticsSchema::standard().entries() {
            attribute_types.push(entry.data_type().to_string());
            let id = attribute_types.len() as i64;
            tx.execute(
                "INSERT INTO wt_attribute
                 (id, metric, is_pivot, window_type, window_size, aggr_fun, aggr_data_type)
                 VALUES (?1, ?2, ?3, 'tumb', ?4, ?5, ?6)",
                params![
                    id,
                    encode_metric(entry.metric, entry.filter),
                    id <= PIVOT_ATTRIBUTES,
                    window_code(entry.window.length),
                    entry.aggr.name(),
                    entry.data_type().to_string(),
                ],
            )?;
        }
        let attributes = attribute_types.len() as i64;

        let epoch = campaign_epoch();
        let mut dedup = Dedup {
            constants: HashMap::new(),
            predicates: HashMap::new(),
        };
        let mut conjunct_id = 0i64;

        for campaign in 1..=campaigns as i64 {
            let duration: i64 = rng.gen_range(7..32);
            let start_day: i64 = rng.gen_range(0..32 - duration);
            let valid_from = epoch + start_day * MSECS_PER_DAY;
            let valid_to = valid_from + duration * MSECS_PER_DAY;
            let interval = pick_interval(&mut rng);
            let start = if rng.gen_bool(0.9) { "fixed" } else { "sliding" };
            tx.execute(
                "INSERT INTO campaign
                 (id, valid_from, valid_to, firing_interval, firing_start_condition)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![campaign, valid_from, valid_to, interval, start],
            )?;

            for _ in 0..rng.gen_range(1..=5) {
                conjunct_id += 1;
                tx.execute(
                    "INSERT INTO conjunct (id, campaign) VALUES (?1, ?2)",
                    params![conjunct_id, campaign],
                )?;

                let num_predicates = rng.gen_range(1..=5);
                for p in 0..num_predicates {
                    let pivot = p == 0 && rng.gen_bool(0.9);
                    let attribute = if pivot {
                        rng.gen_range(1..=PIVOT_ATTRIBUTES)
                    } else {
                        rng.gen_range(PIVOT_ATTRIBUTES + 1..=attributes)
                    };
                    let data_type = &attribute_types[(attribute - 1) as usize];
                    let raw: u32 = rng.gen_range(11..=100);
                    let value = if data_type == "double" {
                        format!("{:.1}", raw as f64)
                    } else {
                        raw.to_string()
                    };

                    let constant = match dedup.constants.get(&(data_type.clone(), value.clone())) {
                        Some(&id) => id,
                        None => {
                            let id = dedup.constants.len() as i64 + 1;
                            tx.execute(
                                "INSERT INTO constant (id, value, data_type) VALUES (?1, ?2, ?3)",
                                params![id, value, data_type],
                            )?;
                            dedup.constants.insert((data_type.clone(), value), id);
                            id
                        }
                    };

                    let op = pick_operator(&mut rng);
                    let predicate = match dedup.predicates.get(&(attribute, op, constant)) {
                        Some(&id) => id,
                        None => {
                            let id = dedup.predicates.len() as i64 + 1;
                            tx.execute(
                                "INSERT INTO predicate (id, wt_attribute, operator, constant)
                                 VALUES (?1, ?2, ?3, ?4)",
                                params![id, attribute, op, constant],
                            )?;
                            dedup.predicates.insert((attribute, op, constant), id);
                            id
                        }
                    };

                    tx.execute(
                        "INSERT OR IGNORE INTO conjunct_predicate (predicate, conjunct)
                         VALUES (?1, ?2)",
                        params![predicate, conjunct_id],
                    )?;
                }
            }
        }

        tx.commit()?;
        let summary = self.summary()?;
        tracing::info!(seed, %summary, "Generated campaign metadata");
        Ok(summary)
    }
}
