//! SQLite metadata store
//!
//! Holds the attribute definitions of the analytics schema and the campaign
//! conditions. Read once at startup to build the [`AnalyticsSchema`] and the
//! [`CampaignIndex`].
//!
//! # Tables
//! ```text
//! metric(id, name, data_type)
//! wt_attribute(id, metric, is_pivot, window_type, window_size, aggr_fun, aggr_data_type)
//! constant(id, value, data_type)
//! predicate(id, wt_attribute, operator, constant)
//! campaign(id, valid_from, valid_to, firing_interval, firing_start_condition)
//! conjunct(id, campaign)
//! conjunct_predicate(predicate, conjunct)
//! ```
//!
//! Row ids start at 1. Attribute `n` is schema entry `n - 1`, campaign `n`
//! is campaign id `n - 1` in the index.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use super::error::{MetaError, MetaResult};
use crate::campaign::{
    parse_constant, Campaign, CampaignIndex, CampaignIndexBuilder, Conjunct, FiringPolicy,
    Operator, Predicate,
};
use crate::schema::{
    AggrFun, AnalyticsSchema, DataType, FilterType, Metric, SchemaEntry, Window, WindowLength,
    WindowType,
};

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS metric (
        id          INTEGER NOT NULL PRIMARY KEY,
        name        VARCHAR(25) NOT NULL,
        data_type   VARCHAR(6) NOT NULL
    );
    CREATE TABLE IF NOT EXISTS wt_attribute (
        id              INTEGER NOT NULL PRIMARY KEY,
        metric          INTEGER NOT NULL REFERENCES metric (id),
        is_pivot        TINYINT(1) NOT NULL DEFAULT 0,
        window_type     VARCHAR(4) NOT NULL,
        window_size     VARCHAR(1) NOT NULL,
        aggr_fun        VARCHAR(3) NOT NULL,
        aggr_data_type  VARCHAR(6) NOT NULL
    );
    CREATE TABLE IF NOT EXISTS constant (
        id          INTEGER NOT NULL PRIMARY KEY,
        value       VARCHAR(50) NOT NULL,
        data_type   VARCHAR(6) NOT NULL
    );
    CREATE TABLE IF NOT EXISTS predicate (
        id              INTEGER NOT NULL PRIMARY KEY,
        wt_attribute    INTEGER NOT NULL REFERENCES wt_attribute (id),
        operator        VARCHAR(4) NOT NULL,
        constant        INTEGER NOT NULL REFERENCES constant (id)
    );
    CREATE TABLE IF NOT EXISTS campaign (
        id                      INTEGER NOT NULL PRIMARY KEY,
        valid_from              BIGINT NOT NULL,
        valid_to                BIGINT NOT NULL,
        firing_interval         VARCHAR(2) NOT NULL,
        firing_start_condition  VARCHAR(7) NOT NULL
    );
    CREATE TABLE IF NOT EXISTS conjunct (
        id          INTEGER NOT NULL PRIMARY KEY,
        campaign    INTEGER NOT NULL REFERENCES campaign (id)
    );
    CREATE TABLE IF NOT EXISTS conjunct_predicate (
        predicate   INTEGER NOT NULL REFERENCES predicate (id),
        conjunct    INTEGER NOT NULL REFERENCES conjunct (id),
        PRIMARY KEY (predicate, conjunct)
    );
";

/// Row counts of the metadata tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetaSummary {
    pub metrics: usize,
    pub attributes: usize,
    pub pivot_attributes: usize,
    pub predicates: usize,
    pub conjuncts: usize,
    pub campaigns: usize,
}

impl std::fmt::Display for MetaSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Metrics: {}, Attributes: {} ({} pivot), Predicates: {}, Conjuncts: {}, Campaigns: {}",
            self.metrics,
            self.attributes,
            self.pivot_attributes,
            self.predicates,
            self.conjuncts,
            self.campaigns
        )
    }
}

/// Metric row id -> (metric, filter)
///
/// Ids 1..=3 are cost/call/duration unfiltered, 4..=6 local, 7..=9 non-local.
pub fn decode_metric(id: i64) -> Option<(Metric, FilterType)> {
    if !(1..=9).contains(&id) {
        return None;
    }
    let filter = match (id - 1) / 3 {
        0 => FilterType::No,
        1 => FilterType::Local,
        _ => FilterType::NonLocal,
    };
    let metric = match (id - 1) % 3 {
        0 => Metric::Cost,
        1 => Metric::Call,
        _ => Metric::Dur,
    };
    Some((metric, filter))
}

/// Inverse of [`decode_metric`]
pub fn encode_metric(metric: Metric, filter: FilterType) -> i64 {
    let base = match filter {
        FilterType::No => 0,
        FilterType::Local => 3,
        FilterType::NonLocal => 6,
    };
    base + match metric {
        Metric::Cost => 1,
        Metric::Call => 2,
        Metric::Dur => 3,
    }
}

/// SQLite-backed metadata store
pub struct MetaStore {
    pub(super) conn: Connection,
    path: Option<PathBuf>,
}

impl MetaStore {
    /// Create (or open) a store at `path` and make sure the tables exist
    pub fn create(path: &Path) -> MetaResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open an existing store for loading
    pub fn open(path: &Path) -> MetaResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Throwaway store, used when no metadata file is configured
    pub fn in_memory() -> MetaResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> MetaResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn count(&self, table: &str) -> MetaResult<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn summary(&self) -> MetaResult<MetaSummary> {
        let pivot: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM wt_attribute WHERE is_pivot = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(MetaSummary {
            metrics: self.count("metric")?,
            attributes: self.count("wt_attribute")?,
            pivot_attributes: pivot as usize,
            predicates: self.count("predicate")?,
            conjuncts: self.count("conjunct")?,
            campaigns: self.count("campaign")?,
        })
    }

    /// Schema entries in attribute id order
    pub fn load_schema(&self) -> MetaResult<AnalyticsSchema> {
        let mut stmt = self.conn.prepare(
            "SELECT id, metric, window_type, window_size, aggr_fun, aggr_data_type
             FROM wt_attribute ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, metric_id, window_type, window_size, aggr, data_type) = row?;
            if id != entries.len() as i64 + 1 {
                return Err(MetaError::Invalid(format!(
                    "attribute ids must be dense from 1, found {}",
                    id
                )));
            }
            let (metric, filter) = decode_metric(metric_id)
                .ok_or_else(|| MetaError::Invalid(format!("attribute {}: metric {}", id, metric_id)))?;
            if WindowType::parse(&window_type) != Some(WindowType::Tumbling) {
                return Err(MetaError::Invalid(format!(
                    "attribute {}: window type {}",
                    id, window_type
                )));
            }
            let length = match window_size.as_str() {
                "d" => WindowLength::Day,
                "w" => WindowLength::Week,
                other => {
                    return Err(MetaError::Invalid(format!("attribute {}: window size {}", id, other)))
                }
            };
            let aggr = AggrFun::parse(&aggr)
                .ok_or_else(|| MetaError::Invalid(format!("attribute {}: aggregation {}", id, aggr)))?;
            if DataType::parse(&data_type) != Some(metric.data_type()) {
                return Err(MetaError::Invalid(format!(
                    "attribute {}: {} cannot hold {}",
                    id,
                    data_type,
                    metric.name()
                )));
            }
            entries.push(SchemaEntry::new(metric, aggr, filter, Window::tumbling(length)));
        }

        let schema = AnalyticsSchema::from_entries(entries)?;
        tracing::info!(
            attributes = schema.len(),
            record_size = schema.total_size(),
            "Loaded analytics schema"
        );
        Ok(schema)
    }

    fn load_campaigns(&self) -> MetaResult<Vec<Campaign>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, valid_from, valid_to, firing_interval, firing_start_condition
             FROM campaign ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut campaigns = Vec::new();
        for row in rows {
            let (id, from, to, interval, start) = row?;
            let policy = FiringPolicy::from_meta(&interval, &start)?;
            campaigns.push(Campaign::new(campaign_id(id)?, from, to, policy));
        }
        Ok(campaigns)
    }

    /// Predicates keyed by row id
    fn load_predicates(&self, schema: &AnalyticsSchema) -> MetaResult<BTreeMap<i64, Predicate>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.wt_attribute, p.operator, c.value, c.data_type
             FROM predicate p JOIN constant c ON p.constant = c.id
             ORDER BY p.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut predicates = BTreeMap::new();
        for row in rows {
            let (id, attribute, op, value, data_type) = row?;
            let index = usize::try_from(attribute - 1)
                .ok()
                .filter(|&i| i < schema.len())
                .ok_or_else(|| {
                    MetaError::Invalid(format!("predicate {}: attribute {}", id, attribute))
                })?;
            let data_type = DataType::parse(&data_type).ok_or_else(|| {
                MetaError::Invalid(format!("predicate {}: data type {}", id, data_type))
            })?;
            let constant = parse_constant(data_type, &value)?;
            let op = Operator::parse(&op)?;
            predicates.insert(id, Predicate::new(schema.offset_at(index), op, constant));
        }
        Ok(predicates)
    }

    /// (campaign id, predicate row ids) per conjunct, in conjunct id order
    fn load_conjunct_rows(&self) -> MetaResult<Vec<(u32, Vec<i64>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.campaign, cp.predicate
             FROM conjunct c JOIN conjunct_predicate cp ON cp.conjunct = c.id
             ORDER BY c.id, cp.predicate",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut conjuncts: Vec<(i64, u32, Vec<i64>)> = Vec::new();
        for row in rows {
            let (id, campaign, predicate) = row?;
            match conjuncts.last_mut() {
                Some((last, _, preds)) if *last == id => preds.push(predicate),
                _ => conjuncts.push((id, campaign_id(campaign)?, vec![predicate])),
            }
        }
        Ok(conjuncts.into_iter().map(|(_, c, p)| (c, p)).collect())
    }

    /// Every conjunct with all of its predicates, for inspection and tests
    pub fn load_conjuncts(&self, schema: &AnalyticsSchema) -> MetaResult<Vec<Conjunct>> {
        let predicates = self.load_predicates(schema)?;
        self.load_conjunct_rows()?
            .into_iter()
            .map(|(campaign, ids)| {
                let preds = ids
                    .iter()
                    .map(|id| {
                        predicates
                            .get(id)
                            .copied()
                            .ok_or_else(|| MetaError::Invalid(format!("unknown predicate {}", id)))
                    })
                    .collect::<MetaResult<Vec<_>>>()?;
                Ok(Conjunct::new(campaign, preds))
            })
            .collect()
    }

    /// Build the campaign index; pivot attributes become entry attributes
    pub fn load_campaign_index(&self, schema: &AnalyticsSchema) -> MetaResult<CampaignIndex> {
        let mut builder = CampaignIndexBuilder::new(schema);

        let mut stmt = self
            .conn
            .prepare("SELECT id FROM wt_attribute WHERE is_pivot = 1 ORDER BY id")?;
        let pivots = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for id in pivots {
            let index = usize::try_from(id - 1)
                .ok()
                .filter(|&i| i < schema.len())
                .ok_or_else(|| MetaError::Invalid(format!("pivot attribute {}", id)))?;
            builder.entry_attribute(schema.offset_at(index))?;
        }

        for campaign in self.load_campaigns()? {
            builder.add_campaign(campaign)?;
        }

        let mut ids = HashMap::new();
        for (row_id, predicate) in self.load_predicates(schema)? {
            ids.insert(row_id, builder.add_predicate(predicate)?);
        }

        for (campaign, rows) in self.load_conjunct_rows()? {
            let preds = rows
                .iter()
                .map(|r| {
                    ids.get(r)
                        .copied()
                        .ok_or_else(|| MetaError::Invalid(format!("unknown predicate {}", r)))
                })
                .collect::<MetaResult<Vec<_>>>()?;
            builder.add_conjunct(campaign, &preds)?;
        }

        let index = builder.build()?;
        tracing::info!(
            campaigns = index.campaigns().len(),
            predicates = index.num_predicates(),
            entry_indexes = index.num_entry_indexes(),
            indexed_conjuncts = index.num_indexed(),
            unindexed_conjuncts = index.num_unindexed(),
            "Loaded campaign index"
        );
        Ok(index)
    }
}

fn campaign_id(row_id: i64) -> MetaResult<u32> {
    u32::try_from(row_id - 1).map_err(|_| MetaError::Invalid(format!("campaign id {}", row_id)))
}
