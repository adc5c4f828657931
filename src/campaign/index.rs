//! Campaign matching index and its builder
//!
//! `match_campaigns` runs against every updated record:
//!
//! ```text
//! for each entry attribute:
//!     stab its interval tree with the record's value
//!     evaluate the remaining predicates of every returned conjunct
//! evaluate every unindexed conjunct in full
//! ```
//!
//! Conjuncts of the same campaign are ORed by setting the same bit.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::entry_index::{EntryAttrIndex, EntryIndex};
use super::error::{CampaignError, CampaignResult};
use super::firing::Campaign;
use super::predicate::{value_type, Conjunct, Operator, Predicate};
use super::rtree::RangeKey;
use crate::schema::{AnalyticsSchema, DataType, RecordView, Value};

/// Bitset of matched campaign ids
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchSet {
    words: Vec<u64>,
    len: usize,
}

impl MatchSet {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// Capacity in campaign ids
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    #[inline]
    pub fn insert(&mut self, id: u32) {
        let id = id as usize;
        debug_assert!(id < self.len);
        self.words[id / 64] |= 1 << (id % 64);
    }

    pub fn contains(&self, id: u32) -> bool {
        let id = id as usize;
        id < self.len && self.words[id / 64] & (1 << (id % 64)) != 0
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..64u32)
                .filter(move |b| w & (1 << b) != 0)
                .map(move |b| i as u32 * 64 + b)
        })
    }
}

/// Read-only campaign matching index
#[derive(Debug)]
pub struct CampaignIndex {
    record_size: usize,
    campaigns: Vec<Campaign>,
    num_campaigns: usize,
    num_predicates: usize,
    unindexed: Vec<Conjunct>,
    /// Conjunct groups returned by the entry indexes
    indexed: Vec<Vec<Conjunct>>,
    entry_indexes: Vec<Box<dyn EntryIndex>>,
}

impl CampaignIndex {
    /// Index that matches nothing
    pub fn empty(record_size: usize) -> Self {
        Self {
            record_size,
            campaigns: Vec::new(),
            num_campaigns: 0,
            num_predicates: 0,
            unindexed: Vec::new(),
            indexed: Vec::new(),
            entry_indexes: Vec::new(),
        }
    }

    /// Bit size of the match set: highest campaign id + 1
    pub fn num_campaigns(&self) -> usize {
        self.num_campaigns
    }

    pub fn num_predicates(&self) -> usize {
        self.num_predicates
    }

    pub fn num_entry_indexes(&self) -> usize {
        self.entry_indexes.len()
    }

    pub fn num_indexed(&self) -> usize {
        self.indexed.iter().map(Vec::len).sum()
    }

    pub fn num_unindexed(&self) -> usize {
        self.unindexed.len()
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    pub fn campaign(&self, id: u32) -> Option<&Campaign> {
        self.campaigns
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|i| &self.campaigns[i])
    }

    /// Campaigns whose conditions hold on `record`
    pub fn match_campaigns(&self, record: &[u8]) -> MatchSet {
        debug_assert_eq!(record.len(), self.record_size);
        let view = RecordView::new(record);
        let mut matched = MatchSet::new(self.num_campaigns);
        let mut groups = Vec::new();

        for index in &self.entry_indexes {
            groups.clear();
            index.candidates(&view, &mut groups);
            for &group in &groups {
                for conjunct in &self.indexed[group] {
                    if conjunct.evaluate(&view) {
                        matched.insert(conjunct.campaign_id());
                    }
                }
            }
        }
        for conjunct in &self.unindexed {
            if conjunct.evaluate(&view) {
                matched.insert(conjunct.campaign_id());
            }
        }
        matched
    }
}

/// Inclusive key range satisfying `x op value`; `None` when nothing does
pub fn predicate_range<K: RangeKey>(op: Operator, value: K) -> Option<(K, K)> {
    match op {
        Operator::Lte => Some((K::MIN, value)),
        Operator::Lt => value.pred().map(|v| (K::MIN, v)),
        Operator::Eq => Some((value, value)),
        Operator::Gre => Some((value, K::MAX)),
        Operator::Gr => value.succ().map(|v| (v, K::MAX)),
    }
}

/// Collects predicates, conjuncts and campaigns, then builds the index
#[derive(Debug)]
pub struct CampaignIndexBuilder {
    record_size: usize,
    /// Attribute offset -> type
    attributes: HashMap<usize, DataType>,
    entry_attributes: BTreeSet<usize>,
    predicates: Vec<Predicate>,
    conjuncts: Vec<(u32, Vec<usize>)>,
    campaigns: BTreeMap<u32, Campaign>,
}

impl CampaignIndexBuilder {
    pub fn new(schema: &AnalyticsSchema) -> Self {
        let attributes = (0..schema.len())
            .map(|i| (schema.offset_at(i), schema.entry(i).data_type()))
            .collect();
        Self {
            record_size: schema.total_size(),
            attributes,
            entry_attributes: BTreeSet::new(),
            predicates: Vec::new(),
            conjuncts: Vec::new(),
            campaigns: BTreeMap::new(),
        }
    }

    fn attribute_type(&self, offset: usize) -> CampaignResult<DataType> {
        self.attributes
            .get(&offset)
            .copied()
            .ok_or(CampaignError::OffsetOutOfRange {
                offset,
                record_size: self.record_size,
            })
    }

    /// Index predicates on the attribute at `offset`
    pub fn entry_attribute(&mut self, offset: usize) -> CampaignResult<&mut Self> {
        self.attribute_type(offset)?;
        self.entry_attributes.insert(offset);
        Ok(self)
    }

    pub fn add_campaign(&mut self, campaign: Campaign) -> CampaignResult<()> {
        if self.campaigns.contains_key(&campaign.id) {
            return Err(CampaignError::DuplicateCampaign(campaign.id));
        }
        self.campaigns.insert(campaign.id, campaign);
        Ok(())
    }

    /// Register a predicate; returns its id for [`add_conjunct`](Self::add_conjunct)
    pub fn add_predicate(&mut self, predicate: Predicate) -> CampaignResult<usize> {
        let expected = self.attribute_type(predicate.offset())?;
        if expected != predicate.data_type() {
            return Err(CampaignError::TypeMismatch {
                offset: predicate.offset(),
                expected,
                actual: predicate.data_type(),
            });
        }
        self.predicates.push(predicate);
        Ok(self.predicates.len() - 1)
    }

    pub fn add_conjunct(&mut self, campaign_id: u32, predicate_ids: &[usize]) -> CampaignResult<()> {
        if let Some(&bad) = predicate_ids.iter().find(|&&p| p >= self.predicates.len()) {
            return Err(CampaignError::UnknownPredicate(bad));
        }
        self.conjuncts.push((campaign_id, predicate_ids.to_vec()));
        Ok(())
    }

    pub fn build(self) -> CampaignResult<CampaignIndex> {
        for (campaign_id, _) in &self.conjuncts {
            if !self.campaigns.contains_key(campaign_id) {
                return Err(CampaignError::UnknownCampaign(*campaign_id));
            }
        }

        let is_entry = |p: usize| self.entry_attributes.contains(&self.predicates[p].offset());
        let mut unindexed = Vec::new();
        // entry predicate -> conjuncts containing it, without it
        let mut by_entry: BTreeMap<usize, Vec<Conjunct>> = BTreeMap::new();

        for (campaign_id, ids) in &self.conjuncts {
            let entries: Vec<usize> = ids.iter().copied().filter(|&p| is_entry(p)).collect();
            if entries.is_empty() {
                let preds = ids.iter().map(|&p| self.predicates[p]).collect();
                unindexed.push(Conjunct::new(*campaign_id, preds));
                continue;
            }
            for (pos, &entry) in ids.iter().enumerate() {
                if !entries.contains(&entry) || ids[..pos].contains(&entry) {
                    continue;
                }
                let rest = ids
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != pos)
                    .map(|(_, &p)| self.predicates[p])
                    .collect();
                by_entry
                    .entry(entry)
                    .or_default()
                    .push(Conjunct::new(*campaign_id, rest));
            }
        }

        let mut indexed = Vec::with_capacity(by_entry.len());
        let mut ranges_by_offset: BTreeMap<usize, Vec<(Value, Operator, usize)>> = BTreeMap::new();
        for (entry, group) in by_entry {
            let p = self.predicates[entry];
            ranges_by_offset
                .entry(p.offset())
                .or_default()
                .push((p.constant(), p.operator(), indexed.len()));
            indexed.push(group);
        }

        let mut entry_indexes: Vec<Box<dyn EntryIndex>> = Vec::with_capacity(ranges_by_offset.len());
        for (offset, ranges) in ranges_by_offset {
            let data_type = self.attribute_type(offset)?;
            let index: Box<dyn EntryIndex> = match data_type {
                DataType::Int => Box::new(entry_index::<i32>(offset, data_type, &ranges)?),
                DataType::UInt => Box::new(entry_index::<u32>(offset, data_type, &ranges)?),
                DataType::ULong => Box::new(entry_index::<u64>(offset, data_type, &ranges)?),
                DataType::Double => Box::new(entry_index::<f64>(offset, data_type, &ranges)?),
            };
            entry_indexes.push(index);
        }

        let campaigns: Vec<Campaign> = self.campaigns.into_values().collect();
        let num_campaigns = campaigns.last().map_or(0, |c| c.id as usize + 1);
        let index = CampaignIndex {
            record_size: self.record_size,
            campaigns,
            num_campaigns,
            num_predicates: self.predicates.len(),
            unindexed,
            indexed,
            entry_indexes,
        };
        tracing::debug!(
            campaigns = index.campaigns.len(),
            predicates = index.num_predicates,
            entry_indexes = index.num_entry_indexes(),
            indexed = index.num_indexed(),
            unindexed = index.num_unindexed(),
            "Built campaign index"
        );
        Ok(index)
    }
}

fn entry_index<K: RangeKey>(
    offset: usize,
    data_type: DataType,
    ranges: &[(Value, Operator, usize)],
) -> CampaignResult<EntryAttrIndex<K>> {
    let mut bounds = Vec::with_capacity(ranges.len());
    for &(constant, op, group) in ranges {
        let value = K::from_value(constant).ok_or(CampaignError::TypeMismatch {
            offset,
            expected: data_type,
            actual: value_type(constant),
        })?;
        if let Some((lo, hi)) = predicate_range(op, value) {
            bounds.push((lo, hi, group));
        }
    }
    Ok(EntryAttrIndex::new(offset, bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::FiringPolicy;
    use crate::schema::{AggrFun, FilterType, Metric, RecordBuf, WindowLength};

    struct Fixture {
        schema: AnalyticsSchema,
        calls: usize,
        dur: usize,
        cost: usize,
    }

    fn fixture() -> Fixture {
        let schema = AnalyticsSchema::standard();
        let calls = schema
            .offset_of(Metric::Call, AggrFun::Sum, FilterType::No, WindowLength::Week)
            .unwrap();
        let dur = schema
            .offset_of(Metric::Dur, AggrFun::Sum, FilterType::No, WindowLength::Week)
            .unwrap();
        let cost = schema
            .offset_of(Metric::Cost, AggrFun::Sum, FilterType::No, WindowLength::Week)
            .unwrap();
        Fixture {
            schema,
            calls,
            dur,
            cost,
        }
    }

    fn record(f: &Fixture, calls: u32, dur: u32, cost: f64) -> Vec<u8> {
        let mut rec = RecordBuf::from_bytes(f.schema.default_record(0));
        rec.set_u32(f.calls, calls);
        rec.set_u32(f.dur, dur);
        rec.set_f64(f.cost, cost);
        rec.into_bytes()
    }

    fn campaign(id: u32) -> Campaign {
        Campaign::new(id, 0, i64::MAX, FiringPolicy::Always)
    }

    /// 0: calls >= 5
    /// 1: calls > 5 AND dur < 100
    /// 2: dur <= 10             (unindexed)
    /// 3: calls == 7 OR cost >= 2.5
    fn build(f: &Fixture) -> CampaignIndex {
        let mut b = CampaignIndexBuilder::new(&f.schema);
        b.entry_attribute(f.calls).unwrap();
        for id in 0..4 {
            b.add_campaign(campaign(id)).unwrap();
        }
        let calls_gre5 = b.add_predicate(Predicate::new(f.calls, Operator::Gre, Value::UInt(5))).unwrap();
        let calls_gr5 = b.add_predicate(Predicate::new(f.calls, Operator::Gr, Value::UInt(5))).unwrap();
        let dur_lt100 = b.add_predicate(Predicate::new(f.dur, Operator::Lt, Value::UInt(100))).unwrap();
        let dur_lte10 = b.add_predicate(Predicate::new(f.dur, Operator::Lte, Value::UInt(10))).unwrap();
        let calls_eq7 = b.add_predicate(Predicate::new(f.calls, Operator::Eq, Value::UInt(7))).unwrap();
        let cost_gre = b.add_predicate(Predicate::new(f.cost, Operator::Gre, Value::Double(2.5))).unwrap();

        b.add_conjunct(0, &[calls_gre5]).unwrap();
        b.add_conjunct(1, &[calls_gr5, dur_lt100]).unwrap();
        b.add_conjunct(2, &[dur_lte10]).unwrap();
        b.add_conjunct(3, &[calls_eq7]).unwrap();
        b.add_conjunct(3, &[cost_gre]).unwrap();
        b.build().unwrap()
    }

    fn matched(index: &CampaignIndex, rec: &[u8]) -> Vec<u32> {
        index.match_campaigns(rec).iter().collect()
    }

    #[test]
    fn test_index_shape() {
        let f = fixture();
        let index = build(&f);
        assert_eq!(index.num_campaigns(), 4);
        assert_eq!(index.num_entry_indexes(), 1);
        assert_eq!(index.num_indexed(), 3);
        assert_eq!(index.num_unindexed(), 2);
    }

    #[test]
    fn test_boundaries() {
        let f = fixture();
        let index = build(&f);
        assert_eq!(matched(&index, &record(&f, 4, 50, 0.0)), Vec::<u32>::new());
        assert_eq!(matched(&index, &record(&f, 5, 50, 0.0)), vec![0]);
        assert_eq!(matched(&index, &record(&f, 6, 99, 0.0)), vec![0, 1]);
        assert_eq!(matched(&index, &record(&f, 6, 100, 0.0)), vec![0]);
        assert_eq!(matched(&index, &record(&f, 7, 10, 0.0)), vec![0, 1, 2, 3]);
        assert_eq!(matched(&index, &record(&f, 0, 11, 2.5)), vec![3]);
        assert_eq!(matched(&index, &record(&f, 0, 11, 2.4999)), Vec::<u32>::new());
    }

    #[test]
    fn test_matches_brute_force() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let f = fixture();
        let mut rng = StdRng::seed_from_u64(11);
        let mut b = CampaignIndexBuilder::new(&f.schema);
        b.entry_attribute(f.calls).unwrap();
        let mut expected_conjuncts = Vec::new();
        for id in 0..40u32 {
            b.add_campaign(campaign(id)).unwrap();
            for _ in 0..rng.gen_range(1..3) {
                let mut preds = Vec::new();
                for _ in 0..rng.gen_range(1..4) {
                    let op = Operator::all()[rng.gen_range(0..5)];
                    let pred = if rng.gen_bool(0.6) {
                        Predicate::new(f.calls, op, Value::UInt(rng.gen_range(0..20)))
                    } else {
                        Predicate::new(f.dur, op, Value::UInt(rng.gen_range(0..200)))
                    };
                    preds.push(pred);
                }
                let ids: Vec<usize> = preds.iter().map(|p| b.add_predicate(*p).unwrap()).collect();
                b.add_conjunct(id, &ids).unwrap();
                expected_conjuncts.push(Conjunct::new(id, preds));
            }
        }
        let index = b.build().unwrap();

        for _ in 0..500 {
            let rec = record(&f, rng.gen_range(0..22), rng.gen_range(0..210), 0.0);
            let view = RecordView::new(&rec);
            let mut expected: Vec<u32> = expected_conjuncts
                .iter()
                .filter(|c| c.evaluate(&view))
                .map(|c| c.campaign_id())
                .collect();
            expected.sort_unstable();
            expected.dedup();
            assert_eq!(matched(&index, &rec), expected);
        }
    }

    #[test]
    fn test_empty_index() {
        let f = fixture();
        let index = CampaignIndex::empty(f.schema.total_size());
        assert!(index.match_campaigns(&record(&f, 1, 1, 1.0)).is_empty());
    }

    #[test]
    fn test_builder_errors() {
        let f = fixture();
        let mut b = CampaignIndexBuilder::new(&f.schema);
        assert!(matches!(
            b.add_predicate(Predicate::new(f.calls, Operator::Gr, Value::Double(1.0))),
            Err(CampaignError::TypeMismatch { .. })
        ));
        assert!(matches!(
            b.add_predicate(Predicate::new(3, Operator::Gr, Value::UInt(1))),
            Err(CampaignError::OffsetOutOfRange { .. })
        ));
        assert!(matches!(
            b.add_conjunct(0, &[9]),
            Err(CampaignError::UnknownPredicate(9))
        ));
        b.add_campaign(campaign(1)).unwrap();
        assert!(matches!(
            b.add_campaign(campaign(1)),
            Err(CampaignError::DuplicateCampaign(1))
        ));
        let p = b.add_predicate(Predicate::new(f.calls, Operator::Gr, Value::UInt(1))).unwrap();
        b.add_conjunct(2, &[p]).unwrap();
        assert!(matches!(b.build(), Err(CampaignError::UnknownCampaign(2))));
    }

    #[test]
    fn test_predicate_range() {
        assert_eq!(predicate_range(Operator::Lt, 5u32), Some((0, 4)));
        assert_eq!(predicate_range(Operator::Lt, 0u32), None);
        assert_eq!(predicate_range(Operator::Gr, 5u32), Some((6, u32::MAX)));
        assert_eq!(predicate_range(Operator::Gre, 5u32), Some((5, u32::MAX)));
        assert_eq!(predicate_range(Operator::Eq, -2i32), Some((-2, -2)));
        let (lo, hi) = predicate_range(Operator::Lt, 1.0f64).unwrap();
        assert_eq!(lo, f64::NEG_INFINITY);
        assert!(hi < 1.0);
    }

    #[test]
    fn test_match_set() {
        let mut set = MatchSet::new(130);
        set.insert(0);
        set.insert(64);
        set.insert(129);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 64, 129]);
        assert_eq!(set.count(), 3);
        assert!(set.contains(129));
        assert!(!set.contains(200));
    }
}
