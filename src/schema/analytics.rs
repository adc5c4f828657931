//! The analytics matrix schema
//!
//! An ordered list of attributes with fixed byte offsets. Built once at
//! startup and shared read-only afterwards.

use std::collections::HashMap;

use super::entry::{SchemaEntry, Window};
use super::error::{SchemaError, SchemaResult};
use super::event::Event;
use super::record::{RecordBuf, RecordView, Value};
use super::types::{AggrFun, FilterType, Metric, WindowLength, TIMESTAMP_SIZE};

/// Lookup key of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrKey {
    pub metric: Metric,
    pub aggr: AggrFun,
    pub filter: FilterType,
    pub window: WindowLength,
}

impl AttrKey {
    pub fn new(metric: Metric, aggr: AggrFun, filter: FilterType, window: WindowLength) -> Self {
        Self {
            metric,
            aggr,
            filter,
            window,
        }
    }
}

/// Layout and update semantics of the per-subscriber analytics record
#[derive(Debug, Clone)]
pub struct AnalyticsSchema {
    entries: Vec<SchemaEntry>,
    lookup: HashMap<AttrKey, usize>,
    total_size: usize,
}

impl AnalyticsSchema {
    /// Assign offsets in order, after the leading timestamp
    pub fn from_entries(entries: Vec<SchemaEntry>) -> SchemaResult<Self> {
        let mut offset = TIMESTAMP_SIZE;
        let mut lookup = HashMap::with_capacity(entries.len());
        let mut placed = Vec::with_capacity(entries.len());

        for (i, mut entry) in entries.into_iter().enumerate() {
            let key = AttrKey::new(entry.metric, entry.aggr, entry.filter, entry.window.length);
            if lookup.insert(key, i).is_some() {
                return Err(SchemaError::DuplicateAttribute(entry.name()));
            }
            entry.offset = offset;
            offset += entry.size();
            placed.push(entry);
        }

        Ok(Self {
            entries: placed,
            lookup,
            total_size: offset,
        })
    }

    /// The 42 attributes of the standard workload: for day and week, for no,
    /// local and non-local filters, cost sum/min/max, duration sum/min/max and
    /// call count.
    pub fn standard() -> Self {
        let mut entries = Vec::with_capacity(42);
        for window in [WindowLength::Day, WindowLength::Week] {
            for filter in [FilterType::No, FilterType::Local, FilterType::NonLocal] {
                for (metric, aggr) in [
                    (Metric::Cost, AggrFun::Sum),
                    (Metric::Cost, AggrFun::Min),
                    (Metric::Cost, AggrFun::Max),
                    (Metric::Dur, AggrFun::Sum),
                    (Metric::Dur, AggrFun::Min),
                    (Metric::Dur, AggrFun::Max),
                    (Metric::Call, AggrFun::Sum),
                ] {
                    entries.push(SchemaEntry::new(
                        metric,
                        aggr,
                        filter,
                        Window::tumbling(window),
                    ));
                }
            }
        }
        // Combinations above are distinct
        match Self::from_entries(entries) {
            Ok(schema) => schema,
            Err(e) => unreachable!("standard schema is well formed: {e}"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> &SchemaEntry {
        &self.entries[index]
    }

    /// Record byte length, timestamp included
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Column sizes, starting with the timestamp column
    pub fn sizes(&self) -> Vec<usize> {
        std::iter::once(TIMESTAMP_SIZE)
            .chain(self.entries.iter().map(|e| e.size()))
            .collect()
    }

    /// Byte offset of the attribute at `index`
    pub fn offset_at(&self, index: usize) -> usize {
        self.entries[index].offset
    }

    pub fn index_of(
        &self,
        metric: Metric,
        aggr: AggrFun,
        filter: FilterType,
        window: WindowLength,
    ) -> Option<usize> {
        self.lookup
            .get(&AttrKey::new(metric, aggr, filter, window))
            .copied()
    }

    pub fn offset_of(
        &self,
        metric: Metric,
        aggr: AggrFun,
        filter: FilterType,
        window: WindowLength,
    ) -> Option<usize> {
        self.index_of(metric, aggr, filter, window)
            .map(|i| self.entries[i].offset)
    }

    pub fn index_by_name(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name() == name)
    }

    /// Wrap bytes as a record of this schema
    pub fn view<'a>(&self, bytes: &'a [u8]) -> SchemaResult<RecordView<'a>> {
        if bytes.len() != self.total_size {
            return Err(SchemaError::SizeMismatch {
                expected: self.total_size,
                actual: bytes.len(),
            });
        }
        Ok(RecordView::new(bytes))
    }

    /// Record holding the neutral value of every attribute
    pub fn default_record(&self, timestamp: i64) -> Vec<u8> {
        let mut rec = RecordBuf::zeroed(self.total_size);
        rec.set_timestamp(timestamp);
        for entry in &self.entries {
            entry.init_default(&mut rec);
        }
        rec.into_bytes()
    }

    /// Record for a subscriber seen for the first time
    pub fn record_from_event(&self, event: &Event) -> Vec<u8> {
        let mut rec = RecordBuf::zeroed(self.total_size);
        rec.set_timestamp(event.timestamp);
        for entry in &self.entries {
            if entry.filter(event) {
                entry.init(&mut rec, event);
            } else {
                entry.init_default(&mut rec);
            }
        }
        rec.into_bytes()
    }

    /// Apply an event to the previous version of a record
    pub fn update_record(&self, prev: &[u8], event: &Event) -> Vec<u8> {
        assert_eq!(prev.len(), self.total_size, "record size mismatch");
        let prev = RecordView::new(prev);
        let old_ts = prev.timestamp();
        let mut rec = RecordBuf::zeroed(self.total_size);
        rec.set_timestamp(event.timestamp);

        for entry in &self.entries {
            let pass = entry.filter(event);
            if entry.window.same_window(old_ts, event.timestamp) {
                if pass {
                    entry.update(&prev, &mut rec, event);
                } else {
                    entry.maintain(&prev, &mut rec);
                }
            } else if pass {
                entry.init(&mut rec, event);
            } else {
                entry.init_default(&mut rec);
            }
        }
        rec.into_bytes()
    }

    /// Named attribute values of a record
    pub fn decode(&self, bytes: &[u8]) -> SchemaResult<Vec<(String, Value)>> {
        let view = self.view(bytes)?;
        Ok(self
            .entries
            .iter()
            .map(|e| (e.name(), view.get(e.offset, e.data_type())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{FIRST_MONDAY, MSECS_PER_DAY};

    #[test]
    fn test_standard_layout() {
        let schema = AnalyticsSchema::standard();
        assert_eq!(schema.len(), 42);
        // 6 groups of 3 doubles and 4 uints
        assert_eq!(schema.total_size(), 8 + 6 * (3 * 8 + 4 * 4));
        assert_eq!(schema.offset_at(0), 8);
        assert_eq!(schema.sizes()[0], 8);
        assert_eq!(schema.sizes().iter().sum::<usize>(), schema.total_size());

        let idx = schema
            .index_of(Metric::Call, AggrFun::Sum, FilterType::Local, WindowLength::Week)
            .unwrap();
        assert_eq!(schema.entry(idx).name(), "calls_sum_local_week");
        assert_eq!(schema.index_by_name("calls_sum_local_week"), Some(idx));
        assert!(schema
            .offset_of(Metric::Call, AggrFun::Max, FilterType::No, WindowLength::Day)
            .is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let w = Window::tumbling(WindowLength::Day);
        let entries = vec![
            SchemaEntry::new(Metric::Dur, AggrFun::Sum, FilterType::No, w),
            SchemaEntry::new(Metric::Dur, AggrFun::Sum, FilterType::No, w),
        ];
        assert!(matches!(
            AnalyticsSchema::from_entries(entries),
            Err(SchemaError::DuplicateAttribute(_))
        ));
    }

    #[test]
    fn test_record_lifecycle() {
        let schema = AnalyticsSchema::standard();
        let calls_local_week = schema
            .offset_of(Metric::Call, AggrFun::Sum, FilterType::Local, WindowLength::Week)
            .unwrap();
        let calls_nonlocal_day = schema
            .offset_of(Metric::Call, AggrFun::Sum, FilterType::NonLocal, WindowLength::Day)
            .unwrap();
        let dur_max_day = schema
            .offset_of(Metric::Dur, AggrFun::Max, FilterType::No, WindowLength::Day)
            .unwrap();
        let cost_min_local = schema
            .offset_of(Metric::Cost, AggrFun::Min, FilterType::Local, WindowLength::Day)
            .unwrap();

        let t0 = FIRST_MONDAY + 100 * MSECS_PER_DAY;
        let first = Event::new(1, t0).call(60, 1.0);
        let rec = schema.record_from_event(&first);
        let v = RecordView::new(&rec);
        assert_eq!(v.timestamp(), t0);
        assert_eq!(v.get_u32(calls_local_week), 1);
        assert_eq!(v.get_u32(calls_nonlocal_day), 0);
        assert_eq!(v.get_f64(cost_min_local), 1.0);

        // same day, long distance call
        let second = Event::new(1, t0 + 1000).call(90, 3.0).long_distance(true);
        let rec = schema.update_record(&rec, &second);
        let v = RecordView::new(&rec);
        assert_eq!(v.get_u32(calls_local_week), 1);
        assert_eq!(v.get_u32(calls_nonlocal_day), 1);
        assert_eq!(v.get_u32(dur_max_day), 90);
        assert_eq!(v.get_f64(cost_min_local), 1.0);

        // two days later: day windows restart, week windows continue
        let third = Event::new(1, t0 + 2 * MSECS_PER_DAY).call(10, 0.5);
        let rec = schema.update_record(&rec, &third);
        let v = RecordView::new(&rec);
        assert_eq!(v.get_u32(calls_local_week), 2);
        assert_eq!(v.get_u32(calls_nonlocal_day), 0);
        assert_eq!(v.get_u32(dur_max_day), 10);
    }

    #[test]
    fn test_default_record_and_decode() {
        let schema = AnalyticsSchema::standard();
        let rec = schema.default_record(7);
        let decoded = schema.decode(&rec).unwrap();
        assert_eq!(decoded.len(), 42);
        assert_eq!(decoded[0], ("cost_sum_all_day".to_string(), Value::Double(0.0)));
        assert_eq!(decoded[1], ("cost_min_all_day".to_string(), Value::Double(f64::MAX)));
        assert!(schema.decode(&rec[1..]).is_err());
    }
}
