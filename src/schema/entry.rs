//! Per-attribute update behavior
//!
//! Each attribute carries an [`AttrKind`] chosen once when the schema is
//! built. Initialising, updating and maintaining a field is a `match` on that
//! tag, so the event path never goes through an indirect call.

use serde::{Deserialize, Serialize};

use super::event::Event;
use super::record::{RecordBuf, RecordView};
use super::types::{AggrFun, DataType, FilterType, Metric, WindowLength, WindowType, FIRST_MONDAY};

/// Aggregation kernel, closed over {aggregation} x {storage type}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    SumUInt,
    MinUInt,
    MaxUInt,
    SumDouble,
    MinDouble,
    MaxDouble,
}

impl AttrKind {
    pub fn new(aggr: AggrFun, metric: Metric) -> Self {
        match (aggr, metric.data_type()) {
            (AggrFun::Sum, DataType::Double) => AttrKind::SumDouble,
            (AggrFun::Min, DataType::Double) => AttrKind::MinDouble,
            (AggrFun::Max, DataType::Double) => AttrKind::MaxDouble,
            (AggrFun::Sum, _) => AttrKind::SumUInt,
            (AggrFun::Min, _) => AttrKind::MinUInt,
            (AggrFun::Max, _) => AttrKind::MaxUInt,
        }
    }
}

/// Window over which an attribute aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub window_type: WindowType,
    pub length: WindowLength,
    /// Start of the first window, in ms since the epoch
    pub init: i64,
    pub duration: i64,
}

impl Window {
    pub fn tumbling(length: WindowLength) -> Self {
        Self {
            window_type: WindowType::Tumbling,
            length,
            init: FIRST_MONDAY,
            duration: length.duration_ms(),
        }
    }

    /// Start of the window containing `ts`
    #[inline]
    pub fn start_of(&self, ts: i64) -> i64 {
        (ts - self.init).div_euclid(self.duration) * self.duration + self.init
    }

    /// Whether an event at `event_ts` still falls into the window of a record
    /// last updated at `record_ts`
    #[inline]
    pub fn same_window(&self, record_ts: i64, event_ts: i64) -> bool {
        event_ts <= self.start_of(record_ts).saturating_add(self.duration)
    }
}

/// One attribute of the analytics record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchemaEntry {
    pub metric: Metric,
    pub aggr: AggrFun,
    pub filter: FilterType,
    pub window: Window,
    pub kind: AttrKind,
    /// Byte offset inside the record, assigned by the schema
    pub offset: usize,
}

impl SchemaEntry {
    pub fn new(metric: Metric, aggr: AggrFun, filter: FilterType, window: Window) -> Self {
        Self {
            metric,
            aggr,
            filter,
            window,
            kind: AttrKind::new(aggr, metric),
            offset: 0,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.metric.data_type()
    }

    pub fn size(&self) -> usize {
        self.data_type().size()
    }

    /// Attribute name such as `calls_sum_local_week`
    pub fn name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.metric.name(),
            self.aggr.name(),
            self.filter.name(),
            self.window.length.name()
        )
    }

    #[inline]
    pub fn filter(&self, event: &Event) -> bool {
        self.filter.accepts(event.long_distance)
    }

    #[inline]
    fn event_u32(&self, event: &Event) -> u32 {
        match self.metric {
            Metric::Call => 1,
            Metric::Dur => event.duration,
            Metric::Cost => event.cost as u32,
        }
    }

    #[inline]
    fn event_f64(&self, event: &Event) -> f64 {
        match self.metric {
            Metric::Call => 1.0,
            Metric::Dur => event.duration as f64,
            Metric::Cost => event.cost,
        }
    }

    /// Neutral element of the aggregation
    pub fn init_default(&self, rec: &mut RecordBuf) {
        let o = self.offset;
        match self.kind {
            AttrKind::SumUInt => rec.set_u32(o, 0),
            AttrKind::MinUInt => rec.set_u32(o, u32::MAX),
            AttrKind::MaxUInt => rec.set_u32(o, u32::MIN),
            AttrKind::SumDouble => rec.set_f64(o, 0.0),
            AttrKind::MinDouble => rec.set_f64(o, f64::MAX),
            AttrKind::MaxDouble => rec.set_f64(o, f64::MIN),
        }
    }

    /// First value of a fresh window
    pub fn init(&self, rec: &mut RecordBuf, event: &Event) {
        let o = self.offset;
        match self.kind {
            AttrKind::SumUInt | AttrKind::MinUInt | AttrKind::MaxUInt => {
                rec.set_u32(o, self.event_u32(event))
            }
            AttrKind::SumDouble | AttrKind::MinDouble | AttrKind::MaxDouble => {
                rec.set_f64(o, self.event_f64(event))
            }
        }
    }

    /// Fold the event into the previous value
    pub fn update(&self, prev: &RecordView<'_>, rec: &mut RecordBuf, event: &Event) {
        let o = self.offset;
        match self.kind {
            AttrKind::SumUInt => rec.set_u32(o, prev.get_u32(o).wrapping_add(self.event_u32(event))),
            AttrKind::MinUInt => rec.set_u32(o, prev.get_u32(o).min(self.event_u32(event))),
            AttrKind::MaxUInt => rec.set_u32(o, prev.get_u32(o).max(self.event_u32(event))),
            AttrKind::SumDouble => rec.set_f64(o, prev.get_f64(o) + self.event_f64(event)),
            AttrKind::MinDouble => rec.set_f64(o, prev.get_f64(o).min(self.event_f64(event))),
            AttrKind::MaxDouble => rec.set_f64(o, prev.get_f64(o).max(self.event_f64(event))),
        }
    }

    /// Carry the previous value over unchanged
    pub fn maintain(&self, prev: &RecordView<'_>, rec: &mut RecordBuf) {
        let o = self.offset;
        match self.kind {
            AttrKind::SumUInt | AttrKind::MinUInt | AttrKind::MaxUInt => {
                rec.set_u32(o, prev.get_u32(o))
            }
            AttrKind::SumDouble | AttrKind::MinDouble | AttrKind::MaxDouble => {
                rec.set_f64(o, prev.get_f64(o))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::MSECS_PER_DAY;

    fn entry(metric: Metric, aggr: AggrFun, filter: FilterType) -> SchemaEntry {
        let mut e = SchemaEntry::new(metric, aggr, filter, Window::tumbling(WindowLength::Day));
        e.offset = 8;
        e
    }

    #[test]
    fn test_window_boundaries() {
        let w = Window::tumbling(WindowLength::Day);
        let start = FIRST_MONDAY + 10 * MSECS_PER_DAY;
        assert_eq!(w.start_of(start + 5), start);
        assert!(w.same_window(start + 5, start + MSECS_PER_DAY));
        assert!(!w.same_window(start + 5, start + MSECS_PER_DAY + 1));
    }

    #[test]
    fn test_same_window_near_max_timestamp() {
        let w = Window::tumbling(WindowLength::Week);
        assert!(w.same_window(i64::MAX - 1_000, i64::MAX - 990));
        assert!(w.same_window(i64::MAX, i64::MAX));
    }

    #[test]
    fn test_kernels() {
        let ev = Event::new(1, 0).call(30, 2.5);
        let mut rec = RecordBuf::zeroed(16);

        let max = entry(Metric::Dur, AggrFun::Max, FilterType::No);
        max.init_default(&mut rec);
        assert_eq!(rec.view().get_u32(8), 0);
        let prev = rec.clone();
        max.update(&prev.view(), &mut rec, &ev);
        assert_eq!(rec.view().get_u32(8), 30);

        let min = entry(Metric::Cost, AggrFun::Min, FilterType::No);
        min.init_default(&mut rec);
        assert_eq!(rec.view().get_f64(8), f64::MAX);
        min.init(&mut rec, &ev);
        let prev = rec.clone();
        min.update(&prev.view(), &mut rec, &Event::new(1, 0).call(1, 0.5));
        assert_eq!(rec.view().get_f64(8), 0.5);

        let calls = entry(Metric::Call, AggrFun::Sum, FilterType::No);
        calls.init(&mut rec, &ev);
        let prev = rec.clone();
        calls.update(&prev.view(), &mut rec, &ev);
        calls.maintain(&prev.view(), &mut rec);
        assert_eq!(rec.view().get_u32(8), 1);
    }

    #[test]
    fn test_name() {
        let e = entry(Metric::Call, AggrFun::Sum, FilterType::Local);
        assert_eq!(e.name(), "calls_sum_local_day");
    }
}
