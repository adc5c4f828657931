//! Core enums describing analytics attributes
//!
//! An attribute of the analytics matrix is identified by the metric it
//! aggregates, the aggregation function, the event filter and the window.

use serde::{Deserialize, Serialize};

pub const MSECS_PER_DAY: i64 = 86_400_000;
pub const MSECS_PER_WEEK: i64 = 7 * MSECS_PER_DAY;

/// Monday 1970-01-05 00:00 UTC, the anchor of every weekly window
pub const FIRST_MONDAY: i64 = 4 * MSECS_PER_DAY;

/// Byte size of the `last_updated` timestamp that starts every record
pub const TIMESTAMP_SIZE: usize = std::mem::size_of::<i64>();

/// The measured quantity of a call event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Call,
    Dur,
    Cost,
}

impl Metric {
    pub fn all() -> &'static [Metric] {
        &[Metric::Call, Metric::Dur, Metric::Cost]
    }

    /// Storage type of every attribute over this metric
    pub fn data_type(self) -> DataType {
        match self {
            Metric::Call | Metric::Dur => DataType::UInt,
            Metric::Cost => DataType::Double,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::Call => "calls",
            Metric::Dur => "dur",
            Metric::Cost => "cost",
        }
    }
}

/// Aggregation function applied over a window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AggrFun {
    Min,
    Max,
    Sum,
}

impl AggrFun {
    pub fn name(self) -> &'static str {
        match self {
            AggrFun::Min => "min",
            AggrFun::Max => "max",
            AggrFun::Sum => "sum",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "min" => Some(AggrFun::Min),
            "max" => Some(AggrFun::Max),
            "sum" => Some(AggrFun::Sum),
            _ => None,
        }
    }
}

/// Which events contribute to an attribute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    No,
    Local,
    NonLocal,
}

impl FilterType {
    pub fn name(self) -> &'static str {
        match self {
            FilterType::No => "all",
            FilterType::Local => "local",
            FilterType::NonLocal => "nonlocal",
        }
    }

    /// Whether an event with the given distance flag passes the filter
    #[inline]
    pub fn accepts(self, long_distance: bool) -> bool {
        match self {
            FilterType::No => true,
            FilterType::Local => !long_distance,
            FilterType::NonLocal => long_distance,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Tumbling,
    Stepwise,
    Continuous,
}

impl WindowType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tumb" | "tumbling" => Some(WindowType::Tumbling),
            "step" | "stepwise" => Some(WindowType::Stepwise),
            "cont" | "continuous" => Some(WindowType::Continuous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WindowLength {
    Day,
    Week,
}

impl WindowLength {
    pub fn duration_ms(self) -> i64 {
        match self {
            WindowLength::Day => MSECS_PER_DAY,
            WindowLength::Week => MSECS_PER_WEEK,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WindowLength::Day => "day",
            WindowLength::Week => "week",
        }
    }

    /// Wire code used by query arguments (0 = day, 1 = week)
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(WindowLength::Day),
            1 => Some(WindowLength::Week),
            _ => None,
        }
    }
}

/// Fixed-width storage type of a column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 4-byte signed
    Int,
    /// 4-byte unsigned
    UInt,
    /// 8-byte unsigned
    ULong,
    /// 8-byte IEEE float
    Double,
}

impl DataType {
    pub fn size(self) -> usize {
        match self {
            DataType::Int | DataType::UInt => 4,
            DataType::ULong | DataType::Double => 8,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int" => Some(DataType::Int),
            "uint" => Some(DataType::UInt),
            "ulong" => Some(DataType::ULong),
            "double" => Some(DataType::Double),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::UInt => write!(f, "uint"),
            DataType::ULong => write!(f, "ulong"),
            DataType::Double => write!(f, "double"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts() {
        assert!(FilterType::No.accepts(true));
        assert!(FilterType::No.accepts(false));
        assert!(FilterType::Local.accepts(false));
        assert!(!FilterType::Local.accepts(true));
        assert!(FilterType::NonLocal.accepts(true));
        assert!(!FilterType::NonLocal.accepts(false));
    }

    #[test]
    fn test_first_monday_is_monday() {
        // 1970-01-01 was a Thursday
        assert_eq!((FIRST_MONDAY / MSECS_PER_DAY + 4) % 7, 1);
        assert_eq!(MSECS_PER_WEEK, 604_800_000);
    }

    #[test]
    fn test_metric_types() {
        assert_eq!(Metric::Call.data_type().size(), 4);
        assert_eq!(Metric::Cost.data_type(), DataType::Double);
        assert_eq!(DataType::parse("ulong"), Some(DataType::ULong));
        assert_eq!(WindowLength::from_code(1), Some(WindowLength::Week));
        assert_eq!(WindowLength::from_code(2), None);
    }
}
