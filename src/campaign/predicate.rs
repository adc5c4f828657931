//! Predicates and conjuncts over analytics records
//!
//! A predicate compares one attribute of a record (found by byte offset)
//! with a typed constant. A conjunct ANDs predicates for one campaign and
//! stops at the first false one.

use super::error::{CampaignError, CampaignResult};
use crate::schema::{DataType, RecordView, Value};

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Lte,
    Eq,
    Gre,
    Gr,
}

impl Operator {
    pub fn all() -> &'static [Operator] {
        &[Operator::Lt, Operator::Lte, Operator::Eq, Operator::Gre, Operator::Gr]
    }

    /// Name used in the metadata store
    pub fn name(self) -> &'static str {
        match self {
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Eq => "e",
            Operator::Gre => "gre",
            Operator::Gr => "gr",
        }
    }

    pub fn parse(s: &str) -> CampaignResult<Self> {
        match s {
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "e" | "eq" => Ok(Operator::Eq),
            "gre" => Ok(Operator::Gre),
            "gr" => Ok(Operator::Gr),
            other => Err(CampaignError::UnknownOperator(other.to_string())),
        }
    }

    #[inline]
    fn holds<T: PartialOrd>(self, value: T, constant: T) -> bool {
        match self {
            Operator::Lt => value < constant,
            Operator::Lte => value <= constant,
            Operator::Eq => value == constant,
            Operator::Gre => value >= constant,
            Operator::Gr => value > constant,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Eq => "==",
            Operator::Gre => ">=",
            Operator::Gr => ">",
        };
        f.write_str(symbol)
    }
}

/// Parse a constant stored as text
pub fn parse_constant(data_type: DataType, s: &str) -> CampaignResult<Value> {
    let invalid = || CampaignError::InvalidConstant {
        data_type,
        value: s.to_string(),
    };
    let s = s.trim();
    Ok(match data_type {
        DataType::Int => Value::Int(s.parse().map_err(|_| invalid())?),
        DataType::UInt => Value::UInt(s.parse().map_err(|_| invalid())?),
        DataType::ULong => Value::ULong(s.parse().map_err(|_| invalid())?),
        DataType::Double => Value::Double(s.parse().map_err(|_| invalid())?),
    })
}

/// Data type of a constant
pub fn value_type(value: Value) -> DataType {
    match value {
        Value::Int(_) => DataType::Int,
        Value::UInt(_) => DataType::UInt,
        Value::ULong(_) => DataType::ULong,
        Value::Double(_) => DataType::Double,
    }
}

/// `attribute op constant`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Predicate {
    offset: usize,
    op: Operator,
    constant: Value,
}

impl Predicate {
    pub fn new(offset: usize, op: Operator, constant: Value) -> Self {
        Self {
            offset,
            op,
            constant,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn constant(&self) -> Value {
        self.constant
    }

    pub fn data_type(&self) -> DataType {
        value_type(self.constant)
    }

    #[inline]
    pub fn evaluate(&self, record: &RecordView<'_>) -> bool {
        let off = self.offset;
        match self.constant {
            Value::Int(c) => self.op.holds(record.get_i32(off), c),
            Value::UInt(c) => self.op.holds(record.get_u32(off), c),
            Value::ULong(c) => self.op.holds(record.get_u64(off), c),
            Value::Double(c) => self.op.holds(record.get_f64(off), c),
        }
    }
}

/// AND of predicates belonging to one campaign
#[derive(Debug, Clone, PartialEq)]
pub struct Conjunct {
    campaign_id: u32,
    predicates: Vec<Predicate>,
}

impl Conjunct {
    pub fn new(campaign_id: u32, predicates: Vec<Predicate>) -> Self {
        Self {
            campaign_id,
            predicates,
        }
    }

    pub fn campaign_id(&self) -> u32 {
        self.campaign_id
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// True when every predicate holds; an empty conjunct is true
    #[inline]
    pub fn evaluate(&self, record: &RecordView<'_>) -> bool {
        self.predicates.iter().all(|p| p.evaluate(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RecordBuf;

    fn record() -> RecordBuf {
        let mut rec = RecordBuf::zeroed(32);
        rec.set_u32(8, 5);
        rec.set_f64(12, 2.5);
        rec.set_i32(20, -3);
        rec
    }

    #[test]
    fn test_operators_at_boundary() {
        let rec = record();
        let view = rec.view();
        let at = |op| Predicate::new(8, op, Value::UInt(5)).evaluate(&view);
        assert!(!at(Operator::Lt));
        assert!(at(Operator::Lte));
        assert!(at(Operator::Eq));
        assert!(at(Operator::Gre));
        assert!(!at(Operator::Gr));

        assert!(Predicate::new(12, Operator::Gr, Value::Double(2.4)).evaluate(&view));
        assert!(Predicate::new(20, Operator::Lt, Value::Int(0)).evaluate(&view));
    }

    #[test]
    fn test_conjunct_and() {
        let rec = record();
        let view = rec.view();
        let yes = Predicate::new(8, Operator::Gre, Value::UInt(5));
        let no = Predicate::new(12, Operator::Gr, Value::Double(3.0));
        assert!(Conjunct::new(1, vec![yes]).evaluate(&view));
        assert!(!Conjunct::new(1, vec![yes, no]).evaluate(&view));
        assert!(Conjunct::new(1, vec![]).evaluate(&view));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Operator::parse("gre").unwrap(), Operator::Gre);
        assert!(Operator::parse("like").is_err());
        assert_eq!(parse_constant(DataType::UInt, "42").unwrap(), Value::UInt(42));
        assert_eq!(parse_constant(DataType::Double, " 1.5").unwrap(), Value::Double(1.5));
        assert!(parse_constant(DataType::UInt, "-1").is_err());
    }
}
