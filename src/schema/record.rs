//! Typed access to serialized records
//!
//! Records are plain little-endian byte rows. Offsets come from the schema,
//! which checks at build time that every attribute fits inside the record,
//! so field access here is a bounds-checked slice read with no casting.

use super::types::DataType;

/// A decoded attribute value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    UInt(u32),
    ULong(u64),
    Double(f64),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::UInt(v) => v as f64,
            Value::ULong(v) => v as f64,
            Value::Double(v) => v,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::ULong(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{:.4}", v),
        }
    }
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        #[inline]
        pub fn $name(&self, offset: usize) -> $ty {
            const N: usize = std::mem::size_of::<$ty>();
            let mut buf = [0u8; N];
            buf.copy_from_slice(&self.bytes[offset..offset + N]);
            <$ty>::from_le_bytes(buf)
        }
    };
}

macro_rules! write_le {
    ($name:ident, $ty:ty) => {
        #[inline]
        pub fn $name(&mut self, offset: usize, value: $ty) {
            const N: usize = std::mem::size_of::<$ty>();
            self.bytes[offset..offset + N].copy_from_slice(&value.to_le_bytes());
        }
    };
}

/// Read-only view of a record
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    bytes: &'a [u8],
}

impl<'a> RecordView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The `last_updated` timestamp at byte 0
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.get_i64(0)
    }

    read_le!(get_u16, u16);
    read_le!(get_i32, i32);
    read_le!(get_u32, u32);
    read_le!(get_i64, i64);
    read_le!(get_u64, u64);
    read_le!(get_f64, f64);

    pub fn get(&self, offset: usize, data_type: DataType) -> Value {
        match data_type {
            DataType::Int => Value::Int(self.get_i32(offset)),
            DataType::UInt => Value::UInt(self.get_u32(offset)),
            DataType::ULong => Value::ULong(self.get_u64(offset)),
            DataType::Double => Value::Double(self.get_f64(offset)),
        }
    }
}

/// Owned, writable record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBuf {
    bytes: Vec<u8>,
}

impl RecordBuf {
    /// Zeroed record of the given size
    pub fn zeroed(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn view(&self) -> RecordView<'_> {
        RecordView::new(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[inline]
    pub fn set_timestamp(&mut self, ts: i64) {
        self.set_i64(0, ts);
    }

    write_le!(set_u16, u16);
    write_le!(set_i32, i32);
    write_le!(set_u32, u32);
    write_le!(set_i64, i64);
    write_le!(set_u64, u64);
    write_le!(set_f64, f64);

    pub fn set(&mut self, offset: usize, value: Value) {
        match value {
            Value::Int(v) => self.set_i32(offset, v),
            Value::UInt(v) => self.set_u32(offset, v),
            Value::ULong(v) => self.set_u64(offset, v),
            Value::Double(v) => self.set_f64(offset, v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_fields() {
        let mut rec = RecordBuf::zeroed(28);
        rec.set_timestamp(1_325_376_000_000);
        rec.set_u32(8, 7);
        rec.set_f64(12, 2.5);
        rec.set_u64(20, u64::MAX);

        let view = rec.view();
        assert_eq!(view.timestamp(), 1_325_376_000_000);
        assert_eq!(view.get_u32(8), 7);
        assert_eq!(view.get(12, DataType::Double), Value::Double(2.5));
        assert_eq!(view.get_u64(20), u64::MAX);
        assert_eq!(view.len(), 28);
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_read_panics() {
        let rec = RecordBuf::zeroed(8);
        rec.view().get_u32(6);
    }
}
