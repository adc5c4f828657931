//! Column Bucket Store
//!
//! Fixed-width columnar storage for one shard. Records live in fixed-capacity
//! buckets with one typed vector per column, so a scan walks contiguous
//! slices. Buckets only grow; a record keeps its slot for its lifetime.
//!
//! # Layout
//!
//! ```text
//! record bytes: | ts | attr 0 .. attr n-1 | dim 0 .. dim 11 | subscriber_id |
//!                 \_____ analytics _____/  \________ dimension ________/
//! bucket:       one Column per field, `capacity` slots each
//! ```

use std::collections::HashMap;

use super::error::{StorageError, StorageResult};
use crate::schema::{
    AnalyticsSchema, DataType, DimensionAttribute, DimensionSchema, TIMESTAMP_SIZE,
};

/// Element type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    U16,
    I32,
    U32,
    I64,
    U64,
    F64,
}

impl ColumnType {
    pub fn size(self) -> usize {
        match self {
            ColumnType::U16 => 2,
            ColumnType::I32 | ColumnType::U32 => 4,
            ColumnType::I64 | ColumnType::U64 | ColumnType::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::U16 => "u16",
            ColumnType::I32 => "i32",
            ColumnType::U32 => "u32",
            ColumnType::I64 => "i64",
            ColumnType::U64 => "u64",
            ColumnType::F64 => "f64",
        }
    }
}

impl From<DataType> for ColumnType {
    fn from(dt: DataType) -> Self {
        match dt {
            DataType::Int => ColumnType::I32,
            DataType::UInt => ColumnType::U32,
            DataType::ULong => ColumnType::U64,
            DataType::Double => ColumnType::F64,
        }
    }
}

/// Typed column storage
#[derive(Debug, Clone)]
pub enum Column {
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F64(Vec<f64>),
}

macro_rules! le_at {
    ($ty:ty, $bytes:expr) => {{
        let mut buf = [0u8; std::mem::size_of::<$ty>()];
        buf.copy_from_slice($bytes);
        <$ty>::from_le_bytes(buf)
    }};
}

impl Column {
    fn with_capacity(ty: ColumnType, capacity: usize) -> Self {
        match ty {
            ColumnType::U16 => Column::U16(vec![0; capacity]),
            ColumnType::I32 => Column::I32(vec![0; capacity]),
            ColumnType::U32 => Column::U32(vec![0; capacity]),
            ColumnType::I64 => Column::I64(vec![0; capacity]),
            ColumnType::U64 => Column::U64(vec![0; capacity]),
            ColumnType::F64 => Column::F64(vec![0.0; capacity]),
        }
    }

    fn column_type(&self) -> ColumnType {
        match self {
            Column::U16(_) => ColumnType::U16,
            Column::I32(_) => ColumnType::I32,
            Column::U32(_) => ColumnType::U32,
            Column::I64(_) => ColumnType::I64,
            Column::U64(_) => ColumnType::U64,
            Column::F64(_) => ColumnType::F64,
        }
    }

    /// Store the little-endian field `bytes` at `slot`
    fn put(&mut self, slot: usize, bytes: &[u8]) {
        match self {
            Column::U16(v) => v[slot] = le_at!(u16, bytes),
            Column::I32(v) => v[slot] = le_at!(i32, bytes),
            Column::U32(v) => v[slot] = le_at!(u32, bytes),
            Column::I64(v) => v[slot] = le_at!(i64, bytes),
            Column::U64(v) => v[slot] = le_at!(u64, bytes),
            Column::F64(v) => v[slot] = le_at!(f64, bytes),
        }
    }

    fn append_to(&self, slot: usize, out: &mut Vec<u8>) {
        match self {
            Column::U16(v) => out.extend_from_slice(&v[slot].to_le_bytes()),
            Column::I32(v) => out.extend_from_slice(&v[slot].to_le_bytes()),
            Column::U32(v) => out.extend_from_slice(&v[slot].to_le_bytes()),
            Column::I64(v) => out.extend_from_slice(&v[slot].to_le_bytes()),
            Column::U64(v) => out.extend_from_slice(&v[slot].to_le_bytes()),
            Column::F64(v) => out.extend_from_slice(&v[slot].to_le_bytes()),
        }
    }
}

/// Element types a column can be viewed as
pub trait ColumnValue: Copy + 'static {
    const TYPE: ColumnType;

    fn slice(column: &Column) -> Option<&[Self]>;
}

macro_rules! column_value {
    ($ty:ty, $variant:ident) => {
        impl ColumnValue for $ty {
            const TYPE: ColumnType = ColumnType::$variant;

            #[inline]
            fn slice(column: &Column) -> Option<&[Self]> {
                match column {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

column_value!(u16, U16);
column_value!(i32, I32);
column_value!(u32, U32);
column_value!(i64, I64);
column_value!(u64, U64);
column_value!(f64, F64);

/// Column layout shared by every bucket of a store
#[derive(Debug, Clone)]
pub struct StoreLayout {
    types: Vec<ColumnType>,
    offsets: Vec<usize>,
    am_columns: usize,
    am_size: usize,
    record_size: usize,
}

impl StoreLayout {
    /// Analytics columns (timestamp first) followed by dimension columns
    pub fn new(schema: &AnalyticsSchema, dims: &DimensionSchema) -> Self {
        let mut types = Vec::with_capacity(schema.len() + 14);
        types.push(ColumnType::I64);
        types.extend(schema.entries().iter().map(|e| ColumnType::from(e.data_type())));
        let am_columns = types.len();
        for size in dims.sizes() {
            types.push(if size == 2 { ColumnType::U16 } else { ColumnType::U64 });
        }
        Self::from_types(types, am_columns)
    }

    pub fn from_types(types: Vec<ColumnType>, am_columns: usize) -> Self {
        assert!(am_columns >= 1 && am_columns <= types.len());
        assert_eq!(types[0].size(), TIMESTAMP_SIZE);
        let mut offsets = Vec::with_capacity(types.len());
        let mut offset = 0;
        for ty in &types {
            offsets.push(offset);
            offset += ty.size();
        }
        let am_size = types[..am_columns].iter().map(|t| t.size()).sum();
        Self {
            types,
            offsets,
            am_columns,
            am_size,
            record_size: offset,
        }
    }

    pub fn num_columns(&self) -> usize {
        self.types.len()
    }

    /// Number of analytics columns, timestamp included
    pub fn am_columns(&self) -> usize {
        self.am_columns
    }

    pub fn am_size(&self) -> usize {
        self.am_size
    }

    pub fn dim_size(&self) -> usize {
        self.record_size - self.am_size
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn column_type(&self, column: usize) -> ColumnType {
        self.types[column]
    }

    /// Column holding schema attribute `index`
    pub fn attribute_column(index: usize) -> usize {
        index + 1
    }

    pub fn dimension_column(&self, attribute: DimensionAttribute) -> usize {
        self.am_columns + attribute as usize
    }

    pub fn subscriber_id_column(&self) -> usize {
        self.am_columns + DimensionAttribute::COUNT
    }
}

/// One fixed-capacity slab of records
#[derive(Debug, Clone)]
pub struct Bucket {
    columns: Vec<Column>,
    len: usize,
    capacity: usize,
}

impl Bucket {
    fn new(layout: &StoreLayout, capacity: usize) -> Self {
        Self {
            columns: layout
                .types
                .iter()
                .map(|ty| Column::with_capacity(*ty, capacity))
                .collect(),
            len: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// The occupied part of a column
    pub fn column<T: ColumnValue>(&self, column: usize) -> StorageResult<&[T]> {
        let col = &self.columns[column];
        T::slice(col)
            .map(|s| &s[..self.len])
            .ok_or(StorageError::ColumnType {
                column,
                actual: col.column_type().name(),
                requested: T::TYPE.name(),
            })
    }

    fn put_range(&mut self, layout: &StoreLayout, slot: usize, columns: std::ops::Range<usize>, bytes: &[u8]) {
        if columns.is_empty() {
            return;
        }
        let base = layout.offsets[columns.start];
        for c in columns {
            let off = layout.offsets[c] - base;
            let size = layout.types[c].size();
            self.columns[c].put(slot, &bytes[off..off + size]);
        }
    }

    fn read_range(&self, layout: &StoreLayout, slot: usize, columns: std::ops::Range<usize>, out: &mut Vec<u8>) {
        for c in columns {
            self.columns[c].append_to(slot, out);
        }
        debug_assert!(out.len() <= layout.record_size);
    }
}

/// Bucketed column store of one shard, indexed by subscriber id
#[derive(Debug)]
pub struct ColumnBucketStore {
    layout: StoreLayout,
    capacity: usize,
    buckets: Vec<Bucket>,
    index: HashMap<u64, usize>,
}

impl ColumnBucketStore {
    pub fn new(layout: StoreLayout, records_per_bucket: usize) -> Self {
        assert!(records_per_bucket > 0, "records_per_bucket must be positive");
        Self {
            layout,
            capacity: records_per_bucket,
            buckets: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn records_per_bucket(&self) -> usize {
        self.capacity
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn contains(&self, key: u64) -> bool {
        self.index.contains_key(&key)
    }

    fn slot_of(&self, pos: usize) -> (usize, usize) {
        (pos / self.capacity, pos % self.capacity)
    }

    fn append(&mut self, key: u64) -> (usize, usize) {
        let pos = self.index.len();
        let (b, s) = self.slot_of(pos);
        if b == self.buckets.len() {
            self.buckets.push(Bucket::new(&self.layout, self.capacity));
        }
        self.buckets[b].len = s + 1;
        self.index.insert(key, pos);
        (b, s)
    }

    /// Insert or overwrite the full row (analytics and dimension part)
    pub fn insert(&mut self, key: u64, am: &[u8], dim: &[u8]) -> StorageResult<()> {
        self.check_size(self.layout.am_size, am.len())?;
        self.check_size(self.layout.dim_size(), dim.len())?;
        let (b, s) = match self.index.get(&key) {
            Some(pos) => self.slot_of(*pos),
            None => self.append(key),
        };
        let am_cols = self.layout.am_columns;
        let all = self.layout.num_columns();
        let bucket = &mut self.buckets[b];
        bucket.put_range(&self.layout, s, 0..am_cols, am);
        bucket.put_range(&self.layout, s, am_cols..all, dim);
        Ok(())
    }

    /// Overwrite the analytics part of an existing row
    ///
    /// Returns `false` when the key has no row yet.
    pub fn update_am(&mut self, key: u64, am: &[u8]) -> StorageResult<bool> {
        self.check_size(self.layout.am_size, am.len())?;
        let Some(pos) = self.index.get(&key).copied() else {
            return Ok(false);
        };
        let (b, s) = self.slot_of(pos);
        let am_cols = self.layout.am_columns;
        self.buckets[b].put_range(&self.layout, s, 0..am_cols, am);
        Ok(true)
    }

    /// Analytics bytes of a row
    pub fn read_am(&self, key: u64) -> Option<Vec<u8>> {
        let (b, s) = self.slot_of(*self.index.get(&key)?);
        let mut out = Vec::with_capacity(self.layout.am_size);
        self.buckets[b].read_range(&self.layout, s, 0..self.layout.am_columns, &mut out);
        Some(out)
    }

    /// Dimension bytes of a row
    pub fn read_dim(&self, key: u64) -> Option<Vec<u8>> {
        let (b, s) = self.slot_of(*self.index.get(&key)?);
        let mut out = Vec::with_capacity(self.layout.dim_size());
        self.buckets[b].read_range(
            &self.layout,
            s,
            self.layout.am_columns..self.layout.num_columns(),
            &mut out,
        );
        Some(out)
    }

    fn check_size(&self, expected: usize, actual: usize) -> StorageResult<()> {
        if expected != actual {
            return Err(StorageError::RecordSize { expected, actual });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_layout() -> StoreLayout {
        // ts, one u32 attribute, one f64 attribute | one u16 dim, subscriber id
        StoreLayout::from_types(
            vec![
                ColumnType::I64,
                ColumnType::U32,
                ColumnType::F64,
                ColumnType::U16,
                ColumnType::U64,
            ],
            3,
        )
    }

    fn am(ts: i64, calls: u32, cost: f64) -> Vec<u8> {
        let mut v = ts.to_le_bytes().to_vec();
        v.extend_from_slice(&calls.to_le_bytes());
        v.extend_from_slice(&cost.to_le_bytes());
        v
    }

    fn dim(city: u16, id: u64) -> Vec<u8> {
        let mut v = city.to_le_bytes().to_vec();
        v.extend_from_slice(&id.to_le_bytes());
        v
    }

    #[test]
    fn test_layout_sizes() {
        let layout = small_layout();
        assert_eq!(layout.am_size(), 20);
        assert_eq!(layout.dim_size(), 10);
        assert_eq!(layout.record_size(), 30);

        let full = StoreLayout::new(&AnalyticsSchema::standard(), &DimensionSchema::new());
        assert_eq!(full.am_columns(), 43);
        assert_eq!(full.num_columns(), 43 + 13);
        assert_eq!(full.am_size(), AnalyticsSchema::standard().total_size());
        assert_eq!(full.dimension_column(DimensionAttribute::City), 48);
        assert_eq!(full.subscriber_id_column(), 55);
        assert_eq!(full.column_type(55), ColumnType::U64);
    }

    #[test]
    fn test_insert_read_update() {
        let mut store = ColumnBucketStore::new(small_layout(), 2);
        for key in 0..5u64 {
            store
                .insert(key, &am(key as i64, key as u32, 0.5), &dim(1, key))
                .unwrap();
        }
        assert_eq!(store.len(), 5);
        assert_eq!(store.buckets().len(), 3);
        assert!(store.buckets()[0].is_full());
        assert_eq!(store.buckets()[2].len(), 1);

        assert_eq!(store.read_am(3), Some(am(3, 3, 0.5)));
        assert_eq!(store.read_dim(4), Some(dim(1, 4)));
        assert!(store.read_am(99).is_none());

        assert!(store.update_am(3, &am(10, 7, 1.5)).unwrap());
        assert_eq!(store.read_am(3), Some(am(10, 7, 1.5)));
        assert_eq!(store.read_dim(3), Some(dim(1, 3)));
        assert!(!store.update_am(42, &am(0, 0, 0.0)).unwrap());
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_typed_columns() {
        let mut store = ColumnBucketStore::new(small_layout(), 4);
        store.insert(1, &am(0, 5, 1.0), &dim(2, 1)).unwrap();
        store.insert(2, &am(0, 6, 2.0), &dim(3, 2)).unwrap();

        let bucket = &store.buckets()[0];
        assert_eq!(bucket.column::<u32>(1).unwrap(), &[5, 6]);
        assert_eq!(bucket.column::<f64>(2).unwrap(), &[1.0, 2.0]);
        assert_eq!(bucket.column::<u64>(4).unwrap(), &[1, 2]);
        assert!(matches!(
            bucket.column::<f64>(1),
            Err(StorageError::ColumnType { .. })
        ));
    }

    #[test]
    fn test_size_checked() {
        let mut store = ColumnBucketStore::new(small_layout(), 4);
        assert!(matches!(
            store.insert(1, &[0u8; 3], &dim(0, 1)),
            Err(StorageError::RecordSize { expected: 20, actual: 3 })
        ));
        assert!(store.is_empty());
    }
}
