//! Interval index over one entry attribute
//!
//! Maps value ranges of a single attribute to groups of conjuncts. A group
//! holds every conjunct that contains one particular entry predicate; the
//! predicate itself is answered by the range and left out of the group.

use super::rtree::{OneDimRTree, RangeKey};
use crate::schema::RecordView;

/// Type-erased lookup used by the campaign index
pub trait EntryIndex: Send + Sync + std::fmt::Debug {
    /// Byte offset of the indexed attribute
    fn offset(&self) -> usize;

    /// Number of indexed ranges
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push the group of every range containing the record's value
    fn candidates(&self, record: &RecordView<'_>, out: &mut Vec<usize>);
}

/// Interval tree over attribute values of type `K`
#[derive(Debug, Clone)]
pub struct EntryAttrIndex<K> {
    offset: usize,
    tree: OneDimRTree<K, usize>,
}

impl<K: RangeKey> EntryAttrIndex<K> {
    /// `ranges` pairs inclusive `[low, high]` bounds with a group number
    pub fn new(offset: usize, ranges: Vec<(K, K, usize)>) -> Self {
        Self {
            offset,
            tree: OneDimRTree::build(ranges),
        }
    }

    pub fn groups_for(&self, key: K) -> Vec<usize> {
        self.tree.find(key).into_iter().copied().collect()
    }
}

impl<K: RangeKey> EntryIndex for EntryAttrIndex<K> {
    fn offset(&self) -> usize {
        self.offset
    }

    fn len(&self) -> usize {
        self.tree.len()
    }

    #[inline]
    fn candidates(&self, record: &RecordView<'_>, out: &mut Vec<usize>) {
        let key = K::read(record, self.offset);
        self.tree.visit(key, |group| out.push(*group));
    }
}
