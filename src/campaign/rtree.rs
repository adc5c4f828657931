//! Packed one-dimensional R-tree
//!
//! A static interval index answering stabbing queries: which ranges contain
//! a key. The tree is bulk-loaded once:
//!
//! ```text
//! 1. sort (range, element) pairs by range midpoint
//! 2. fill leaves of LEAF_FAN_OUT entries left to right
//! 3. bound each leaf, group IM_FAN_OUT bounds into a parent, repeat until
//!    one node (the root) is left
//! ```
//!
//! Nodes are flat arrays of bounds with no child pointers; the children of
//! node `i` on level `l` are nodes `i * IM_FAN_OUT ..` on level `l - 1`.
//! Sibling ranges may overlap, so a lookup tests every child of a visited
//! node. Unused slots hold the inverted range `[MAX, MIN]`, which contains
//! nothing.

use crate::schema::{RecordView, Value};

/// Children per intermediate node
pub const IM_FAN_OUT: usize = 4;

/// Entries per leaf
pub const LEAF_FAN_OUT: usize = 8;

/// Key type of an interval index
pub trait RangeKey: Copy + PartialOrd + std::fmt::Debug + Send + Sync + 'static {
    const MIN: Self;
    const MAX: Self;

    /// Position used to order ranges by midpoint
    fn sort_key(self) -> f64;

    /// Largest key strictly below `self`
    fn pred(self) -> Option<Self>;

    /// Smallest key strictly above `self`
    fn succ(self) -> Option<Self>;

    /// Read a key from a record
    fn read(record: &RecordView<'_>, offset: usize) -> Self;

    /// The key held by a typed constant, if the types agree
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! int_key {
    ($ty:ty, $get:ident, $variant:ident) => {
        impl RangeKey for $ty {
            const MIN: Self = <$ty>::MIN;
            const MAX: Self = <$ty>::MAX;

            fn sort_key(self) -> f64 {
                self as f64
            }

            fn pred(self) -> Option<Self> {
                self.checked_sub(1)
            }

            fn succ(self) -> Option<Self> {
                self.checked_add(1)
            }

            #[inline]
            fn read(record: &RecordView<'_>, offset: usize) -> Self {
                record.$get(offset)
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

int_key!(i32, get_i32, Int);
int_key!(u32, get_u32, UInt);
int_key!(u64, get_u64, ULong);

impl RangeKey for f64 {
    const MIN: Self = f64::NEG_INFINITY;
    const MAX: Self = f64::INFINITY;

    fn sort_key(self) -> f64 {
        self.clamp(f64::MIN, f64::MAX)
    }

    fn pred(self) -> Option<Self> {
        if self.is_nan() || self == f64::NEG_INFINITY {
            return None;
        }
        if self == 0.0 {
            return Some(-f64::from_bits(1));
        }
        let bits = self.to_bits();
        Some(f64::from_bits(if self > 0.0 { bits - 1 } else { bits + 1 }))
    }

    fn succ(self) -> Option<Self> {
        if self.is_nan() || self == f64::INFINITY {
            return None;
        }
        if self == 0.0 {
            return Some(f64::from_bits(1));
        }
        let bits = self.to_bits();
        Some(f64::from_bits(if self > 0.0 { bits + 1 } else { bits - 1 }))
    }

    #[inline]
    fn read(record: &RecordView<'_>, offset: usize) -> Self {
        record.get_f64(offset)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(v),
            _ => None,
        }
    }
}

#[inline]
fn contains<K: RangeKey>(bound: &(K, K), key: K) -> bool {
    bound.0 <= key && key <= bound.1
}

fn union<'a, K: RangeKey>(bounds: impl Iterator<Item = &'a (K, K)>) -> (K, K) {
    bounds.fold((K::MAX, K::MIN), |(lo, hi), b| {
        (if b.0 < lo { b.0 } else { lo }, if b.1 > hi { b.1 } else { hi })
    })
}

fn pad<K: RangeKey>(bounds: &mut Vec<(K, K)>, multiple: usize) {
    let len = bounds.len().div_ceil(multiple) * multiple;
    bounds.resize(len, (K::MAX, K::MIN));
}

/// Static packed interval tree
#[derive(Debug, Clone)]
pub struct OneDimRTree<K, T> {
    /// Entry bounds, padded to whole leaves
    bounds: Vec<(K, K)>,
    elements: Vec<T>,
    /// `levels[0]` bounds the leaves, the last level is the root node
    levels: Vec<Vec<(K, K)>>,
}

impl<K: RangeKey, T> OneDimRTree<K, T> {
    /// Bulk-load from `(low, high, element)` triples; bounds are inclusive
    pub fn build(mut items: Vec<(K, K, T)>) -> Self {
        items.sort_by(|a, b| {
            let ma = a.0.sort_key() * 0.5 + a.1.sort_key() * 0.5;
            let mb = b.0.sort_key() * 0.5 + b.1.sort_key() * 0.5;
            ma.total_cmp(&mb)
        });

        let mut bounds = Vec::with_capacity(items.len());
        let mut elements = Vec::with_capacity(items.len());
        for (lo, hi, element) in items {
            bounds.push((lo, hi));
            elements.push(element);
        }
        if elements.is_empty() {
            return Self {
                bounds,
                elements,
                levels: Vec::new(),
            };
        }
        pad(&mut bounds, LEAF_FAN_OUT);

        let mut level: Vec<(K, K)> = bounds.chunks(LEAF_FAN_OUT).map(|c| union(c.iter())).collect();
        pad(&mut level, IM_FAN_OUT);
        let mut levels = vec![level];
        while let Some(top) = levels.last().filter(|l| l.len() > IM_FAN_OUT) {
            let mut parent: Vec<(K, K)> = top.chunks(IM_FAN_OUT).map(|c| union(c.iter())).collect();
            pad(&mut parent, IM_FAN_OUT);
            levels.push(parent);
        }

        Self {
            bounds,
            elements,
            levels,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of intermediate levels
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Call `f` for every element whose range contains `key`
    pub fn visit<'a>(&'a self, key: K, mut f: impl FnMut(&'a T)) {
        let Some(root) = self.levels.last() else {
            return;
        };
        let top = self.levels.len() - 1;
        for (child, bound) in root.iter().enumerate() {
            if contains(bound, key) {
                self.descend(top, child, key, &mut f);
            }
        }
    }

    fn descend<'a>(&'a self, level: usize, node: usize, key: K, f: &mut impl FnMut(&'a T)) {
        if level == 0 {
            let start = node * LEAF_FAN_OUT;
            for (i, bound) in self.bounds[start..start + LEAF_FAN_OUT].iter().enumerate() {
                if contains(bound, key) {
                    f(&self.elements[start + i]);
                }
            }
            return;
        }
        let below = &self.levels[level - 1];
        let start = node * IM_FAN_OUT;
        for child in start..start + IM_FAN_OUT {
            if contains(&below[child], key) {
                self.descend(level - 1, child, key, f);
            }
        }
    }

    /// Every element whose range contains `key`
    pub fn find(&self, key: K) -> Vec<&T> {
        let mut found = Vec::new();
        self.visit(key, |e| found.push(e));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sorted(mut v: Vec<usize>) -> Vec<usize> {
        v.sort_unstable();
        v
    }

    #[test]
    fn test_empty_tree_matches_nothing() {
        let tree: OneDimRTree<u32, usize> = OneDimRTree::build(Vec::new());
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert!(tree.find(0).is_empty());
        assert!(tree.find(u32::MAX).is_empty());
    }

    #[test]
    fn test_single_leaf() {
        let tree = OneDimRTree::build(vec![(5u32, 10u32, 0usize), (10, 20, 1), (30, 30, 2)]);
        assert_eq!(tree.depth(), 1);
        assert_eq!(sorted(tree.find(10).into_iter().copied().collect()), vec![0, 1]);
        assert_eq!(tree.find(4), Vec::<&usize>::new());
        assert_eq!(tree.find(30), vec![&2]);
        assert!(tree.find(31).is_empty());
    }

    #[test]
    fn test_full_domain_ranges() {
        let tree = OneDimRTree::build(vec![
            (u32::MIN, 7u32, "lte7"),
            (8, u32::MAX, "gr7"),
        ]);
        assert_eq!(tree.find(0), vec![&"lte7"]);
        assert_eq!(tree.find(7), vec![&"lte7"]);
        assert_eq!(tree.find(8), vec![&"gr7"]);
        assert_eq!(tree.find(u32::MAX), vec![&"gr7"]);
    }

    #[test]
    fn test_random_ranges_match_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in [1usize, 7, 8, 9, 33, 100, 517] {
            let ranges: Vec<(u32, u32)> = (0..n)
                .map(|_| {
                    let a = rng.gen_range(0..1000u32);
                    let b = rng.gen_range(0..1000u32);
                    (a.min(b), a.max(b))
                })
                .collect();
            let tree = OneDimRTree::build(
                ranges.iter().enumerate().map(|(i, r)| (r.0, r.1, i)).collect(),
            );
            assert_eq!(tree.len(), n);

            let mut keys: Vec<u32> = ranges.iter().flat_map(|r| [r.0, r.1]).collect();
            keys.extend((0..200).map(|_| rng.gen_range(0..1100u32)));
            for key in keys {
                let expected: Vec<usize> = ranges
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.0 <= key && key <= r.1)
                    .map(|(i, _)| i)
                    .collect();
                let found = sorted(tree.find(key).into_iter().copied().collect());
                assert_eq!(found, expected, "n = {}, key = {}", n, key);
            }
        }
    }

    #[test]
    fn test_double_keys() {
        let tree = OneDimRTree::build(vec![
            (f64::MIN, 2.5f64.pred().unwrap(), 0usize),
            (2.5, 2.5, 1),
            (2.5f64.succ().unwrap(), f64::MAX, 2),
        ]);
        assert_eq!(tree.find(2.4999), vec![&0]);
        assert_eq!(tree.find(2.5), vec![&1]);
        assert_eq!(tree.find(2.5000001), vec![&2]);
    }

    #[test]
    fn test_key_steps() {
        assert_eq!(0u32.pred(), None);
        assert_eq!(u32::MAX.succ(), None);
        assert_eq!(5i32.pred(), Some(4));
        assert!(1.0f64.pred().unwrap() < 1.0);
        assert!(0.0f64.succ().unwrap() > 0.0);
        assert!((-1.0f64).succ().unwrap() > -1.0);
        assert_eq!(f64::INFINITY.succ(), None);
    }
}
