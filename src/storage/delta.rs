//! Delta log and swap gate
//!
//! Writes land in a per-shard hash map (the "current" delta). Once per merge
//! cycle the shard owner swaps it out as the "old" delta and folds that into
//! the column store while writers continue on a fresh map.
//!
//! [`SwapGate`] guards the delta pair with two flags instead of a mutex:
//!
//! ```text
//! writer:   CAS(active: false -> true); if intent { active = false; spin; retry }
//! updater:  intent = true; spin until CAS(active: false -> true); swap;
//!           active = false; intent = false
//! ```
//!
//! The CAS on `active` gives mutual exclusion. The `intent` flag is checked by
//! a writer only after it holds `active`, so a pending swap always wins the
//! next handoff and a stream of writes cannot starve the updater.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Pending writes of one shard, keyed by subscriber id
#[derive(Debug, Default, Clone)]
pub struct DeltaLog {
    entries: HashMap<u64, Vec<u8>>,
}

impl DeltaLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Upsert; the newest write for a key wins
    pub fn insert(&mut self, key: u64, record: Vec<u8>) {
        self.entries.insert(key, record);
    }

    pub fn get(&self, key: u64) -> Option<&Vec<u8>> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.entries.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}

/// Two-flag spin gate around a value
pub struct SwapGate<T> {
    writer_is_active: AtomicBool,
    updater_intends_to_swap: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: `value` is only reachable through `GateGuard`, and a guard exists
// only while its owner holds `writer_is_active` (acquired by CAS), so at most
// one thread touches the value at a time.
unsafe impl<T: Send> Sync for SwapGate<T> {}

impl<T> SwapGate<T> {
    pub fn new(value: T) -> Self {
        Self {
            writer_is_active: AtomicBool::new(false),
            updater_intends_to_swap: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    fn try_acquire(&self) -> bool {
        self.writer_is_active
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Writer/reader side: wait until no swap is pending, then enter
    pub fn enter(&self) -> GateGuard<'_, T> {
        loop {
            if self.try_acquire() {
                if !self.updater_intends_to_swap.load(Ordering::SeqCst) {
                    return GateGuard { gate: self };
                }
                self.writer_is_active.store(false, Ordering::Release);
            }
            while self.updater_intends_to_swap.load(Ordering::Relaxed)
                || self.writer_is_active.load(Ordering::Relaxed)
            {
                std::hint::spin_loop();
            }
        }
    }

    /// Updater side: announce the swap, wait out the active writer, run `f`
    pub fn swap_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.updater_intends_to_swap.store(true, Ordering::SeqCst);
        while !self.try_acquire() {
            std::hint::spin_loop();
        }
        let mut guard = SwapGuard(GateGuard { gate: self });
        f(&mut *guard.0)
    }

    /// Whether a swap is currently announced
    pub fn swap_pending(&self) -> bool {
        self.updater_intends_to_swap.load(Ordering::SeqCst)
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// Exclusive access to the gated value; releases the gate on drop
pub struct GateGuard<'a, T> {
    gate: &'a SwapGate<T>,
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds `writer_is_active`
        unsafe { &*self.gate.value.get() }
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds `writer_is_active`
        unsafe { &mut *self.gate.value.get() }
    }
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        self.gate.writer_is_active.store(false, Ordering::Release);
    }
}

/// Guard of an updater; clears the intent flag, then releases the gate
struct SwapGuard<'a, T>(GateGuard<'a, T>);

impl<T> Drop for SwapGuard<'_, T> {
    fn drop(&mut self) {
        // the inner guard releases `writer_is_active` right after this
        self.0.gate.updater_intends_to_swap.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_delta_upsert() {
        let mut delta = DeltaLog::with_capacity(4);
        assert!(delta.is_empty());
        delta.insert(1, vec![1]);
        delta.insert(1, vec![2]);
        delta.insert(2, vec![3]);
        assert_eq!(delta.len(), 2);
        assert_eq!(delta.get(1), Some(&vec![2]));
        assert!(delta.get(3).is_none());
    }

    #[test]
    fn test_swap_moves_value() {
        let gate = SwapGate::new(vec![1, 2, 3]);
        gate.enter().push(4);
        let taken = gate.swap_with(std::mem::take);
        assert_eq!(taken, vec![1, 2, 3, 4]);
        assert!(gate.enter().is_empty());
        assert!(!gate.swap_pending());
    }

    #[test]
    fn test_concurrent_writers_and_swaps() {
        let gate = Arc::new(SwapGate::new(Vec::<u64>::new()));
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    for i in 0..10_000u64 {
                        gate.enter().push(t * 10_000 + i);
                    }
                })
            })
            .collect();

        let mut collected = Vec::new();
        while writers.iter().any(|w| !w.is_finished()) {
            collected.extend(gate.swap_with(std::mem::take));
        }
        for w in writers {
            w.join().unwrap();
        }
        collected.extend(gate.swap_with(std::mem::take));

        collected.sort_unstable();
        collected.dedup();
        assert_eq!(collected.len(), 40_000);
    }
}
