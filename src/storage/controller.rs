//! Sharded Controller
//!
//! Owns one column store and one delta pair per shard and drives the
//! update/scan cycle of the shard worker threads.
//!
//! # Cycle (per shard worker)
//!
//! ```text
//! loop:
//!   every merge_interval cycles: swap current delta -> old, merge old into store
//!   shard 0 only, when no scan is running: activate queued queries
//!   no active queries: yield, continue
//!   scan all buckets for the active queries, end() each query
//!   last shard to finish: scan_generation += 1
//!   wait until scan_generation moves
//! ```
//!
//! Reads look at the current delta, then the old delta, then the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use super::bucket::{ColumnBucketStore, StoreLayout};
use super::delta::{DeltaLog, SwapGate};
use super::error::{StorageError, StorageResult};
use crate::query::{QueryServerObject, RtaCommunication};

/// Fixed engine parameters
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub shards: usize,
    pub records_per_bucket: usize,
    /// Merge every N scan cycles
    pub merge_interval: u32,
    pub delta_alloc_hint: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            shards: 1,
            records_per_bucket: 3 * 1024,
            merge_interval: 1,
            delta_alloc_hint: 16,
        }
    }
}

impl From<&crate::config::EngineConfig> for ControllerConfig {
    fn from(cfg: &crate::config::EngineConfig) -> Self {
        Self {
            shards: cfg.shards.max(1),
            records_per_bucket: cfg.records_per_bucket,
            merge_interval: cfg.merge_interval.max(1),
            delta_alloc_hint: cfg.effective_delta_hint(),
        }
    }
}

struct DeltaPair {
    current: DeltaLog,
    old: Arc<DeltaLog>,
}

struct Shard {
    deltas: SwapGate<DeltaPair>,
    /// Writes since the last swap
    pending: AtomicUsize,
    store: RwLock<ColumnBucketStore>,
}

/// Sharded store with delta merging and lock-step scans
pub struct ShardedController {
    config: ControllerConfig,
    layout: Arc<StoreLayout>,
    shards: Vec<Shard>,
    communication: Arc<RtaCommunication>,
    active_queries: RwLock<Vec<Arc<dyn QueryServerObject>>>,
    running_scans: AtomicUsize,
    scan_generation: AtomicU64,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ShardedController {
    pub fn new(
        config: ControllerConfig,
        layout: Arc<StoreLayout>,
        communication: Arc<RtaCommunication>,
    ) -> StorageResult<Self> {
        if config.shards == 0 {
            return Err(StorageError::Config("at least one shard is required".into()));
        }
        if config.records_per_bucket == 0 {
            return Err(StorageError::Config("records_per_bucket must be positive".into()));
        }
        if communication.context().threads != config.shards {
            return Err(StorageError::Config(format!(
                "queries expect {} scan threads, controller has {} shards",
                communication.context().threads,
                config.shards
            )));
        }

        let shards = (0..config.shards)
            .map(|_| Shard {
                deltas: SwapGate::new(DeltaPair {
                    current: DeltaLog::with_capacity(config.delta_alloc_hint),
                    old: Arc::new(DeltaLog::default()),
                }),
                pending: AtomicUsize::new(0),
                store: RwLock::new(ColumnBucketStore::new(
                    (*layout).clone(),
                    config.records_per_bucket,
                )),
            })
            .collect();

        Ok(Self {
            config,
            layout,
            shards,
            communication,
            active_queries: RwLock::new(Vec::new()),
            running_scans: AtomicUsize::new(0),
            scan_generation: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn communication(&self) -> &Arc<RtaCommunication> {
        &self.communication
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn shard_of(&self, key: u64) -> usize {
        (key % self.shards.len() as u64) as usize
    }

    /// Newest analytics bytes of `key`
    pub fn read(&self, key: u64) -> Option<Vec<u8>> {
        let shard = &self.shards[self.shard_of(key)];
        {
            let deltas = shard.deltas.enter();
            if let Some(rec) = deltas.current.get(key).or_else(|| deltas.old.get(key)) {
                return Some(rec.clone());
            }
        }
        shard.store.read().read_am(key)
    }

    /// Analytics bytes followed by the stored dimension bytes
    pub fn read_full_record(&self, key: u64) -> Option<Vec<u8>> {
        let shard = &self.shards[self.shard_of(key)];
        let delta = {
            let deltas = shard.deltas.enter();
            deltas
                .current
                .get(key)
                .or_else(|| deltas.old.get(key))
                .cloned()
        };
        let store = shard.store.read();
        let mut record = match delta {
            Some(am) => am,
            None => store.read_am(key)?,
        };
        match store.read_dim(key) {
            Some(dim) => record.extend_from_slice(&dim),
            None => record.extend_from_slice(&self.unknown_dimensions(key)),
        }
        Some(record)
    }

    /// Dimension block of a subscriber that was never populated: zeroed,
    /// ending in its id
    fn unknown_dimensions(&self, key: u64) -> Vec<u8> {
        let dim_size = self.layout.dim_size();
        let mut dim = vec![0u8; dim_size];
        if dim_size >= 8 {
            dim[dim_size - 8..].copy_from_slice(&key.to_le_bytes());
        }
        dim
    }

    /// Upsert into the current delta of the key's shard
    pub fn write(&self, key: u64, record: Vec<u8>) -> StorageResult<()> {
        if record.len() != self.layout.am_size() {
            return Err(StorageError::RecordSize {
                expected: self.layout.am_size(),
                actual: record.len(),
            });
        }
        let shard = &self.shards[self.shard_of(key)];
        let mut deltas = shard.deltas.enter();
        deltas.current.insert(key, record);
        shard.pending.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Write straight into the store; initial load only
    pub fn populate(&self, key: u64, am: &[u8], dim: &[u8]) -> StorageResult<()> {
        let shard = &self.shards[self.shard_of(key)];
        shard.store.write().insert(key, am, dim)
    }

    /// Swap the current delta of `shard` out and merge it into the store
    pub fn apply_updates(&self, shard: usize) -> StorageResult<usize> {
        let s = self.shards.get(shard).ok_or(StorageError::UnknownShard(shard))?;
        if s.pending.load(Ordering::Acquire) == 0 {
            return Ok(0);
        }

        let hint = self.config.delta_alloc_hint;
        let old = s.deltas.swap_with(|pair| {
            if pair.current.is_empty() {
                return None;
            }
            let current = std::mem::replace(&mut pair.current, DeltaLog::with_capacity(hint));
            pair.old = Arc::new(current);
            s.pending.store(0, Ordering::Release);
            Some(Arc::clone(&pair.old))
        });
        let Some(old) = old else {
            return Ok(0);
        };

        let mut store = s.store.write();
        for (key, record) in old.iter() {
            if !store.update_am(key, record)? {
                store.insert(key, record, &self.unknown_dimensions(key))?;
            }
        }
        tracing::debug!(shard, merged = old.len(), "Merged delta");
        Ok(old.len())
    }

    /// Activate queued queries; shard 0 only, between scan generations
    pub fn fetch_queued_queries(&self, shard: usize) -> usize {
        if shard != 0 || self.running_scans.load(Ordering::SeqCst) != 0 {
            return 0;
        }
        let queries = self.communication.get_queued_queries();
        let n = queries.len();
        *self.active_queries.write() = queries;
        if n > 0 {
            tracing::debug!(
                generation = self.scan_generation.load(Ordering::SeqCst),
                queries = n,
                "Activated queries"
            );
            self.running_scans.store(self.shards.len(), Ordering::SeqCst);
        }
        n
    }

    /// Feed every bucket of `shard` to the active queries and end them
    pub fn scan(&self, shard: usize) -> StorageResult<()> {
        let s = self.shards.get(shard).ok_or(StorageError::UnknownShard(shard))?;
        let queries = self.active_queries.read().clone();
        {
            let store = s.store.read();
            if let Some((last, full)) = store.buckets().split_last() {
                for bucket in full {
                    for q in &queries {
                        q.process_bucket(shard, bucket);
                    }
                }
                for q in &queries {
                    q.process_last_bucket(shard, last);
                }
            }
        }
        for q in &queries {
            if q.end() {
                self.communication.notify_for_results(Arc::clone(q));
            }
        }
        Ok(())
    }

    /// Mark the scan of one shard finished; the last one advances the generation
    fn finish_scan(&self) {
        if self.running_scans.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.scan_generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// One full cycle on the calling thread: merge, activate, scan every shard
    ///
    /// Must not be mixed with started workers.
    pub fn run_cycle(&self) -> StorageResult<usize> {
        for shard in 0..self.shards.len() {
            self.apply_updates(shard)?;
        }
        let n = self.fetch_queued_queries(0);
        if n == 0 {
            return Ok(0);
        }
        for shard in 0..self.shards.len() {
            self.scan(shard)?;
            self.finish_scan();
        }
        Ok(n)
    }

    /// Spawn one worker thread per shard
    pub fn start(self: &Arc<Self>) -> StorageResult<()> {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return Ok(());
        }
        for shard in 0..self.shards.len() {
            let ctrl = Arc::clone(self);
            let handle = std::thread::Builder::new()
                .name(format!("aim-shard-{}", shard))
                .spawn(move || ctrl.worker_loop(shard))?;
            workers.push(handle);
        }
        tracing::info!("Started {} shard workers", workers.len());
        Ok(())
    }

    fn worker_loop(&self, shard: usize) {
        tracing::debug!(shard, "Shard worker running");
        let merge_interval = u64::from(self.config.merge_interval.max(1));
        let mut cycle: u64 = 0;

        while !self.shutdown.load(Ordering::SeqCst) {
            if cycle % merge_interval == 0 {
                if let Err(e) = self.apply_updates(shard) {
                    tracing::error!(shard, "Merge failed: {}", e);
                }
            }
            cycle = cycle.wrapping_add(1);

            self.fetch_queued_queries(shard);
            if self.running_scans.load(Ordering::SeqCst) == 0 {
                std::thread::yield_now();
                continue;
            }

            let generation = self.scan_generation.load(Ordering::SeqCst);
            if let Err(e) = self.scan(shard) {
                tracing::error!(shard, "Scan failed: {}", e);
            }
            self.finish_scan();

            while self.scan_generation.load(Ordering::SeqCst) == generation
                && !self.shutdown.load(Ordering::SeqCst)
            {
                std::hint::spin_loop();
                std::thread::yield_now();
            }
        }
        tracing::debug!(shard, "Shard worker stopped");
    }

    /// Stop and join the workers
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        let n = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Shard worker panicked");
            }
        }
        if n > 0 {
            tracing::info!("Stopped {} shard workers", n);
        }
    }

    pub fn stats(&self) -> ControllerStats {
        let shards = self
            .shards
            .iter()
            .map(|s| {
                let store = s.store.read();
                ShardStats {
                    records: store.len(),
                    buckets: store.buckets().len(),
                    pending_writes: s.pending.load(Ordering::Acquire),
                }
            })
            .collect();
        ControllerStats {
            shards,
            scan_generation: self.scan_generation.load(Ordering::SeqCst),
            active_queries: self.active_queries.read().len(),
            queued_queries: self.communication.queued_len(),
        }
    }
}

/// Counters of one shard
#[derive(Debug, Clone, serde::Serialize)]
pub struct ShardStats {
    pub records: usize,
    pub buckets: usize,
    pub pending_writes: usize,
}

/// Controller statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct ControllerStats {
    pub shards: Vec<ShardStats>,
    pub scan_generation: u64,
    pub active_queries: usize,
    pub queued_queries: usize,
}

impl ControllerStats {
    pub fn total_records(&self) -> usize {
        self.shards.iter().map(|s| s.records).sum()
    }

    /// Records per shard
    pub fn distribution(&self) -> HashMap<usize, usize> {
        self.shards.iter().enumerate().map(|(i, s)| (i, s.records)).collect()
    }
}

impl std::fmt::Display for ControllerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Shards: {}, Records: {}, Buckets: {}, Pending: {}, Generation: {}, Active: {}, Queued: {}",
            self.shards.len(),
            self.total_records(),
            self.shards.iter().map(|s| s.buckets).sum::<usize>(),
            self.shards.iter().map(|s| s.pending_writes).sum::<usize>(),
            self.scan_generation,
            self.active_queries,
            self.queued_queries
        )
    }
}
