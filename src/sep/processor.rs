//! Event processor
//!
//! Each event updates the caller's analytics record and then probes the
//! campaign index with the new record:
//!
//! ```text
//! read(caller) -> update_record / record_from_event -> write(caller) -> match_campaigns
//! ```
//!
//! Events are routed to `caller_id % queues`, so updates of one subscriber
//! are applied by a single thread in arrival order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::stats::LatencyStats;
use crate::campaign::CampaignIndex;
use crate::schema::{AnalyticsSchema, DimensionRecord, Event};
use crate::storage::{ShardedController, StorageError, StorageResult};

/// Progress is logged every this many populated subscribers
const POPULATE_LOG_EVERY: u64 = 128 * 1024;

/// Event processor settings
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Number of event queues, one worker thread each
    pub threads: usize,
    pub seed: u64,
    pub server_id: u64,
    pub server_num: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            seed: 42,
            server_id: 0,
            server_num: 1,
        }
    }
}

impl From<&crate::config::Config> for ProcessorConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            threads: config.sep.threads,
            seed: config.sep.seed,
            server_id: config.engine.server_id,
            server_num: config.engine.server_num,
        }
    }
}

/// Whether subscriber `id` is stored on server `server_id` of `server_num`
#[inline]
pub fn belongs_to_server(id: u64, server_id: u64, server_num: u64) -> bool {
    (id >> 8) % server_num.max(1) == server_id
}

/// Processing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProcessorStats {
    pub events_processed: u64,
    pub campaigns_matched: u64,
    pub queued_events: usize,
}

pub struct EventProcessor {
    config: ProcessorConfig,
    controller: Arc<ShardedController>,
    schema: Arc<AnalyticsSchema>,
    campaigns: Arc<CampaignIndex>,
    queues: Vec<Mutex<Vec<Event>>>,
    latency: LatencyStats,
    processed: AtomicU64,
    matched: AtomicU64,
    running: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventProcessor {
    pub fn new(
        config: ProcessorConfig,
        controller: Arc<ShardedController>,
        schema: Arc<AnalyticsSchema>,
        campaigns: Arc<CampaignIndex>,
    ) -> StorageResult<Self> {
        if config.threads == 0 {
            return Err(StorageError::Config("event processor needs at least one thread".into()));
        }
        if schema.total_size() != controller.layout().am_size() {
            return Err(StorageError::RecordSize {
                expected: controller.layout().am_size(),
                actual: schema.total_size(),
            });
        }
        let queues = (0..config.threads).map(|_| Mutex::new(Vec::new())).collect();
        Ok(Self {
            config,
            controller,
            schema,
            campaigns,
            queues,
            latency: LatencyStats::new(),
            processed: AtomicU64::new(0),
            matched: AtomicU64::new(0),
            running: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn controller(&self) -> &Arc<ShardedController> {
        &self.controller
    }

    pub fn schema(&self) -> &Arc<AnalyticsSchema> {
        &self.schema
    }

    pub fn campaigns(&self) -> &Arc<CampaignIndex> {
        &self.campaigns
    }

    pub fn latency(&self) -> &LatencyStats {
        &self.latency
    }

    pub fn num_queues(&self) -> usize {
        self.queues.len()
    }

    /// Load a default record and a random dimension record for every
    /// subscriber `1..=subscribers` stored on this server
    pub fn populate(&self, subscribers: u64, start_ts: i64) -> StorageResult<u64> {
        let next = AtomicU64::new(1);
        let populated = AtomicU64::new(0);
        let default_record = self.schema.default_record(start_ts);
        let started = Instant::now();
        let populators = self.queues.len();
        tracing::info!(subscribers, populators, "Populating analytics matrix");

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..populators)
                .map(|i| {
                    let next = &next;
                    let populated = &populated;
                    let default_record = &default_record;
                    scope.spawn(move || -> StorageResult<()> {
                        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
                        loop {
                            let id = next.fetch_add(1, Ordering::Relaxed);
                            if id > subscribers {
                                return Ok(());
                            }
                            if id % POPULATE_LOG_EVERY == 0 {
                                tracing::info!("Populate {}% done", id * 100 / subscribers);
                            }
                            if !belongs_to_server(id, self.config.server_id, self.config.server_num) {
                                continue;
                            }
                            let dim = DimensionRecord::random(id, &mut rng).to_bytes();
                            self.controller.populate(id, default_record, &dim)?;
                            populated.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                })
                .collect();
            handles.into_iter().try_for_each(|h| {
                h.join()
                    .map_err(|_| StorageError::Worker("populator panicked".into()))?
            })
        })?;

        let populated = populated.into_inner();
        tracing::info!(
            populated,
            server_id = self.config.server_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Population finished"
        );
        Ok(populated)
    }

    /// Read, rebuild and write the caller's record; returns the new record
    pub fn update_am(&self, event: &Event) -> StorageResult<Vec<u8>> {
        let key = event.caller_id;
        let record = match self.controller.read(key) {
            Some(prev) => self.schema.update_record(&prev, event),
            None => self.schema.record_from_event(event),
        };
        self.controller.write(key, record.clone())?;
        Ok(record)
    }

    /// Apply one event; returns the number of campaigns it matched
    pub fn process_event(&self, event: &Event) -> StorageResult<usize> {
        let started = Instant::now();
        let record = self.update_am(event)?;
        let matched = self.campaigns.match_campaigns(&record).count();
        self.latency.record(started.elapsed());
        self.matched.fetch_add(matched as u64, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Release);
        Ok(matched)
    }

    /// Route events to their caller's queue
    pub fn enqueue_updates(&self, events: &[Event]) {
        let n = self.queues.len() as u64;
        if n == 1 {
            self.queues[0].lock().extend_from_slice(events);
            return;
        }
        let mut routed: Vec<Vec<Event>> = vec![Vec::new(); self.queues.len()];
        for event in events {
            routed[(event.caller_id % n) as usize].push(*event);
        }
        for (queue, batch) in self.queues.iter().zip(routed) {
            if !batch.is_empty() {
                queue.lock().extend(batch);
            }
        }
    }

    /// Drain queue `thread`; returns the number of campaigns matched
    pub fn process_all_queued_events(&self, thread: usize) -> StorageResult<u64> {
        let queue = self
            .queues
            .get(thread)
            .ok_or_else(|| StorageError::Config(format!("no event queue {}", thread)))?;
        let mut matched = 0;
        loop {
            let batch = std::mem::take(&mut *queue.lock());
            if batch.is_empty() {
                return Ok(matched);
            }
            for event in &batch {
                matched += self.process_event(event)? as u64;
            }
        }
    }

    /// Spawn one worker per queue, draining until [`stop`](Self::stop)
    pub fn run(self: &Arc<Self>) -> StorageResult<()> {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);
        for thread in 0..self.queues.len() {
            let processor = Arc::clone(self);
            let handle = std::thread::Builder::new()
                .name(format!("aim-sep-{}", thread))
                .spawn(move || processor.worker_loop(thread))?;
            workers.push(handle);
        }
        tracing::info!("Started {} event processing threads", workers.len());
        Ok(())
    }

    fn worker_loop(&self, thread: usize) {
        loop {
            let running = self.running.load(Ordering::SeqCst);
            match self.process_all_queued_events(thread) {
                Ok(0) if !running => break,
                Ok(_) => {}
                Err(e) => tracing::error!(thread, "Event processing failed: {}", e),
            }
            if !running {
                break;
            }
            if self.queues[thread].lock().is_empty() {
                std::thread::sleep(Duration::from_micros(200));
            }
        }
        tracing::debug!(thread, "Event worker stopped");
    }

    /// Stop the workers after they drained their queues
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Event worker panicked");
            }
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            events_processed: self.processed.load(Ordering::Acquire),
            campaigns_matched: self.matched.load(Ordering::Relaxed),
            queued_events: self.queues.iter().map(|q| q.lock().len()).sum(),
        }
    }
}

impl Drop for EventProcessor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{Campaign, CampaignIndexBuilder, FiringPolicy, Operator, Predicate};
    use crate::query::{RtaCommunication, ScanContext};
    use crate::schema::{AggrFun, DimensionSchema, FilterType, Metric, RecordView, Value, WindowLength};
    use crate::storage::{ControllerConfig, StoreLayout};

    fn controller(shards: usize) -> (Arc<AnalyticsSchema>, Arc<ShardedController>) {
        let schema = Arc::new(AnalyticsSchema::standard());
        let layout = Arc::new(StoreLayout::new(&schema, &DimensionSchema::new()));
        let rta = Arc::new(RtaCommunication::new(ScanContext::new(
            Arc::clone(&schema),
            Arc::clone(&layout),
            shards,
        )));
        let config = ControllerConfig {
            shards,
            records_per_bucket: 16,
            ..ControllerConfig::default()
        };
        let ctrl = ShardedController::new(config, layout, rta).unwrap();
        (schema, Arc::new(ctrl))
    }

    fn calls_week(schema: &AnalyticsSchema) -> usize {
        schema
            .offset_of(Metric::Call, AggrFun::Sum, FilterType::No, WindowLength::Week)
            .unwrap()
    }

    /// Campaign 0 fires once a subscriber made at least 3 calls this week
    fn processor(threads: usize) -> EventProcessor {
        let (schema, ctrl) = controller(2);
        let offset = calls_week(&schema);
        let mut builder = CampaignIndexBuilder::new(&schema);
        builder.entry_attribute(offset).unwrap();
        builder
            .add_campaign(Campaign::new(0, 0, i64::MAX, FiringPolicy::Always))
            .unwrap();
        let p = builder
            .add_predicate(Predicate::new(offset, Operator::Gre, Value::UInt(3)))
            .unwrap();
        builder.add_conjunct(0, &[p]).unwrap();
        let config = ProcessorConfig {
            threads,
            ..ProcessorConfig::default()
        };
        EventProcessor::new(config, ctrl, schema, Arc::new(builder.build().unwrap())).unwrap()
    }

    #[test]
    fn test_belongs_to_server() {
        assert!(belongs_to_server(1, 0, 1));
        assert!(belongs_to_server(255, 0, 2));
        assert!(belongs_to_server(256, 1, 2));
        assert!(!belongs_to_server(256, 0, 2));
    }

    #[test]
    fn test_process_event_counts_matches() {
        let sep = processor(1);
        let base = 1_325_376_000_000;
        for i in 0..2 {
            assert_eq!(sep.process_event(&Event::new(7, base + i).call(10, 1.0)).unwrap(), 0);
        }
        assert_eq!(sep.process_event(&Event::new(7, base + 2).call(10, 1.0)).unwrap(), 1);
        // Other subscribers are independent
        assert_eq!(sep.process_event(&Event::new(8, base + 3).call(10, 1.0)).unwrap(), 0);

        let record = sep.controller().read(7).unwrap();
        let offset = calls_week(sep.schema());
        assert_eq!(RecordView::new(&record).get_u32(offset), 3);

        let stats = sep.stats();
        assert_eq!(stats.events_processed, 4);
        assert_eq!(stats.campaigns_matched, 1);
        assert_eq!(sep.latency().snapshot().count, 4);
    }

    #[test]
    fn test_new_week_resets_counts() {
        let sep = processor(1);
        let monday = crate::schema::FIRST_MONDAY + 2000 * crate::schema::MSECS_PER_WEEK;
        for i in 0..3 {
            sep.process_event(&Event::new(1, monday + i)).unwrap();
        }
        let next_week = monday + crate::schema::MSECS_PER_WEEK + 1;
        assert_eq!(sep.process_event(&Event::new(1, next_week)).unwrap(), 0);
        let record = sep.controller().read(1).unwrap();
        assert_eq!(RecordView::new(&record).get_u32(calls_week(sep.schema())), 1);
    }

    #[test]
    fn test_queues_route_by_caller() {
        let sep = processor(3);
        let events: Vec<Event> = (0..30).map(|i| Event::new(i % 6, 1000 + i as i64)).collect();
        sep.enqueue_updates(&events);
        assert_eq!(sep.stats().queued_events, 30);

        sep.process_all_queued_events(1).unwrap();
        let stats = sep.stats();
        assert_eq!(stats.events_processed, 10);
        assert_eq!(stats.queued_events, 20);
        assert!(sep.controller().read(1).is_some());
        assert!(sep.controller().read(4).is_some());
        assert!(sep.controller().read(0).is_none());

        assert!(sep.process_all_queued_events(3).is_err());
    }

    #[test]
    fn test_run_and_stop_drain_queues() {
        let sep = Arc::new(processor(2));
        sep.run().unwrap();
        let events: Vec<Event> = (0..200).map(|i| Event::new(i % 10, 1000 + i as i64)).collect();
        sep.enqueue_updates(&events);
        sep.stop();

        let stats = sep.stats();
        assert_eq!(stats.events_processed, 200);
        assert_eq!(stats.queued_events, 0);
        // 20 calls each, all in one week
        assert_eq!(stats.campaigns_matched, 10 * 18);
    }

    #[test]
    fn test_populate_respects_server() {
        let (schema, ctrl) = controller(2);
        let index = Arc::new(CampaignIndex::empty(schema.total_size()));
        let config = ProcessorConfig {
            threads: 3,
            server_id: 1,
            server_num: 2,
            ..ProcessorConfig::default()
        };
        let sep = EventProcessor::new(config, Arc::clone(&ctrl), schema, index).unwrap();
        let populated = sep.populate(1024, 0).unwrap();

        // ids 256..=511 and 768..=1023
        assert_eq!(populated, 512);
        assert_eq!(ctrl.stats().total_records(), 512);
        assert!(ctrl.read(300).is_some());
        assert!(ctrl.read(100).is_none());

        let full = ctrl.read_full_record(300).unwrap();
        assert_eq!(full.len(), ctrl.layout().record_size());
        let dim = DimensionRecord::from_bytes(&full[ctrl.layout().am_size()..]).unwrap();
        assert_eq!(dim.subscriber_id, 300);
    }
}
