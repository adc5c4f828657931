//! Engine assembly
//!
//! Wires metadata, storage, query delivery and event processing together
//! from a [`Config`]. Used by the binaries and the integration tests.

use std::sync::Arc;

use thiserror::Error;

use crate::campaign::CampaignIndex;
use crate::config::{Config, MetaConfig};
use crate::meta::{MetaError, MetaStore};
use crate::query::{LocalRtaCommunication, QueryError, RtaCommunication, ScanContext};
use crate::schema::{AnalyticsSchema, DimensionSchema};
use crate::sep::{EventProcessor, ProcessorConfig};
use crate::storage::{ControllerConfig, ShardedController, StorageError, StoreLayout};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A running single-node engine
pub struct Engine {
    pub schema: Arc<AnalyticsSchema>,
    pub controller: Arc<ShardedController>,
    pub processor: Arc<EventProcessor>,
    pub delivery: Arc<LocalRtaCommunication>,
}

impl Engine {
    /// Schema and campaign index from the metadata database, or from a
    /// freshly generated in-memory one when no path is configured
    pub fn load_metadata(meta: &MetaConfig) -> EngineResult<(AnalyticsSchema, CampaignIndex)> {
        let store = match &meta.path {
            Some(path) => {
                tracing::info!("Loading metadata from {:?}", path);
                MetaStore::open(path)?
            }
            None => {
                tracing::info!(
                    campaigns = meta.campaigns,
                    seed = meta.seed,
                    "No metadata database configured, generating campaigns"
                );
                let mut store = MetaStore::in_memory()?;
                store.populate_standard(meta.seed, meta.campaigns)?;
                store
            }
        };
        let schema = store.load_schema()?;
        let index = store.load_campaign_index(&schema)?;
        Ok((schema, index))
    }

    /// Build every component; delivery threads start, shard and event
    /// workers do not
    pub fn build(config: &Config) -> EngineResult<Self> {
        let (schema, index) = Self::load_metadata(&config.meta)?;
        let schema = Arc::new(schema);
        let layout = Arc::new(StoreLayout::new(&schema, &DimensionSchema::new()));

        let controller_config = ControllerConfig::from(&config.engine);
        let rta = Arc::new(RtaCommunication::new(ScanContext::new(
            Arc::clone(&schema),
            Arc::clone(&layout),
            controller_config.shards,
        )));
        let controller = Arc::new(ShardedController::new(
            controller_config,
            layout,
            Arc::clone(&rta),
        )?);
        let processor = Arc::new(EventProcessor::new(
            ProcessorConfig::from(config),
            Arc::clone(&controller),
            Arc::clone(&schema),
            Arc::new(index),
        )?);
        let delivery = Arc::new(LocalRtaCommunication::start(
            rta,
            config.api.communication_threads,
        )?);

        Ok(Self {
            schema,
            controller,
            processor,
            delivery,
        })
    }

    /// Populate `subscribers` default records, then start the shard and
    /// event workers
    pub fn start(&self, subscribers: u64, start_ts: i64) -> EngineResult<()> {
        self.processor.populate(subscribers, start_ts)?;
        self.controller.start()?;
        self.processor.run()?;
        tracing::info!("Engine started: {}", self.controller.stats());
        Ok(())
    }

    pub fn shutdown(&self) {
        self.processor.stop();
        self.controller.shutdown();
        self.delivery.shutdown();
        tracing::info!("Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Q1In, Q3In, QueryRequest, QueryResponse};
    use crate::schema::Event;
    use std::time::Duration;
    use tempfile::TempDir;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.engine.shards = 2;
        config.engine.records_per_bucket = 32;
        config.sep.threads = 2;
        config.meta.campaigns = 20;
        config
    }

    #[test]
    fn test_generated_metadata() {
        let (schema, index) = Engine::load_metadata(&small_config().meta).unwrap();
        assert_eq!(schema.len(), 42);
        assert_eq!(index.num_campaigns(), 20);
    }

    #[test]
    fn test_metadata_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.db");
        MetaStore::create(&path)
            .unwrap()
            .populate_standard(5, 7)
            .unwrap();

        let mut config = small_config();
        config.meta.path = Some(path);
        let (_, index) = Engine::load_metadata(&config.meta).unwrap();
        assert_eq!(index.num_campaigns(), 7);
    }

    #[test]
    fn test_end_to_end() {
        let engine = Engine::build(&small_config()).unwrap();
        engine.start(500, 0).unwrap();

        let ts = 1_325_376_000_000i64;
        let events: Vec<Event> = (1..=50u64)
            .flat_map(|id| (0..4).map(move |i| Event::new(id, ts + i).call(30, 0.5)))
            .collect();
        engine.processor.enqueue_updates(&events);
        for _ in 0..500 {
            if engine.processor.stats().events_processed == events.len() as u64 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(engine.processor.stats().events_processed, 200);

        let reply = engine
            .delivery
            .execute_blocking(&QueryRequest::Q1(Q1In { alpha: 3 }))
            .unwrap();
        match reply {
            // Four local calls of 30s each this week
            QueryResponse::Q1(out) => {
                assert!(out.success);
                assert_eq!(out.avg, 120.0);
            }
            other => panic!("unexpected reply {:?}", other),
        }

        let reply = engine
            .delivery
            .execute_blocking(&QueryRequest::Q3(Q3In {}))
            .unwrap();
        assert!(reply.success());

        assert_eq!(engine.controller.stats().total_records(), 500);
        engine.shutdown();
    }
}
