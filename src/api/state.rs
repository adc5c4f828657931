//! Handler state
//!
//! One [`AppState`] is shared behind an `Arc` by every route. It reaches the
//! controller, schema and campaign index through the event processor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::campaign::CampaignIndex;
use crate::query::LocalRtaCommunication;
use crate::schema::AnalyticsSchema;
use crate::sep::EventProcessor;
use crate::storage::ShardedController;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<EventProcessor>,
    /// Query submission and result delivery
    pub delivery: Arc<LocalRtaCommunication>,
    pub config: Arc<ApiConfig>,
    started: Instant,
}

impl AppState {
    pub fn new(
        processor: Arc<EventProcessor>,
        delivery: Arc<LocalRtaCommunication>,
        config: ApiConfig,
    ) -> Self {
        Self {
            processor,
            delivery,
            config: Arc::new(config),
            started: Instant::now(),
        }
    }

    pub fn controller(&self) -> &Arc<ShardedController> {
        self.processor.controller()
    }

    pub fn schema(&self) -> &Arc<AnalyticsSchema> {
        self.processor.schema()
    }

    pub fn campaigns(&self) -> &Arc<CampaignIndex> {
        self.processor.campaigns()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Listener address and request limits
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Longest wait for a query result before answering 503
    pub query_timeout: Duration,
    /// Events accepted in one batch request
    pub max_batch_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::query::RTA_PORT,
            query_timeout: Duration::from_secs(30),
            max_batch_size: 100_000,
        }
    }
}

impl From<&crate::config::ApiConfig> for ApiConfig {
    fn from(config: &crate::config::ApiConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            ..Self::default()
        }
    }
}

impl ApiConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
