//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `AIM_*` environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub sep: SepConfig,

    #[serde(default)]
    pub meta: MetaConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage and scan engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of shards, one RTA worker thread each
    #[serde(default = "default_shards")]
    pub shards: usize,

    #[serde(default = "default_records_per_bucket")]
    pub records_per_bucket: usize,

    /// Merge the delta every N scan cycles
    #[serde(default = "default_merge_interval")]
    pub merge_interval: u32,

    /// Initial capacity of a fresh delta map; derived when absent
    #[serde(default)]
    pub delta_alloc_hint: Option<usize>,

    #[serde(default = "default_subscribers")]
    pub subscribers: u64,

    #[serde(default)]
    pub server_id: u64,

    #[serde(default = "default_server_num")]
    pub server_num: u64,
}

fn default_shards() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(1)
}

fn default_records_per_bucket() -> usize {
    3 * 1024
}

fn default_merge_interval() -> u32 {
    1
}

fn default_subscribers() -> u64 {
    10_000
}

fn default_server_num() -> u64 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            records_per_bucket: default_records_per_bucket(),
            merge_interval: default_merge_interval(),
            delta_alloc_hint: None,
            subscribers: default_subscribers(),
            server_id: 0,
            server_num: default_server_num(),
        }
    }
}

impl EngineConfig {
    /// Expected number of delta entries per shard between two merges.
    pub fn effective_delta_hint(&self) -> usize {
        if let Some(hint) = self.delta_alloc_hint {
            return hint.max(1);
        }
        let shards = self.shards.max(1) as u64;
        let derived = 100 * self.merge_interval.max(1) as u64 * self.subscribers / 10_000_000 / shards;
        (derived as usize).max(16)
    }
}

/// Event processing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SepConfig {
    #[serde(default = "default_sep_threads")]
    pub threads: usize,

    /// Seed for the random dimension records written by populate
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_sep_threads() -> usize {
    2
}

fn default_seed() -> u64 {
    42
}

impl Default for SepConfig {
    fn default() -> Self {
        Self {
            threads: default_sep_threads(),
            seed: default_seed(),
        }
    }
}

/// Schema and campaign metadata configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetaConfig {
    /// SQLite metadata database; the standard schema is used when absent
    pub path: Option<PathBuf>,

    #[serde(default = "default_campaigns")]
    pub campaigns: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_campaigns() -> usize {
    300
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            path: None,
            campaigns: default_campaigns(),
            seed: default_seed(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Threads polling finished queries for results
    #[serde(default = "default_communication_threads")]
    pub communication_threads: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    crate::query::RTA_PORT
}

fn default_communication_threads() -> usize {
    1
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            communication_threads: default_communication_threads(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("aim").join("config.toml")),
            Some(PathBuf::from("/etc/aim/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.shards == 0 {
            return Err(ConfigError::Invalid("engine.shards must be at least 1".into()));
        }
        if self.engine.records_per_bucket == 0 {
            return Err(ConfigError::Invalid(
                "engine.records_per_bucket must be at least 1".into(),
            ));
        }
        if self.engine.server_num == 0 || self.engine.server_id >= self.engine.server_num {
            return Err(ConfigError::Invalid(format!(
                "engine.server_id {} out of range for server_num {}",
                self.engine.server_id, self.engine.server_num
            )));
        }
        if self.sep.threads == 0 {
            return Err(ConfigError::Invalid("sep.threads must be at least 1".into()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        // Engine overrides
        if let Some(v) = parsed("AIM_SHARDS") {
            self.engine.shards = v;
        }
        if let Some(v) = parsed("AIM_RECORDS_PER_BUCKET") {
            self.engine.records_per_bucket = v;
        }
        if let Some(v) = parsed("AIM_MERGE_INTERVAL") {
            self.engine.merge_interval = v;
        }
        if let Some(v) = parsed("AIM_SUBSCRIBERS") {
            self.engine.subscribers = v;
        }
        if let Some(v) = parsed("AIM_SERVER_ID") {
            self.engine.server_id = v;
        }
        if let Some(v) = parsed("AIM_SERVER_NUM") {
            self.engine.server_num = v;
        }

        if let Some(v) = parsed("AIM_SEP_THREADS") {
            self.sep.threads = v;
        }
        if let Ok(path) = std::env::var("AIM_META_PATH") {
            self.meta.path = Some(PathBuf::from(path));
        }

        // API overrides
        if let Ok(host) = std::env::var("AIM_API_HOST") {
            self.api.host = host;
        }
        if let Some(p) = parsed("AIM_API_PORT") {
            self.api.port = p;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("AIM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("AIM_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# AIM Configuration
#
# Environment variables override these settings:
# - AIM_SHARDS, AIM_RECORDS_PER_BUCKET, AIM_MERGE_INTERVAL
# - AIM_SUBSCRIBERS, AIM_SERVER_ID, AIM_SERVER_NUM
# - AIM_SEP_THREADS, AIM_META_PATH
# - AIM_API_HOST, AIM_API_PORT
# - AIM_LOG_LEVEL, AIM_LOG_FORMAT

[engine]
# Number of shards (one scan thread each)
shards = 4

# Fixed capacity of a column bucket
records_per_bucket = 3072

# Merge pending deltas every N scan cycles
merge_interval = 1

# Initial delta map capacity (derived from subscribers when omitted)
# delta_alloc_hint = 1024

# Number of subscribers loaded at startup
subscribers = 10000

# Static partitioning across servers: (subscriber_id >> 8) % server_num == server_id
server_id = 0
server_num = 1

[sep]
# Event processing threads
threads = 2

# Seed for random dimension records
seed = 42

[meta]
# SQLite metadata database (schema + campaigns)
# path = "/var/lib/aim/meta.db"

# Campaigns generated when no database is configured
campaigns = 300
seed = 42

[api]
host = "0.0.0.0"
port = 5001

# Threads delivering finished query results
communication_threads = 1

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
