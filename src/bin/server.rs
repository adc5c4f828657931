//! AIM API Server
//!
//! Run with: cargo run --bin aim-server -- --config aim.toml
//!
//! Without `--config` the usual locations are searched (see
//! [`Config::load_default`]). `AIM_*` environment variables override file
//! values, `RUST_LOG` overrides the log filter.

use std::path::PathBuf;

use aim::api::{serve, ApiConfig, AppState};
use aim::{Config, Engine};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "aim-server")]
#[command(about = "Analytics-in-Motion engine with its REST API", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subscribers to populate, overrides engine.subscribers
    #[arg(long)]
    subscribers: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(subscribers) = args.subscribers {
        config.engine.subscribers = subscribers;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("aim={},tower_http=debug", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting AIM server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        shards = config.engine.shards,
        subscribers = config.engine.subscribers,
        server_id = config.engine.server_id,
        server_num = config.engine.server_num,
        "Engine configuration"
    );

    let engine = tokio::task::block_in_place(|| -> anyhow::Result<Engine> {
        let engine = Engine::build(&config)?;
        engine.start(config.engine.subscribers, chrono::Utc::now().timestamp_millis())?;
        Ok(engine)
    })?;

    let api_config = ApiConfig::from(&config.api);
    let state = AppState::new(
        engine.processor.clone(),
        engine.delivery.clone(),
        api_config.clone(),
    );
    serve(state, &api_config).await?;

    tracing::info!("Shutting down engine...");
    tokio::task::block_in_place(|| engine.shutdown());
    tracing::info!("AIM server stopped");
    Ok(())
}
