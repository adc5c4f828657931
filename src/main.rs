//! AIM demo driver
//!
//! Populates the analytics matrix, streams random call events through the
//! event processor and runs the seven scan queries against the result.

use std::time::{Duration, Instant};

use aim::query::{Q1In, Q2In, Q3In, Q4In, Q5In, Q6In, Q7In, QueryRequest};
use aim::schema::Event;
use aim::{Config, Engine};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Events streamed by the demo
const DEMO_EVENTS: usize = 200_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_default();
    init_logging(&config);

    tracing::info!("AIM engine v{}", env!("CARGO_PKG_VERSION"));

    let engine = Engine::build(&config)?;
    let start_ts = chrono::Utc::now().timestamp_millis();
    engine.start(config.engine.subscribers, start_ts)?;

    demo_events(&engine, &config, start_ts).await;
    demo_queries(&engine).await;

    tracing::info!("Latency: {}", engine.processor.latency().snapshot_and_reset());
    tracing::info!("Controller: {}", engine.controller.stats());

    tracing::info!("Shutting down...");
    engine.shutdown();
    tracing::info!("AIM shutdown complete");
    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("aim={}", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Random calls of subscribers stored on this server, one millisecond apart
fn random_events(config: &Config, start_ts: i64, n: usize) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(config.sep.seed);
    let subscribers = config.engine.subscribers.max(1);
    let mut events = Vec::with_capacity(n);
    while events.len() < n {
        let caller = rng.gen_range(1..=subscribers);
        if !aim::sep::belongs_to_server(caller, config.engine.server_id, config.engine.server_num) {
            continue;
        }
        let mut event = Event::new(caller, start_ts + events.len() as i64)
            .call(rng.gen_range(1..3600), rng.gen_range(0.05..20.0))
            .long_distance(rng.gen_bool(0.3));
        event.call_id = events.len() as u64;
        event.callee_id = rng.gen_range(1..=subscribers);
        events.push(event);
    }
    events
}

async fn demo_events(engine: &Engine, config: &Config, start_ts: i64) {
    let events = random_events(config, start_ts, DEMO_EVENTS);
    let started = Instant::now();
    for chunk in events.chunks(10_000) {
        engine.processor.enqueue_updates(chunk);
    }
    while engine.processor.stats().events_processed < events.len() as u64 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let stats = engine.processor.stats();
    tracing::info!(
        events = stats.events_processed,
        campaigns_matched = stats.campaigns_matched,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Processed demo events"
    );
}

async fn demo_queries(engine: &Engine) {
    let requests = [
        QueryRequest::Q1(Q1In { alpha: 2 }),
        QueryRequest::Q2(Q2In { alpha: 2 }),
        QueryRequest::Q3(Q3In {}),
        QueryRequest::Q4(Q4In { alpha: 1, beta: 1 }),
        QueryRequest::Q5(Q5In {
            sub_type: 1,
            sub_category: 1,
        }),
        QueryRequest::Q6(Q6In { country_id: 0 }),
        QueryRequest::Q7(Q7In {
            subscriber_value_type: 1,
            window_length: 1,
        }),
    ];
    for request in &requests {
        let started = Instant::now();
        match engine.delivery.execute(request).await {
            Ok(reply) => tracing::info!(
                query = request.kind(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "{:?}",
                reply
            ),
            Err(e) => tracing::error!(query = request.kind(), "Query failed: {}", e),
        }
    }
}
