//! AIM REST API
//!
//! HTTP transport for the engine, built with Axum.
//!
//! # Endpoints
//!
//! ## Events
//! - `POST /api/v1/events` - Queue a single call event
//! - `POST /api/v1/events/batch` - Queue a batch of call events
//!
//! ## Queries
//! - `POST /api/v1/queries/:kind` - Run query 1..=7, arguments and result as JSON
//!
//! ## Records
//! - `GET /api/v1/records/:id` - Decoded subscriber record
//!
//! ## Stats
//! - `GET /api/v1/stats` - Controller, processing and index statistics
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use aim::api::{serve, ApiConfig, AppState};
//!
//! let state = AppState::new(processor, delivery, ApiConfig::default());
//! serve(state, &ApiConfig::default()).await?;
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/events", post(routes::events::ingest_event))
        .route("/events/batch", post(routes::events::ingest_batch))
        .route("/queries/:kind", post(routes::queries::run_query))
        .route("/records/:id", get(routes::records::get_record))
        .route("/stats", get(routes::stats::get_stats));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("AIM API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Server(e.to_string()))?;

    tracing::info!("AIM API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{HealthResponse, RecordResponse};
    use crate::campaign::{
        Campaign, CampaignIndexBuilder, FiringPolicy, Operator, Predicate,
    };
    use crate::query::{LocalRtaCommunication, Q1Out, RtaCommunication, ScanContext};
    use crate::schema::{
        AggrFun, AnalyticsSchema, DimensionSchema, FilterType, Metric, Value, WindowLength,
    };
    use crate::sep::{EventProcessor, ProcessorConfig};
    use crate::storage::{ControllerConfig, ShardedController, StoreLayout};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use std::time::Duration;
    use tower::util::ServiceExt;

    struct TestApp {
        router: Router,
        processor: Arc<EventProcessor>,
        controller: Arc<ShardedController>,
    }

    impl Drop for TestApp {
        fn drop(&mut self) {
            self.processor.stop();
            self.controller.shutdown();
        }
    }

    fn create_test_app() -> TestApp {
        let schema = Arc::new(AnalyticsSchema::standard());
        let layout = Arc::new(StoreLayout::new(&schema, &DimensionSchema::new()));
        let rta = Arc::new(RtaCommunication::new(ScanContext::new(
            Arc::clone(&schema),
            Arc::clone(&layout),
            2,
        )));
        let config = ControllerConfig {
            shards: 2,
            records_per_bucket: 64,
            ..ControllerConfig::default()
        };
        let controller =
            Arc::new(ShardedController::new(config, layout, Arc::clone(&rta)).unwrap());

        let calls = schema
            .offset_of(Metric::Call, AggrFun::Sum, FilterType::No, WindowLength::Day)
            .unwrap();
        let mut builder = CampaignIndexBuilder::new(&schema);
        builder.entry_attribute(calls).unwrap();
        builder
            .add_campaign(Campaign::new(0, 0, i64::MAX, FiringPolicy::Always))
            .unwrap();
        let p = builder
            .add_predicate(Predicate::new(calls, Operator::Gr, Value::UInt(0)))
            .unwrap();
        builder.add_conjunct(0, &[p]).unwrap();

        let processor = Arc::new(
            EventProcessor::new(
                ProcessorConfig::default(),
                Arc::clone(&controller),
                Arc::clone(&schema),
                Arc::new(builder.build().unwrap()),
            )
            .unwrap(),
        );
        processor.populate(100, 0).unwrap();
        processor.run().unwrap();
        controller.start().unwrap();

        let delivery = Arc::new(LocalRtaCommunication::start(rta, 1).unwrap());
        let api_config = ApiConfig {
            query_timeout: Duration::from_secs(10),
            max_batch_size: 1000,
            ..ApiConfig::default()
        };
        let state = AppState::new(Arc::clone(&processor), delivery, api_config);

        TestApp {
            router: build_router(state),
            processor,
            controller,
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Response {
        app.router.clone().oneshot(request).await.unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_health_endpoints() {
        let app = create_test_app();

        assert_eq!(send(&app, get("/health/live")).await.status(), StatusCode::OK);
        assert_eq!(send(&app, get("/health/ready")).await.status(), StatusCode::OK);

        let response = send(&app, get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = json(response).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.shards, 2);
        assert_eq!(health.records, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_updates_record() {
        let app = create_test_app();
        let ts = 1_325_376_000_000i64;

        let body = format!(
            r#"{{"caller_id": 7, "duration": 120, "cost": 2.5, "timestamp": {}}}"#,
            ts
        );
        let response = send(&app, post_json("/api/v1/events", &body)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        for _ in 0..200 {
            if app.processor.stats().events_processed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(app.processor.stats().campaigns_matched, 1);

        let response = send(&app, get("/api/v1/records/7")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let record: RecordResponse = json(response).await;
        assert_eq!(record.last_updated, ts);
        let dur_sum = record
            .attributes
            .iter()
            .find(|a| a.name == "dur_sum_all_day")
            .unwrap();
        assert_eq!(dur_sum.value, serde_json::json!(120));
        assert_eq!(record.dimensions.len(), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_batch_validation() {
        let app = create_test_app();

        let response = send(&app, post_json("/api/v1/events/batch", r#"{"events": []}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            post_json(
                "/api/v1/events/batch",
                r#"{"events": [{"caller_id": 1, "cost": 1.0}, {"caller_id": 2, "cost": -1.0}]}"#,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            post_json(
                "/api/v1/events/batch",
                r#"{"events": [{"caller_id": 1, "cost": 1.0}, {"caller_id": 2}]}"#,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_timestamp_out_of_range() {
        let app = create_test_app();
        let response = send(
            &app,
            post_json(
                "/api/v1/events",
                r#"{"caller_id": 1, "cost": 1.0, "timestamp": 9223372036854774807}"#,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_record() {
        let app = create_test_app();
        let response = send(&app, get("/api/v1/records/100000")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_query_q1_on_default_records() {
        let app = create_test_app();
        let response = send(&app, post_json("/api/v1/queries/1", r#"{"alpha": 0}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let out: Q1Out = json(response).await;
        assert!(out.success);
        // Default records have no calls and no duration
        assert_eq!(out.avg, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_query_errors() {
        let app = create_test_app();

        let response = send(&app, post_json("/api/v1/queries/9", "{}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, post_json("/api/v1/queries/1", r#"{"beta": 3}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stats() {
        let app = create_test_app();
        let response = send(&app, get("/api/v1/stats")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stats: serde_json::Value = json(response).await;
        assert_eq!(stats["schema"]["attributes"], 42);
        assert_eq!(stats["campaigns"]["campaigns"], 1);
        assert_eq!(stats["controller"]["shards"].as_array().unwrap().len(), 2);
    }
}
