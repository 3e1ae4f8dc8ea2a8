//! Integration tests for the agent API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use hostwatch_agent::api::{create_router, AppState};
use hostwatch_lib::{
    health::{components, HealthRegistry},
    observability::HostwatchMetrics,
    store::{MemorySampleStore, SampleStore},
    train, DetectorParams, ModelBundle, NewSample,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    setup_test_app_with_model(None).await
}

async fn setup_test_app_with_model(model: Option<Arc<ModelBundle>>) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLER).await;
    health_registry.register(components::STORE).await;
    health_registry.register(components::MODEL).await;

    let metrics = HostwatchMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics).with_model(model));
    let router = create_router(state.clone());

    (router, state)
}

fn trained_bundle() -> ModelBundle {
    let store = MemorySampleStore::new();
    let base = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
    for i in 0..50 {
        store
            .append(&NewSample::new(
                base + Duration::seconds(10 * i),
                Some(20.0 + (i % 5) as f64),
                Some(40.0),
                Some(60.0 + (i % 3) as f64),
            ))
            .unwrap();
    }
    let params = DetectorParams {
        n_estimators: 10,
        ..DetectorParams::default()
    };
    train(&store, &params).unwrap()
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let response = get(app, "/healthz").await;

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_model_missing() {
    let (app, state) = setup_test_app().await;

    // A missing bundle only degrades the agent
    state
        .health_registry
        .set_degraded(components::MODEL, "No model bundle")
        .await;

    let response = get(app, "/healthz").await;

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["model"]["message"], "No model bundle");
}

#[tokio::test]
async fn test_healthz_returns_503_when_store_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::STORE, "database is locked")
        .await;

    let response = get(app, "/healthz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health = body_json(response).await;
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    // By default, agent is not ready
    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;

    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::OK);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::SAMPLER, "Failed")
        .await;

    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_model_returns_404_without_bundle() {
    let (app, _state) = setup_test_app().await;

    let response = get(app, "/model").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_model_returns_bundle_info() {
    let (app, _state) = setup_test_app_with_model(Some(Arc::new(trained_bundle()))).await;

    let response = get(app, "/model").await;

    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;
    assert_eq!(info["format_version"], 1);
    assert_eq!(info["sample_count"], 50);
    assert_eq!(info["n_estimators"], 10);
    assert_eq!(info["contamination"], 0.05);
    assert_eq!(info["features"][1]["name"], "memory_percent");
    assert_eq!(info["features"][1]["scaler_std"], 0.0);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    // Record some metrics
    state.metrics.observe_sampling_latency(0.001);
    state.metrics.observe_training_duration(0.5);
    state.metrics.inc_samples_written();
    state.metrics.set_model_info(1, "2024-03-10T00:00:00+00:00");

    let response = get(app, "/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("hostwatch_sampling_latency_seconds"));
    assert!(metrics_text.contains("hostwatch_training_duration_seconds"));
    assert!(metrics_text.contains("hostwatch_samples_written_total"));
    assert!(metrics_text.contains("hostwatch_model_info"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_sampling_latency(0.001);
    state.metrics.observe_sampling_latency(0.5);
    state.metrics.observe_sampling_latency(1.2);

    let response = get(app, "/metrics").await;

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("hostwatch_sampling_latency_seconds_bucket"));
    assert!(metrics_text.contains("hostwatch_sampling_latency_seconds_count"));
    assert!(metrics_text.contains("hostwatch_sampling_latency_seconds_sum"));
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state) = setup_test_app().await;

    let response = get(app, "/healthz").await;
    let health = body_json(response).await;

    assert!(health["components"].is_object());
    assert!(health["components"]["sampler"].is_object());
    assert!(health["components"]["store"].is_object());
    assert!(health["components"]["model"].is_object());
}
