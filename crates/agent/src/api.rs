//! HTTP API for health checks, model info and Prometheus metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hostwatch_lib::{
    artifact::{ModelBundle, ModelSummary},
    health::HealthRegistry,
    observability::HostwatchMetrics,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: HostwatchMetrics,
    /// Bundle found at startup, if any
    pub model: Option<Arc<ModelBundle>>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: HostwatchMetrics) -> Self {
        Self {
            health_registry,
            metrics,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<Arc<ModelBundle>>) -> Self {
        self.model = model;
        self
    }
}

/// Liveness: 200 while every component is at least degraded, 503 otherwise
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    (status_code(health.status.is_operational()), Json(health))
}

/// Readiness: 503 until startup finished or while a component is unhealthy
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    (status_code(readiness.ready), Json(readiness))
}

fn status_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Loaded model bundle, 404 when scoring would fail open
async fn model(State(state): State<Arc<AppState>>) -> Response {
    match &state.model {
        Some(bundle) => (StatusCode::OK, Json(ModelSummary::from(bundle.as_ref()))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no model bundle loaded" })),
        )
            .into_response(),
    }
}

/// Prometheus text exposition of the global registry
async fn metrics() -> Response {
    let mut body = Vec::new();
    match TextEncoder::new().encode(&prometheus::gather(), &mut body) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/model", get(model))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
