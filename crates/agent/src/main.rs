//! Hostwatch agent - host metrics sampler
//!
//! Long-running daemon that appends one CPU/memory/disk sample to the
//! SQLite store per interval and serves health and metrics endpoints.

use anyhow::{Context, Result};
use hostwatch_agent::api;
use hostwatch_lib::{
    artifact::ModelBundle,
    collector::{SamplingLoopBuilder, SystemCollector},
    error::ArtifactError,
    health::{components, HealthRegistry},
    observability::{HostwatchMetrics, StructuredLogger},
    store::SqliteSampleStore,
    HostwatchConfig,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hostwatch-agent");

    let config = HostwatchConfig::load().context("Failed to load configuration")?;
    info!(node_name = %config.node_name, db_path = ?config.db_path, "Agent configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLER).await;
    health_registry.register(components::STORE).await;
    health_registry.register(components::MODEL).await;

    let metrics = HostwatchMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(
        AGENT_VERSION,
        config.sample_interval_secs,
        &config.db_path.display().to_string(),
    );

    let store = SqliteSampleStore::open(&config.db_path, &config.table_name)
        .with_context(|| format!("Failed to open sample store {:?}", config.db_path))?;

    // The agent only samples; the bundle is reported so operators see whether
    // scoring would fail open
    let model = match ModelBundle::load(&config.bundle_path) {
        Ok(bundle) => {
            let trained_at = bundle.trained_at.to_rfc3339();
            logger.log_bundle_loaded(
                &config.bundle_path.display().to_string(),
                bundle.format_version,
                &trained_at,
            );
            metrics.set_model_info(bundle.format_version, &trained_at);
            Some(Arc::new(bundle))
        }
        Err(ArtifactError::Missing(path)) => {
            health_registry
                .set_degraded(
                    components::MODEL,
                    format!("No model bundle at {:?}, run `hostwatch train`", path),
                )
                .await;
            None
        }
        Err(e) => {
            warn!(error = %e, "Model bundle unusable");
            health_registry
                .set_degraded(components::MODEL, format!("Model bundle unusable: {}", e))
                .await;
            None
        }
    };

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics).with_model(model));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let sampling_loop = SamplingLoopBuilder::new()
        .collector(Arc::new(SystemCollector::new(config.disk_path.clone())))
        .store(Arc::new(store))
        .health(health_registry.clone())
        .interval(config.sample_interval())
        .node_name(config.node_name.clone())
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sampler_handle = tokio::spawn(sampling_loop.run(shutdown_rx));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Err(e) = sampler_handle.await {
        error!(error = %e, "Sampling loop task failed");
    }

    info!("Shutdown complete");
    Ok(())
}
