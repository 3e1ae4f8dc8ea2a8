//! Offline training
//!
//! Loads every stored sample, fits the preprocessing pipeline and the
//! isolation forest, and persists both as a single model bundle. This is the
//! only path that creates or replaces the bundle.

use crate::artifact::ModelBundle;
use crate::detector::{DetectorParams, IsolationForest};
use crate::error::{StoreError, TrainingError};
use crate::observability::{HostwatchMetrics, StructuredLogger};
use crate::preprocess::FeaturePipeline;
use crate::store::SampleStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Configuration of a training run
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub params: DetectorParams,
    /// Where the bundle is written
    pub bundle_path: PathBuf,
    pub node_name: String,
}

/// Result of a persisted training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub bundle: Arc<ModelBundle>,
    /// SHA-256 of the stored bundle payload
    pub checksum: String,
}

/// Fit a model bundle on all samples in the store
pub fn train(store: &dyn SampleStore, params: &DetectorParams) -> Result<ModelBundle, TrainingError> {
    params.validate()?;

    let samples = store.query(None)?;
    if samples.is_empty() {
        return Err(StoreError::Unavailable("store holds no samples".to_string()).into());
    }
    debug!(samples = samples.len(), "Loaded training samples");

    let (pipeline, matrix) = FeaturePipeline::fit(&samples)?;
    let detector = IsolationForest::fit(&matrix, params)?;

    Ok(ModelBundle::new(pipeline, detector, params.clone(), samples.len()))
}

/// Train and atomically replace the bundle on disk
pub fn train_and_persist(
    store: &dyn SampleStore,
    config: &TrainingConfig,
) -> Result<TrainingOutcome, TrainingError> {
    let metrics = HostwatchMetrics::new();
    let logger = StructuredLogger::new(config.node_name.clone());
    let start = Instant::now();

    info!(
        bundle_path = ?config.bundle_path,
        n_estimators = config.params.n_estimators,
        contamination = config.params.contamination,
        "Starting training run"
    );

    let bundle = train(store, &config.params)?;
    let checksum = bundle.save(&config.bundle_path)?;

    metrics.observe_training_duration(start.elapsed().as_secs_f64());
    metrics.set_model_info(bundle.format_version, &bundle.trained_at.to_rfc3339());
    logger.log_training_completed(
        bundle.sample_count,
        bundle.detector.n_estimators(),
        bundle.detector.contamination(),
        bundle.detector.threshold(),
        &config.bundle_path.display().to_string(),
    );

    Ok(TrainingOutcome {
        bundle: Arc::new(bundle),
        checksum,
    })
}
