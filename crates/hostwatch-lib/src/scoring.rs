//! Batch scoring
//!
//! Labels stored samples with a loaded model bundle. Scoring never fails:
//! a missing or unreadable bundle, or a batch that cannot be preprocessed,
//! labels every sample normal, and an unreadable store yields an empty batch.

use crate::artifact::ModelBundle;
use crate::error::ArtifactError;
use crate::models::{AnomalyLabel, DateRange, LabeledSample, Sample};
use crate::observability::{HostwatchMetrics, StructuredLogger};
use crate::store::SampleStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Scores batches with an immutable, shared model bundle
#[derive(Clone)]
pub struct Scorer {
    bundle: Option<Arc<ModelBundle>>,
    metrics: HostwatchMetrics,
    logger: StructuredLogger,
}

impl Scorer {
    /// Create a scorer around an already loaded bundle, or none
    pub fn new(bundle: Option<Arc<ModelBundle>>, node_name: impl Into<String>) -> Self {
        Self {
            bundle,
            metrics: HostwatchMetrics::new(),
            logger: StructuredLogger::new(node_name),
        }
    }

    /// Load the bundle from disk once; failures leave the scorer without a model
    pub fn load(path: &Path, node_name: impl Into<String>) -> Self {
        let mut scorer = Self::new(None, node_name);
        match ModelBundle::load(path) {
            Ok(bundle) => {
                let trained_at = bundle.trained_at.to_rfc3339();
                scorer
                    .logger
                    .log_bundle_loaded(&path.display().to_string(), bundle.format_version, &trained_at);
                scorer.metrics.set_model_info(bundle.format_version, &trained_at);
                scorer.bundle = Some(Arc::new(bundle));
            }
            Err(ArtifactError::Missing(_)) => {
                scorer
                    .logger
                    .log_scoring_degraded(&format!("no model bundle at {}", path.display()));
            }
            Err(e) => {
                scorer
                    .logger
                    .log_scoring_degraded(&format!("model bundle unusable: {e}"));
            }
        }
        scorer
    }

    pub fn bundle(&self) -> Option<&Arc<ModelBundle>> {
        self.bundle.as_ref()
    }

    /// Label an already loaded batch
    pub fn label(&self, samples: &[Sample]) -> Vec<LabeledSample> {
        let labels = match self.predict(samples) {
            Some(labels) => labels,
            None => vec![AnomalyLabel::Normal; samples.len()],
        };

        let labeled: Vec<LabeledSample> = samples
            .iter()
            .zip(labels)
            .map(|(sample, label)| LabeledSample::new(sample, label))
            .collect();

        let anomalies = labeled.iter().filter(|l| l.anomaly.is_anomaly()).count();
        self.metrics.add_samples_scored(labeled.len() as u64);
        self.metrics.add_anomalies_detected(anomalies as u64);
        if !labeled.is_empty() {
            self.logger.log_anomalies_detected(labeled.len(), anomalies);
        }
        labeled
    }

    /// Load samples (optionally within a range) and label them
    pub fn score_batch(
        &self,
        store: &dyn SampleStore,
        range: Option<&DateRange>,
    ) -> Vec<LabeledSample> {
        match store.query(range) {
            Ok(samples) => self.label(&samples),
            Err(e) => {
                warn!(error = %e, "Cannot load samples for scoring, treating as no data");
                Vec::new()
            }
        }
    }

    fn predict(&self, samples: &[Sample]) -> Option<Vec<AnomalyLabel>> {
        if samples.is_empty() {
            return None;
        }
        let Some(bundle) = &self.bundle else {
            self.logger.log_scoring_degraded("no model bundle loaded");
            return None;
        };

        match bundle.pipeline.apply(samples) {
            Ok(matrix) => Some(bundle.detector.predict(&matrix)),
            Err(e) => {
                self.logger.log_scoring_degraded(&e.to_string());
                None
            }
        }
    }
}

/// Headline figures of a scored batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    /// First and last timestamp in the batch
    pub period: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub total: usize,
    pub anomalies: usize,
    pub anomaly_percent: f64,
    /// Most recent reading
    pub latest: Option<LabeledSample>,
}

impl BatchSummary {
    /// Summarize a batch ordered by ascending timestamp
    pub fn from_labeled(batch: &[LabeledSample]) -> Self {
        let total = batch.len();
        let anomalies = batch.iter().filter(|l| l.anomaly.is_anomaly()).count();
        let anomaly_percent = if total == 0 {
            0.0
        } else {
            anomalies as f64 / total as f64 * 100.0
        };

        Self {
            period: batch
                .first()
                .zip(batch.last())
                .map(|(first, last)| (first.timestamp, last.timestamp)),
            total,
            anomalies,
            anomaly_percent,
            latest: batch.last().cloned(),
        }
    }
}
