//! Observability infrastructure for the host monitor
//!
//! Provides:
//! - Prometheus metrics (sampling latency, write errors, training duration, anomalies)
//! - Structured logging of pipeline events with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge, GaugeVec,
    Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for sampling latency (in seconds)
const SAMPLING_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 1.5, 2.0, 5.0, 10.0];

/// Histogram buckets for training duration (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HostwatchMetricsInner> = OnceLock::new();

struct HostwatchMetricsInner {
    sampling_latency_seconds: Histogram,
    training_duration_seconds: Histogram,
    samples_written: IntCounter,
    write_errors: IntCounter,
    missing_readings: IntCounter,
    samples_scored: IntCounter,
    anomalies_detected: IntCounter,
    consecutive_write_failures: IntGauge,
    model_info: GaugeVec,
}

impl HostwatchMetricsInner {
    fn new() -> Self {
        Self {
            sampling_latency_seconds: register_histogram!(
                "hostwatch_sampling_latency_seconds",
                "Time spent collecting and persisting one host sample",
                SAMPLING_BUCKETS.to_vec()
            )
            .expect("Failed to register sampling_latency_seconds"),

            training_duration_seconds: register_histogram!(
                "hostwatch_training_duration_seconds",
                "Time spent training the anomaly detector",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            samples_written: register_int_counter!(
                "hostwatch_samples_written_total",
                "Total number of samples appended to the store"
            )
            .expect("Failed to register samples_written"),

            write_errors: register_int_counter!(
                "hostwatch_write_errors_total",
                "Total number of failed sample appends"
            )
            .expect("Failed to register write_errors"),

            missing_readings: register_int_counter!(
                "hostwatch_missing_readings_total",
                "Total number of metric readings that could not be collected"
            )
            .expect("Failed to register missing_readings"),

            samples_scored: register_int_counter!(
                "hostwatch_samples_scored_total",
                "Total number of samples labeled by the scoring pipeline"
            )
            .expect("Failed to register samples_scored"),

            anomalies_detected: register_int_counter!(
                "hostwatch_anomalies_detected_total",
                "Total number of samples labeled as anomalies"
            )
            .expect("Failed to register anomalies_detected"),

            consecutive_write_failures: register_int_gauge!(
                "hostwatch_consecutive_write_failures",
                "Number of sampler ticks in a row whose write failed"
            )
            .expect("Failed to register consecutive_write_failures"),

            model_info: register_gauge_vec!(
                "hostwatch_model_info",
                "Information about the currently loaded model bundle",
                &["format_version", "trained_at"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct HostwatchMetrics {
    _private: (),
}

impl Default for HostwatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HostwatchMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HostwatchMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &HostwatchMetricsInner {
        GLOBAL_METRICS.get_or_init(HostwatchMetricsInner::new)
    }

    pub fn observe_sampling_latency(&self, duration_secs: f64) {
        self.inner().sampling_latency_seconds.observe(duration_secs);
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn inc_samples_written(&self) {
        self.inner().samples_written.inc();
    }

    pub fn inc_write_errors(&self) {
        self.inner().write_errors.inc();
    }

    /// Count absent readings in a collected sample
    pub fn add_missing_readings(&self, count: u64) {
        self.inner().missing_readings.inc_by(count);
    }

    pub fn add_samples_scored(&self, count: u64) {
        self.inner().samples_scored.inc_by(count);
    }

    pub fn add_anomalies_detected(&self, count: u64) {
        self.inner().anomalies_detected.inc_by(count);
    }

    pub fn set_consecutive_write_failures(&self, count: i64) {
        self.inner().consecutive_write_failures.set(count);
    }

    /// Update model bundle info
    pub fn set_model_info(&self, format_version: u32, trained_at: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[&format_version.to_string(), trained_at])
            .set(1.0);
    }
}

/// Structured logger for pipeline events
///
/// Provides consistent field names for sampling, training and scoring
/// events so they can be filtered in the JSON log stream.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a persisted sample
    pub fn log_sample_written(
        &self,
        id: i64,
        cpu_percent: Option<f64>,
        memory_percent: Option<f64>,
        disk_percent: Option<f64>,
    ) {
        info!(
            event = "sample_written",
            node = %self.node_name,
            id = id,
            cpu_percent = ?cpu_percent,
            memory_percent = ?memory_percent,
            disk_percent = ?disk_percent,
            "Sample written"
        );
    }

    /// Log a failed append; the sampler keeps running
    pub fn log_sample_write_failed(&self, error: &str, consecutive_failures: u32) {
        warn!(
            event = "sample_write_failed",
            node = %self.node_name,
            error = %error,
            consecutive_failures = consecutive_failures,
            "Failed to write sample, will retry next tick"
        );
    }

    /// Log a completed training run
    pub fn log_training_completed(
        &self,
        samples: usize,
        n_estimators: usize,
        contamination: f64,
        threshold: f64,
        bundle_path: &str,
    ) {
        info!(
            event = "training_completed",
            node = %self.node_name,
            samples = samples,
            n_estimators = n_estimators,
            contamination = contamination,
            threshold = threshold,
            bundle_path = %bundle_path,
            "Anomaly detector trained"
        );
    }

    /// Log a model bundle load
    pub fn log_bundle_loaded(&self, bundle_path: &str, format_version: u32, trained_at: &str) {
        info!(
            event = "bundle_loaded",
            node = %self.node_name,
            bundle_path = %bundle_path,
            format_version = format_version,
            trained_at = %trained_at,
            "Model bundle loaded"
        );
    }

    /// Log that scoring fell back to labeling everything normal
    pub fn log_scoring_degraded(&self, reason: &str) {
        warn!(
            event = "scoring_degraded",
            node = %self.node_name,
            reason = %reason,
            "Anomaly detection disabled for this batch, all samples labeled normal"
        );
    }

    /// Log the outcome of a scored batch
    pub fn log_anomalies_detected(&self, total: usize, anomalies: usize) {
        info!(
            event = "anomalies_detected",
            node = %self.node_name,
            total = total,
            anomalies = anomalies,
            "Batch scored"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, interval_secs: u64, db_path: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            interval_secs = interval_secs,
            db_path = %db_path,
            "Host sampling agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Host sampling agent shutting down"
        );
    }
}
