//! Periodic sampling loop
//!
//! Collects one host sample per tick and appends it to the sample store.
//! Errors are isolated per tick: a failed write is logged and retried on the
//! next tick, never ending the loop. Shutdown is cooperative and takes effect
//! between ticks, or during a collection before its write commits.

use super::HostCollector;
use crate::health::{components, HealthRegistry};
use crate::models::NewSample;
use crate::observability::{HostwatchMetrics, StructuredLogger};
use crate::store::SampleStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Consecutive write failures before the sampler reports itself degraded
const DEGRADED_AFTER_FAILURES: u32 = 3;

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Interval between samples (default: 10 seconds)
    pub interval: Duration,
    /// Node name used in structured logs
    pub node_name: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            node_name: "unknown".to_string(),
        }
    }
}

/// Result of a single sampler tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The sample was committed under this id
    Written(i64),
    /// The append failed and was rolled back
    WriteFailed(String),
    /// Shutdown arrived before the write; nothing was persisted
    Cancelled,
}

/// Sampling loop that periodically persists host samples
pub struct SamplingLoop {
    collector: Arc<dyn HostCollector>,
    store: Arc<dyn SampleStore>,
    config: SamplingConfig,
    health: Option<HealthRegistry>,
    metrics: HostwatchMetrics,
    logger: StructuredLogger,
    consecutive_failures: u32,
}

impl SamplingLoop {
    /// Create a new sampling loop
    pub fn new(
        collector: Arc<dyn HostCollector>,
        store: Arc<dyn SampleStore>,
        config: SamplingConfig,
    ) -> Self {
        let logger = StructuredLogger::new(config.node_name.clone());
        Self {
            collector,
            store,
            config,
            health: None,
            metrics: HostwatchMetrics::new(),
            logger,
            consecutive_failures: 0,
        }
    }

    /// Report sampler health to a registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until a shutdown signal is received
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting host sampling loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.tick(&mut shutdown).await == TickOutcome::Cancelled {
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        info!("Shutting down host sampling loop");
    }

    /// Collect and persist one sample.
    ///
    /// A shutdown signal observed before the write starts cancels the tick
    /// without touching the store.
    pub async fn tick(&mut self, shutdown: &mut broadcast::Receiver<()>) -> TickOutcome {
        let start = Instant::now();

        let sample = tokio::select! {
            sample = self.collector.collect() => sample,
            _ = shutdown.recv() => {
                debug!("Shutdown during collection, discarding tick");
                return TickOutcome::Cancelled;
            }
        };

        if shutdown_pending(shutdown) {
            debug!("Shutdown before write, discarding tick");
            return TickOutcome::Cancelled;
        }

        let missing = sample.features().iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            self.metrics.add_missing_readings(missing as u64);
        }

        let outcome = self.write(sample).await;
        self.metrics
            .observe_sampling_latency(start.elapsed().as_secs_f64());
        self.record(&outcome).await;
        outcome
    }

    async fn write(&self, sample: NewSample) -> TickOutcome {
        let store = self.store.clone();
        let written = tokio::task::spawn_blocking(move || {
            store.append(&sample).map(|id| (id, sample))
        })
        .await;

        match written {
            Ok(Ok((id, sample))) => {
                self.logger.log_sample_written(
                    id,
                    sample.cpu_percent,
                    sample.memory_percent,
                    sample.disk_percent,
                );
                TickOutcome::Written(id)
            }
            Ok(Err(e)) => TickOutcome::WriteFailed(e.to_string()),
            Err(e) => TickOutcome::WriteFailed(format!("write task failed: {e}")),
        }
    }

    /// Update failure tracking, metrics and health for a finished tick
    async fn record(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Written(_) => {
                self.metrics.inc_samples_written();
                if self.consecutive_failures > 0 {
                    info!(
                        failures = self.consecutive_failures,
                        "Sample writes recovered"
                    );
                    if let Some(health) = &self.health {
                        health.set_healthy(components::SAMPLER).await;
                        health.set_healthy(components::STORE).await;
                    }
                }
                self.consecutive_failures = 0;
            }
            TickOutcome::WriteFailed(error) => {
                self.metrics.inc_write_errors();
                self.consecutive_failures += 1;
                self.logger
                    .log_sample_write_failed(error, self.consecutive_failures);

                if let Some(health) = &self.health {
                    if self.consecutive_failures < DEGRADED_AFTER_FAILURES {
                        health
                            .set_degraded(components::STORE, format!("Last write failed: {error}"))
                            .await;
                    } else {
                        health
                            .set_unhealthy(
                                components::STORE,
                                format!(
                                    "{} consecutive write failures: {error}",
                                    self.consecutive_failures
                                ),
                            )
                            .await;
                        health
                            .set_degraded(
                                components::SAMPLER,
                                format!("{} consecutive write failures", self.consecutive_failures),
                            )
                            .await;
                    }
                }
            }
            TickOutcome::Cancelled => {}
        }
        self.metrics
            .set_consecutive_write_failures(self.consecutive_failures as i64);
    }
}

/// Check for a shutdown signal without waiting
fn shutdown_pending(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}

/// Builder for creating the sampling loop
pub struct SamplingLoopBuilder {
    collector: Option<Arc<dyn HostCollector>>,
    store: Option<Arc<dyn SampleStore>>,
    health: Option<HealthRegistry>,
    config: SamplingConfig,
}

impl SamplingLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            collector: None,
            store: None,
            health: None,
            config: SamplingConfig::default(),
        }
    }

    /// Set the host collector
    pub fn collector(mut self, collector: Arc<dyn HostCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Set the sample store
    pub fn store(mut self, store: Arc<dyn SampleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the health registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Set the sampling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the node name used in logs
    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.config.node_name = node_name.into();
        self
    }

    /// Build the sampling loop
    pub fn build(self) -> Result<SamplingLoop> {
        let collector = self
            .collector
            .ok_or_else(|| anyhow::anyhow!("Collector is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Sample store is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Sampling interval must be greater than zero");
        }

        let mut sampling_loop = SamplingLoop::new(collector, store, self.config);
        if let Some(health) = self.health {
            sampling_loop = sampling_loop.with_health(health);
        }
        Ok(sampling_loop)
    }
}

impl Default for SamplingLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
