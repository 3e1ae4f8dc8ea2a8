//! Host metrics sampling
//!
//! This module provides the collector that reads CPU, memory and disk
//! utilization from the host, and the periodic loop that appends one sample
//! per tick to the sample store.

mod r#loop;
mod system;

pub use r#loop::{SamplingConfig, SamplingLoop, SamplingLoopBuilder, TickOutcome};
pub use system::{percent_reading, SystemCollector, DEFAULT_CPU_SAMPLE_WINDOW};

use crate::models::NewSample;

pub use async_trait::async_trait;

/// Trait for host metrics collection implementations
///
/// Collection never fails as a whole: a metric that cannot be read is
/// reported as absent in the returned sample.
#[async_trait]
pub trait HostCollector: Send + Sync {
    /// Collect one timestamped sample
    async fn collect(&self) -> NewSample;
}
