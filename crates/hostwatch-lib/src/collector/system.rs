//! sysinfo-backed host collector

use super::{async_trait, HostCollector};
use crate::models::NewSample;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::sync::Mutex;
use tracing::debug;

/// Window over which CPU usage is measured for each sample
pub const DEFAULT_CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Reads CPU, memory and disk utilization of the local host
pub struct SystemCollector {
    state: Mutex<SystemState>,
    disk_path: PathBuf,
    cpu_window: Duration,
}

struct SystemState {
    system: System,
    disks: Disks,
}

impl SystemCollector {
    /// Create a collector reporting usage of the filesystem mounted at `disk_path`
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            state: Mutex::new(SystemState {
                system,
                disks: Disks::new_with_refreshed_list(),
            }),
            disk_path: disk_path.into(),
            cpu_window: DEFAULT_CPU_SAMPLE_WINDOW,
        }
    }

    /// Set the CPU measurement window (clamped to sysinfo's minimum)
    pub fn with_cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self
    }

    fn read_cpu(system: &System) -> Option<f64> {
        percent_reading(system.global_cpu_usage() as f64)
    }

    fn read_memory(system: &System) -> Option<f64> {
        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        percent_reading(system.used_memory() as f64 / total as f64 * 100.0)
    }

    fn read_disk(disks: &Disks, disk_path: &Path) -> Option<f64> {
        // Pick the deepest mount point containing the configured path
        let disk = disks
            .iter()
            .filter(|d| disk_path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())?;

        let total = disk.total_space();
        if total == 0 {
            return None;
        }
        let used = total.saturating_sub(disk.available_space());
        percent_reading(used as f64 / total as f64 * 100.0)
    }
}

#[async_trait]
impl HostCollector for SystemCollector {
    async fn collect(&self) -> NewSample {
        let timestamp = Utc::now();
        let mut state = self.state.lock().await;

        // CPU usage is the delta between two refreshes
        state.system.refresh_cpu_usage();
        tokio::time::sleep(self.cpu_window).await;
        state.system.refresh_cpu_usage();
        state.system.refresh_memory();
        state.disks.refresh();

        let sample = NewSample::new(
            timestamp,
            Self::read_cpu(&state.system),
            Self::read_memory(&state.system),
            Self::read_disk(&state.disks, &self.disk_path),
        );

        debug!(
            cpu = ?sample.cpu_percent,
            memory = ?sample.memory_percent,
            disk = ?sample.disk_percent,
            "Collected host sample"
        );
        sample
    }
}

/// Normalize a raw percentage reading.
///
/// Non-finite readings are collection failures and become absent; finite
/// readings are clamped into [0, 100].
pub fn percent_reading(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value.clamp(0.0, 100.0))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_reading() {
        assert_eq!(percent_reading(42.5), Some(42.5));
        assert_eq!(percent_reading(100.000_001), Some(100.0));
        assert_eq!(percent_reading(-0.1), Some(0.0));
        assert_eq!(percent_reading(f64::NAN), None);
        assert_eq!(percent_reading(f64::INFINITY), None);
    }

    #[tokio::test]
    async fn test_collect_produces_valid_sample() {
        let collector = SystemCollector::new("/").with_cpu_window(Duration::from_millis(10));
        let sample = collector.collect().await;

        assert!(sample.first_invalid().is_none());
    }
}
