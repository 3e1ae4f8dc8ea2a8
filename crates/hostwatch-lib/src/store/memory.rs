//! In-memory sample store

use super::{validate_sample, SampleStore};
use crate::error::StoreError;
use crate::models::{DateRange, NewSample, Sample};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Vector-backed store with the same ordering contract as the SQLite store
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    samples: RwLock<Vec<Sample>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Sample>> {
        self.samples
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Sample>> {
        self.samples
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SampleStore for MemorySampleStore {
    fn append(&self, sample: &NewSample) -> Result<i64, StoreError> {
        validate_sample(sample)?;

        let mut samples = self.write();
        let id = samples.last().map(|s| s.id + 1).unwrap_or(1);
        samples.push(Sample {
            id,
            timestamp: sample.timestamp,
            cpu_percent: sample.cpu_percent,
            memory_percent: sample.memory_percent,
            disk_percent: sample.disk_percent,
        });
        Ok(id)
    }

    fn query(&self, range: Option<&DateRange>) -> Result<Vec<Sample>, StoreError> {
        let mut results: Vec<Sample> = self
            .read()
            .iter()
            .filter(|s| range.map(|r| r.contains(s.timestamp)).unwrap_or(true))
            .cloned()
            .collect();

        results.sort_by_key(|s| (s.timestamp, s.id));
        Ok(results)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read().len())
    }
}
