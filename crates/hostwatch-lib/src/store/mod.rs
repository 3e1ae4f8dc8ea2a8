//! Append-only sample storage
//!
//! The store owns sample lifetime: samples are appended once by the sampler
//! and read, never mutated, by training and scoring. Two implementations are
//! provided: a SQLite-backed store for the daemon and CLI, and an in-memory
//! store used by tests and short-lived tooling.

mod memory;
mod sqlite;

pub use memory::MemorySampleStore;
pub use sqlite::{SqliteSampleStore, DEFAULT_TABLE_NAME};
pub(crate) use sqlite::validate_table_name;

use crate::error::StoreError;
use crate::models::{DateRange, NewSample, Sample};

/// Trait for sample store implementations
pub trait SampleStore: Send + Sync {
    /// Append one sample atomically and return its assigned id.
    ///
    /// On failure no part of the row is visible to readers.
    fn append(&self, sample: &NewSample) -> Result<i64, StoreError>;

    /// Return samples ordered by ascending timestamp, optionally restricted
    /// to a half-open date range. An empty result is not an error.
    fn query(&self, range: Option<&DateRange>) -> Result<Vec<Sample>, StoreError>;

    /// Number of stored samples
    fn count(&self) -> Result<usize, StoreError>;
}

/// Reject samples with out-of-range values before they reach storage
pub(crate) fn validate_sample(sample: &NewSample) -> Result<(), StoreError> {
    match sample.first_invalid() {
        Some((column, value)) => Err(StoreError::InvalidSample { column, value }),
        None => Ok(()),
    }
}
