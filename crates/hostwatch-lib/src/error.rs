//! Error types for the anomaly-detection pipeline
//!
//! Each pipeline stage has its own error enum so callers can tell a
//! recoverable write failure apart from a data-quality problem or a missing
//! model bundle. [`TrainingError`] names the failure point of an offline
//! training run.

use std::path::PathBuf;

/// Errors raised by the sample store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database file or sample table does not exist, or holds no samples.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// An append failed and was rolled back.
    #[error("Store write failed: {0}")]
    Write(#[source] rusqlite::Error),

    /// A sample was rejected at the store boundary.
    #[error("Invalid sample: column '{column}' must be a finite value in [0, 100], got {value}")]
    InvalidSample { column: &'static str, value: f64 },

    /// The existing table does not match the expected sample layout.
    #[error("Schema mismatch in table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// The configured table name is not a plain SQL identifier.
    #[error("Invalid table name '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidTableName(String),

    /// A persisted row could not be decoded.
    #[error("Corrupt row {id}: {detail}")]
    CorruptRow { id: i64, detail: String },

    /// An underlying SQLite error outside the write path.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors raised while turning samples into a feature matrix.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PreprocessError {
    #[error("Cannot preprocess an empty batch")]
    EmptyBatch,

    /// Data-quality failure: the imputation mean of this feature is undefined.
    #[error("Data quality error: feature '{feature}' has no observed values in the batch")]
    NoObservedValues { feature: &'static str },
}

/// Errors raised while fitting the isolation forest.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DetectorError {
    #[error("Insufficient data: cannot fit a detector on an empty matrix")]
    InsufficientData,

    #[error("Contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),

    #[error("Number of estimators must be at least 1")]
    InvalidEstimators,
}

/// Errors raised while reading or writing the model bundle.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Model bundle not found at {0:?}")]
    Missing(PathBuf),

    #[error("Model bundle I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model bundle serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model bundle checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    #[error("Unsupported model bundle format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Model bundle feature order {found:?} does not match {expected:?}")]
    FeatureOrderMismatch {
        found: Vec<String>,
        expected: Vec<String>,
    },
}

/// Failure points of a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("Cannot load training samples: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error(transparent)]
    DataQuality(#[from] PreprocessError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error("Cannot persist model bundle: {0}")]
    Artifact(#[from] ArtifactError),
}

impl From<StoreError> for TrainingError {
    fn from(err: StoreError) -> Self {
        TrainingError::StoreUnavailable(err)
    }
}
