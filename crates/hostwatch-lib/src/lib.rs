//! Host metrics anomaly detection library
//!
//! This crate provides the core functionality for:
//! - Periodic sampling of CPU, memory and disk utilization
//! - Append-only sample storage in SQLite
//! - Mean imputation and standardization of samples
//! - Isolation forest training and batch scoring
//! - Health checks and observability

pub mod artifact;
pub mod collector;
pub mod config;
pub mod detector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod preprocess;
pub mod scoring;
pub mod store;
pub mod training;

pub use artifact::{FeatureSummary, ModelBundle, ModelSummary};
pub use config::HostwatchConfig;
pub use detector::{DetectorParams, IsolationForest};
pub use error::{ArtifactError, DetectorError, PreprocessError, StoreError, TrainingError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{HostwatchMetrics, StructuredLogger};
pub use preprocess::{FeaturePipeline, Scaler};
pub use scoring::{BatchSummary, Scorer};
pub use store::{MemorySampleStore, SampleStore, SqliteSampleStore};
pub use training::{train, train_and_persist, TrainingConfig, TrainingOutcome};
