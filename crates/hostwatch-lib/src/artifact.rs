//! Model bundle persistence
//!
//! The fitted preprocessing pipeline and the isolation forest are stored
//! together as one versioned JSON file. The serialized bundle is wrapped in
//! an envelope carrying its SHA-256 checksum, which is verified on load.
//! Writes go to a temporary file that is synced and renamed over the target,
//! so readers see either the previous bundle or the new one.

use crate::detector::{DetectorParams, IsolationForest};
use crate::error::ArtifactError;
use crate::models::FEATURE_COLUMNS;
use crate::preprocess::FeaturePipeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current bundle format version
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Everything scoring needs, produced by one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    /// Number of samples in the training batch
    pub sample_count: usize,
    pub feature_columns: Vec<String>,
    pub params: DetectorParams,
    pub pipeline: FeaturePipeline,
    pub detector: IsolationForest,
}

/// On-disk envelope
#[derive(Debug, Serialize, Deserialize)]
struct BundleFile {
    format_version: u32,
    checksum: String,
    payload: String,
}

impl ModelBundle {
    pub fn new(
        pipeline: FeaturePipeline,
        detector: IsolationForest,
        params: DetectorParams,
        sample_count: usize,
    ) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            trained_at: Utc::now(),
            sample_count,
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            params,
            pipeline,
            detector,
        }
    }

    /// Write the bundle atomically, replacing any previous bundle.
    ///
    /// Returns the checksum of the stored payload.
    pub fn save(&self, path: &Path) -> Result<String, ArtifactError> {
        let payload = serde_json::to_string(self)?;
        let checksum = compute_checksum(payload.as_bytes());
        let file = BundleFile {
            format_version: self.format_version,
            checksum: checksum.clone(),
            payload,
        };
        let data = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let temp_path = temp_path(path);
        let mut temp = File::create(&temp_path).map_err(|e| io_error(&temp_path, e))?;
        temp.write_all(&data).map_err(|e| io_error(&temp_path, e))?;
        temp.sync_all().map_err(|e| io_error(&temp_path, e))?;
        drop(temp);

        fs::rename(&temp_path, path).map_err(|e| io_error(path, e))?;

        debug!(path = ?path, checksum = %checksum, "Model bundle written");
        Ok(checksum)
    }

    /// Read and verify a bundle
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        if !path.exists() {
            return Err(ArtifactError::Missing(path.to_path_buf()));
        }

        let data = fs::read(path).map_err(|e| io_error(path, e))?;
        let file: BundleFile = serde_json::from_slice(&data)?;

        if file.format_version != BUNDLE_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: file.format_version,
                supported: BUNDLE_FORMAT_VERSION,
            });
        }

        let computed = compute_checksum(file.payload.as_bytes());
        if computed != file.checksum {
            return Err(ArtifactError::ChecksumMismatch {
                expected: file.checksum,
                computed,
            });
        }

        let bundle: ModelBundle = serde_json::from_str(&file.payload)?;
        if bundle.feature_columns != FEATURE_COLUMNS {
            return Err(ArtifactError::FeatureOrderMismatch {
                found: bundle.feature_columns,
                expected: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            });
        }

        Ok(bundle)
    }
}

/// Serializable overview of a bundle, shown by the agent and the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub sample_count: usize,
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub random_seed: u64,
    pub threshold: f64,
    pub features: Vec<FeatureSummary>,
}

/// Preprocessing parameters of one feature column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub name: String,
    pub imputation_mean: f64,
    pub scaler_mean: f64,
    pub scaler_std: f64,
}

impl From<&ModelBundle> for ModelSummary {
    fn from(bundle: &ModelBundle) -> Self {
        let pipeline = &bundle.pipeline;
        let features = bundle
            .feature_columns
            .iter()
            .enumerate()
            .map(|(idx, name)| FeatureSummary {
                name: name.clone(),
                imputation_mean: pipeline.imputer.means[idx],
                scaler_mean: pipeline.scaler.mean[idx],
                scaler_std: pipeline.scaler.std[idx],
            })
            .collect();

        Self {
            format_version: bundle.format_version,
            trained_at: bundle.trained_at,
            sample_count: bundle.sample_count,
            contamination: bundle.detector.contamination(),
            n_estimators: bundle.detector.n_estimators(),
            max_samples: bundle.params.max_samples,
            random_seed: bundle.params.random_seed,
            threshold: bundle.detector.threshold(),
            features,
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;
    use tempfile::TempDir;

    fn trained_bundle() -> ModelBundle {
        let samples: Vec<Sample> = (0..20)
            .map(|i| Sample {
                id: i,
                timestamp: Utc::now(),
                cpu_percent: Some(10.0 + i as f64),
                memory_percent: if i % 4 == 0 { None } else { Some(40.0) },
                disk_percent: Some(70.0 - i as f64 / 2.0),
            })
            .collect();
        let params = DetectorParams {
            n_estimators: 10,
            ..DetectorParams::default()
        };
        let (pipeline, matrix) = FeaturePipeline::fit(&samples).unwrap();
        let detector = IsolationForest::fit(&matrix, &params).unwrap();
        ModelBundle::new(pipeline, detector, params, samples.len())
    }

    #[test]
    fn test_summary_lists_features_in_order() {
        let bundle = trained_bundle();

        let summary = ModelSummary::from(&bundle);

        assert_eq!(summary.sample_count, 20);
        assert_eq!(summary.n_estimators, 10);
        assert_eq!(summary.random_seed, 42);
        assert_eq!(summary.threshold, bundle.detector.threshold());
        let names: Vec<_> = summary.features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, FEATURE_COLUMNS);
        assert_eq!(summary.features[1].imputation_mean, 40.0);
        assert_eq!(summary.features[1].scaler_std, 0.0);
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"test data");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"test data"));
        assert_ne!(checksum, compute_checksum(b"other data"));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("models").join("bundle.json");
        let bundle = trained_bundle();

        bundle.save(&path).unwrap();
        let loaded = ModelBundle::load(&path).unwrap();

        assert_eq!(loaded, bundle);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_save_replaces_previous_bundle() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundle.json");

        let first = trained_bundle();
        first.save(&path).unwrap();
        let mut second = trained_bundle();
        second.sample_count = 99;
        second.save(&path).unwrap();

        assert_eq!(ModelBundle::load(&path).unwrap().sample_count, 99);
    }

    #[test]
    fn test_load_missing() {
        let temp_dir = TempDir::new().unwrap();
        let err = ModelBundle::load(&temp_dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, ArtifactError::Missing(_)));
    }

    #[test]
    fn test_load_detects_tampering() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundle.json");
        trained_bundle().save(&path).unwrap();

        let mut file: BundleFile = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        file.payload = file.payload.replacen("\"sample_count\":20", "\"sample_count\":21", 1);
        fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let err = ModelBundle::load(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundle.json");
        trained_bundle().save(&path).unwrap();

        let mut file: BundleFile = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        file.format_version = 7;
        fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let err = ModelBundle::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::UnsupportedVersion { found: 7, supported: 1 }
        ));
    }

    #[test]
    fn test_load_rejects_feature_order_change() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundle.json");
        let mut bundle = trained_bundle();
        bundle.feature_columns.swap(0, 1);
        bundle.save(&path).unwrap();

        let err = ModelBundle::load(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::FeatureOrderMismatch { .. }));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundle.json");
        fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            ModelBundle::load(&path).unwrap_err(),
            ArtifactError::Json(_)
        ));
    }
}
