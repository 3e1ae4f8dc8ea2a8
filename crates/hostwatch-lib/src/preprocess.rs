//! Feature preprocessing
//!
//! Turns stored samples into a dense, standardized feature matrix:
//! absent readings are replaced by the per-feature mean, then each feature
//! is standardized with the mean and population standard deviation of the
//! training batch. Both fitted transforms are kept so that scoring batches
//! are preprocessed exactly like the training batch, never refitted.

use crate::error::PreprocessError;
use crate::models::{FeatureVector, Sample, FEATURE_COLUMNS, NUM_FEATURES};
use serde::{Deserialize, Serialize};

/// Raw feature row with possibly absent readings
pub type RawFeatures = [Option<f64>; NUM_FEATURES];

/// Per-feature means used to fill absent readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    pub means: [f64; NUM_FEATURES],
}

impl Imputer {
    /// Compute the mean of the observed values of each feature.
    ///
    /// Fails when the batch is empty or a feature has no observed value.
    pub fn fit(rows: &[RawFeatures]) -> Result<Self, PreprocessError> {
        if rows.is_empty() {
            return Err(PreprocessError::EmptyBatch);
        }

        let mut means = [0.0; NUM_FEATURES];
        for (idx, mean) in means.iter_mut().enumerate() {
            let observed: Vec<f64> = rows.iter().filter_map(|row| row[idx]).collect();
            if observed.is_empty() {
                return Err(PreprocessError::NoObservedValues {
                    feature: FEATURE_COLUMNS[idx],
                });
            }
            *mean = observed.iter().sum::<f64>() / observed.len() as f64;
        }

        Ok(Self { means })
    }

    /// Fill absent readings of one row
    pub fn apply(&self, row: &RawFeatures) -> FeatureVector {
        let mut out = [0.0; NUM_FEATURES];
        for (idx, value) in out.iter_mut().enumerate() {
            *value = row[idx].unwrap_or(self.means[idx]);
        }
        out
    }
}

/// Impute a batch with its own per-feature means
pub fn impute(rows: &[RawFeatures]) -> Result<Vec<FeatureVector>, PreprocessError> {
    let imputer = Imputer::fit(rows)?;
    Ok(rows.iter().map(|row| imputer.apply(row)).collect())
}

/// Standardization transform fitted on the training matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: [f64; NUM_FEATURES],
    pub std: [f64; NUM_FEATURES],
}

impl Scaler {
    /// Fit per-feature mean and population standard deviation
    pub fn fit(matrix: &[FeatureVector]) -> Result<Self, PreprocessError> {
        if matrix.is_empty() {
            return Err(PreprocessError::EmptyBatch);
        }

        let n = matrix.len() as f64;
        let mut mean = [0.0; NUM_FEATURES];
        let mut std = [0.0; NUM_FEATURES];
        for idx in 0..NUM_FEATURES {
            let m = matrix.iter().map(|row| row[idx]).sum::<f64>() / n;
            let var = matrix.iter().map(|row| (row[idx] - m).powi(2)).sum::<f64>() / n;
            mean[idx] = m;
            std[idx] = var.sqrt();
        }

        Ok(Self { mean, std })
    }

    /// Standardize one row; constant training features map to 0
    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; NUM_FEATURES];
        for (idx, value) in out.iter_mut().enumerate() {
            *value = if self.std[idx] > 0.0 {
                (row[idx] - self.mean[idx]) / self.std[idx]
            } else {
                0.0
            };
        }
        out
    }

    pub fn transform_matrix(&self, matrix: &[FeatureVector]) -> Vec<FeatureVector> {
        matrix.iter().map(|row| self.transform(row)).collect()
    }
}

/// Fitted imputation and standardization, applied together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    pub imputer: Imputer,
    pub scaler: Scaler,
}

impl FeaturePipeline {
    /// Fit on a training batch and return the pipeline with the transformed matrix
    pub fn fit(samples: &[Sample]) -> Result<(Self, Vec<FeatureVector>), PreprocessError> {
        let rows = raw_rows(samples);
        let imputer = Imputer::fit(&rows)?;
        let imputed: Vec<FeatureVector> = rows.iter().map(|row| imputer.apply(row)).collect();
        let scaler = Scaler::fit(&imputed)?;
        let matrix = scaler.transform_matrix(&imputed);

        Ok((Self { imputer, scaler }, matrix))
    }

    /// Transform a scoring batch with the fitted parameters
    pub fn apply(&self, samples: &[Sample]) -> Result<Vec<FeatureVector>, PreprocessError> {
        if samples.is_empty() {
            return Err(PreprocessError::EmptyBatch);
        }
        Ok(samples
            .iter()
            .map(|s| self.scaler.transform(&self.imputer.apply(&s.features())))
            .collect())
    }
}

fn raw_rows(samples: &[Sample]) -> Vec<RawFeatures> {
    samples.iter().map(Sample::features).collect()
}
