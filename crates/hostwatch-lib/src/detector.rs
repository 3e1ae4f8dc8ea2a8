//! Isolation forest anomaly detector
//!
//! Anomalies are easier to isolate than normal points, so random
//! partitioning reaches them in fewer splits. Each tree is grown on a random
//! subsample of the training matrix; a row's anomaly score is derived from
//! its average path length across trees, normalized by the expected path
//! length of an unsuccessful search in a binary search tree.
//!
//! Training is fully deterministic for a given seed: every tree draws from
//! its own RNG seeded from the master seed and the tree index, so trees do
//! not depend on the order in which they are built.

use crate::error::DetectorError;
use crate::models::{AnomalyLabel, FeatureVector, NUM_FEATURES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Euler–Mascheroni constant used by the harmonic number approximation
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Default per-tree subsample size
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Score assigned when no path length normalization is possible
const NEUTRAL_SCORE: f64 = 0.5;

/// Training parameters of the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Expected fraction of anomalies in the training data, in (0, 0.5]
    pub contamination: f64,
    /// Number of isolation trees
    pub n_estimators: usize,
    /// Upper bound on rows drawn for each tree
    pub max_samples: usize,
    pub random_seed: u64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            n_estimators: 100,
            max_samples: DEFAULT_MAX_SAMPLES,
            random_seed: 42,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(DetectorError::InvalidContamination(self.contamination));
        }
        if self.n_estimators == 0 {
            return Err(DetectorError::InvalidEstimators);
        }
        Ok(())
    }
}

/// Fitted isolation forest with its decision threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Rows used to grow each tree
    sample_size: usize,
    /// Scores strictly above this value are labeled anomalous
    threshold: f64,
    contamination: f64,
}

impl IsolationForest {
    /// Grow the forest on a standardized matrix and derive the threshold
    /// from the training scores.
    pub fn fit(matrix: &[FeatureVector], params: &DetectorParams) -> Result<Self, DetectorError> {
        params.validate()?;
        if matrix.is_empty() {
            return Err(DetectorError::InsufficientData);
        }

        let sample_size = params.max_samples.clamp(1, matrix.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..params.n_estimators)
            .map(|idx| {
                let mut rng = StdRng::seed_from_u64(tree_seed(params.random_seed, idx));
                let rows: Vec<FeatureVector> =
                    rand::seq::index::sample(&mut rng, matrix.len(), sample_size)
                        .iter()
                        .map(|i| matrix[i])
                        .collect();
                IsolationTree::build(&rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            threshold: NEUTRAL_SCORE,
            contamination: params.contamination,
        };

        let training_scores = forest.score_samples(matrix);
        forest.threshold = percentile(&training_scores, 100.0 * (1.0 - params.contamination));

        Ok(forest)
    }

    /// Anomaly score in (0, 1]; near 1 is anomalous, around 0.5 is normal
    pub fn score(&self, row: &FeatureVector) -> f64 {
        let normalizer = average_path_length(self.sample_size);
        if self.trees.is_empty() || normalizer == 0.0 {
            return NEUTRAL_SCORE;
        }

        let total: f64 = self.trees.iter().map(|tree| tree.path_length(row)).sum();
        let avg_path = total / self.trees.len() as f64;

        2.0_f64.powf(-avg_path / normalizer)
    }

    pub fn score_samples(&self, matrix: &[FeatureVector]) -> Vec<f64> {
        matrix.iter().map(|row| self.score(row)).collect()
    }

    /// Label each row; only scores above the threshold are anomalies
    pub fn predict(&self, matrix: &[FeatureVector]) -> Vec<AnomalyLabel> {
        matrix
            .iter()
            .map(|row| {
                if self.score(row) > self.threshold {
                    AnomalyLabel::Anomaly
                } else {
                    AnomalyLabel::Normal
                }
            })
            .collect()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

/// Expected path length c(n) of an unsuccessful BST search over n points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Derive an independent seed for one tree
fn tree_seed(seed: u64, tree_idx: usize) -> u64 {
    seed ^ (tree_idx as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Linear-interpolated percentile (0..=100)
fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return NEUTRAL_SCORE;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// A single isolation tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    fn build<R: Rng>(rows: &[FeatureVector], max_depth: usize, rng: &mut R) -> Self {
        Self {
            root: Self::build_node(rows, 0, max_depth, rng),
        }
    }

    fn build_node<R: Rng>(
        rows: &[FeatureVector],
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> IsolationNode {
        if depth >= max_depth || rows.len() <= 1 {
            return IsolationNode::Leaf { size: rows.len() };
        }

        // Only features that still vary in this partition can isolate points
        let splittable: Vec<(usize, f64, f64)> = (0..NUM_FEATURES)
            .filter_map(|idx| {
                let (lo, hi) = rows.iter().fold((f64::MAX, f64::MIN), |(lo, hi), row| {
                    (lo.min(row[idx]), hi.max(row[idx]))
                });
                (hi > lo).then_some((idx, lo, hi))
            })
            .collect();
        if splittable.is_empty() {
            return IsolationNode::Leaf { size: rows.len() };
        }

        let (feature_idx, min_val, max_val) = splittable[rng.random_range(0..splittable.len())];

        // split in [min, max) keeps both sides non-empty with `<=` routing
        let split_value = rng.random_range(min_val..max_val);
        let (left_rows, right_rows): (Vec<FeatureVector>, Vec<FeatureVector>) =
            rows.iter().partition(|row| row[feature_idx] <= split_value);

        IsolationNode::Internal {
            feature_idx,
            split_value,
            left: Box::new(Self::build_node(&left_rows, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_node(&right_rows, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, row: &FeatureVector) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => {
                    // Unresolved points in a leaf add their expected remaining depth
                    return depth as f64 + average_path_length(*size);
                }
                IsolationNode::Internal {
                    feature_idx,
                    split_value,
                    left,
                    right,
                } => {
                    node = if row[*feature_idx] <= *split_value {
                        &**left
                    } else {
                        &**right
                    };
                    depth += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum IsolationNode {
    Internal {
        feature_idx: usize,
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}
