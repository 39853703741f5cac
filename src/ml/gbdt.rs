//! Gradient-boosted regression trees with squared loss.
//!
//! Split search runs over per-feature histograms: each feature is cut into
//! at most `n_bins` buckets once, before the first tree, and every node only
//! scans bucket boundaries. Row subsampling is driven by a seeded `StdRng`,
//! so a fit is a pure function of data and [`Hyperparameters`].

use crate::config::Hyperparameters;
use crate::error::{AppError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::{rngs::StdRng, seq::index, SeedableRng};
use serde::{Deserialize, Serialize};

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Children always sit after their parent, so a walk from the root
    /// terminates.
    fn check_structure(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(AppError::Validation("tree has no nodes".to_string()));
        }
        for (id, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf(value) if !value.is_finite() => {
                    return Err(AppError::Validation(format!(
                        "leaf {} holds non-finite value {}",
                        id, value
                    )));
                }
                Node::Leaf(_) => {}
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let children_valid = [left, right]
                        .iter()
                        .all(|&child| child > id && child < self.nodes.len());
                    if feature >= n_features || threshold.is_nan() || !children_valid {
                        return Err(AppError::Validation(format!(
                            "split node {} is malformed (feature {}, children {} and {})",
                            id, feature, left, right
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        let mut current = 0;
        loop {
            match self.nodes[current] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    current = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Feature matrix discretised into histogram buckets.
struct BinnedFeatures {
    /// bins[feature][row]
    bins: Vec<Vec<u16>>,
    /// Upper bucket edges per feature; bucket `b` holds `x <= thresholds[b]`
    thresholds: Vec<Vec<f64>>,
}

impl BinnedFeatures {
    fn new(x: &Array2<f64>, n_bins: usize) -> Self {
        let mut bins = Vec::with_capacity(x.ncols());
        let mut thresholds = Vec::with_capacity(x.ncols());

        for column in x.columns() {
            let mut unique: Vec<f64> = column.iter().copied().collect();
            unique.sort_by(f64::total_cmp);
            unique.dedup();

            let cuts: Vec<f64> = if unique.len() <= n_bins {
                unique[..unique.len().saturating_sub(1)].to_vec()
            } else {
                let mut cuts: Vec<f64> = (1..n_bins)
                    .map(|i| unique[i * unique.len() / n_bins - 1])
                    .collect();
                cuts.dedup();
                cuts
            };

            bins.push(
                column
                    .iter()
                    .map(|&v| cuts.partition_point(|t| *t < v) as u16)
                    .collect(),
            );
            thresholds.push(cuts);
        }

        Self { bins, thresholds }
    }

    fn bucket_count(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }
}

struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

struct TreeBuilder<'a> {
    binned: &'a BinnedFeatures,
    residuals: &'a [f64],
    max_depth: usize,
    min_samples_leaf: usize,
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

impl TreeBuilder<'_> {
    fn build(mut self, rows: Vec<usize>) -> (RegressionTree, Vec<f64>) {
        self.grow(rows, 0);
        (RegressionTree { nodes: self.nodes }, self.gains)
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        let sum: f64 = rows.iter().map(|&r| self.residuals[r]).sum();
        let mean = sum / rows.len().max(1) as f64;
        self.nodes.push(Node::Leaf(mean));

        if depth >= self.max_depth || rows.len() < 2 * self.min_samples_leaf {
            return id;
        }

        let Some(split) = self.best_split(&rows, sum) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| (self.binned.bins[split.feature][r] as usize) <= split.bin);

        self.gains[split.feature] += split.gain;
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: self.binned.thresholds[split.feature][split.bin],
            left,
            right,
        };
        id
    }

    fn best_split(&self, rows: &[usize], total: f64) -> Option<SplitCandidate> {
        let n = rows.len() as f64;
        let parent_score = total * total / n;
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..self.binned.bins.len() {
            let buckets = self.binned.bucket_count(feature);
            if buckets < 2 {
                continue;
            }

            let mut sums = vec![0.0; buckets];
            let mut counts = vec![0usize; buckets];
            for &r in rows {
                let b = self.binned.bins[feature][r] as usize;
                sums[b] += self.residuals[r];
                counts[b] += 1;
            }

            let mut left_sum = 0.0;
            let mut left_count = 0usize;
            for bin in 0..buckets - 1 {
                left_sum += sums[bin];
                left_count += counts[bin];
                let right_count = rows.len() - left_count;
                if left_count < self.min_samples_leaf {
                    continue;
                }
                if right_count < self.min_samples_leaf {
                    break;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_count as f64
                    + right_sum * right_sum / right_count as f64
                    - parent_score;

                let improves = match &best {
                    Some(current) => gain > current.gain + MIN_GAIN,
                    None => gain > MIN_GAIN,
                };
                if improves {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }

        best
    }
}

/// A fitted ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    feature_gains: Vec<f64>,
}

impl GradientBoostedRegressor {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &Hyperparameters) -> Result<Self> {
        params.validate().map_err(AppError::Validation)?;
        if x.nrows() != y.len() {
            return Err(AppError::Validation(format!(
                "feature matrix has {} rows but {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() < 2 * params.min_samples_leaf {
            return Err(AppError::InsufficientData(format!(
                "{} training rows, need at least {}",
                x.nrows(),
                2 * params.min_samples_leaf
            )));
        }
        if x.ncols() == 0 {
            return Err(AppError::Validation("feature matrix has no columns".to_string()));
        }

        let n = x.nrows();
        let binned = BinnedFeatures::new(x, params.n_bins);
        let base_score = y.mean().unwrap_or(0.0);
        let mut predictions = vec![base_score; n];
        let mut residuals = vec![0.0; n];
        let mut feature_gains = vec![0.0; x.ncols()];
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = ((n as f64 * params.subsample).ceil() as usize).clamp(1, n);

        for _ in 0..params.n_trees {
            for i in 0..n {
                residuals[i] = y[i] - predictions[i];
            }

            let rows: Vec<usize> = if sample_size == n {
                (0..n).collect()
            } else {
                let mut rows = index::sample(&mut rng, n, sample_size).into_vec();
                rows.sort_unstable();
                rows
            };

            let builder = TreeBuilder {
                binned: &binned,
                residuals: &residuals,
                max_depth: params.max_depth,
                min_samples_leaf: params.min_samples_leaf,
                nodes: Vec::new(),
                gains: vec![0.0; x.ncols()],
            };
            let (tree, gains) = builder.build(rows);

            for (total, gain) in feature_gains.iter_mut().zip(gains) {
                *total += gain;
            }
            for (i, row) in x.rows().into_iter().enumerate() {
                predictions[i] += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        tracing::debug!(
            trees = trees.len(),
            rows = n,
            features = x.ncols(),
            "Fitted gradient boosted ensemble"
        );

        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            trees,
            feature_gains,
        })
    }

    /// Raw, unclamped prediction for one feature row.
    pub fn predict(&self, row: ArrayView1<f64>) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| self.learning_rate * tree.predict(row))
                .sum::<f64>()
    }

    pub fn predict_batch(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict(row)).collect()
    }

    /// Verify a deserialized ensemble can be evaluated on rows of
    /// `n_features` values without indexing out of bounds.
    pub fn check_structure(&self, n_features: usize) -> Result<()> {
        if self.feature_gains.len() != n_features {
            return Err(AppError::Validation(format!(
                "ensemble was fitted on {} features, expected {}",
                self.feature_gains.len(),
                n_features
            )));
        }
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err(AppError::Validation(
                "ensemble has non-finite base score or learning rate".to_string(),
            ));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.check_structure(n_features))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Split gain per feature, normalised to sum to 1 (all zero when no
    /// tree ever split).
    pub fn feature_importance(&self) -> Vec<f64> {
        let total: f64 = self.feature_gains.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.feature_gains.len()];
        }
        self.feature_gains.iter().map(|g| g / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params() -> Hyperparameters {
        Hyperparameters {
            n_trees: 50,
            learning_rate: 0.2,
            max_depth: 3,
            min_samples_leaf: 2,
            subsample: 1.0,
            n_bins: 16,
            validation_fraction: 0.0,
            seed: 7,
        }
    }

    #[test]
    fn test_learns_step_function() {
        // y depends only on the first feature
        let n = 40;
        let mut x = Array2::zeros((n, 2));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            x[[i, 0]] = i as f64;
            x[[i, 1]] = (i % 7) as f64;
            y[i] = if i < 20 { 1.0 } else { 4.0 };
        }

        let model = GradientBoostedRegressor::fit(&x, &y, &params()).unwrap();
        assert!((model.predict(array![5.0, 0.0].view()) - 1.0).abs() < 0.1);
        assert!((model.predict(array![35.0, 3.0].view()) - 4.0).abs() < 0.1);

        let importance = model.feature_importance();
        assert!(importance[0] > 0.9);
        assert!((importance.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let x = Array2::from_shape_fn((20, 3), |(i, j)| (i * (j + 1)) as f64);
        let y = Array1::from_elem(20, 2.5);
        let model = GradientBoostedRegressor::fit(&x, &y, &params()).unwrap();
        let predictions = model.predict_batch(&x);
        assert!(predictions.iter().all(|p| (p - 2.5).abs() < 1e-12));
        assert!(model.feature_importance().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_fit_is_deterministic_with_subsampling() {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| ((i * 13 + j * 7) % 17) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0] * 0.5 - r[1]).collect();
        let mut p = params();
        p.subsample = 0.7;

        let a = GradientBoostedRegressor::fit(&x, &y, &p).unwrap();
        let b = GradientBoostedRegressor::fit(&x, &y, &p).unwrap();
        assert_eq!(a.predict_batch(&x), b.predict_batch(&x));
        assert_eq!(a.n_trees(), 50);
    }

    #[test]
    fn test_rejects_bad_input() {
        let x = Array2::zeros((3, 2));
        let y = Array1::zeros(3);
        assert!(matches!(
            GradientBoostedRegressor::fit(&x, &y, &params()),
            Err(AppError::InsufficientData(_))
        ));

        let x = Array2::zeros((10, 2));
        let y = Array1::zeros(9);
        assert!(matches!(
            GradientBoostedRegressor::fit(&x, &y, &params()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_serialized_ensemble_predicts_identically() {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| ((i * 13 + j * 7) % 17) as f64 * 0.37);
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0] * 0.5 - r[1]).collect();
        let model = GradientBoostedRegressor::fit(&x, &y, &params()).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedRegressor = serde_json::from_str(&json).unwrap();
        assert!(restored.check_structure(2).is_ok());
        assert_eq!(restored.predict_batch(&x), model.predict_batch(&x));
        assert_eq!(restored.feature_importance(), model.feature_importance());
    }

    #[test]
    fn test_check_structure_rejects_malformed_trees() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| (i * (j + 1)) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0]).collect();
        let model = GradientBoostedRegressor::fit(&x, &y, &params()).unwrap();
        assert!(matches!(model.check_structure(3), Err(AppError::Validation(_))));

        let mut cyclic = model.clone();
        cyclic.trees[0] = RegressionTree {
            nodes: vec![Node::Split {
                feature: 0,
                threshold: 1.0,
                left: 0,
                right: 0,
            }],
        };
        assert!(matches!(cyclic.check_structure(2), Err(AppError::Validation(_))));

        let mut out_of_range = model.clone();
        out_of_range.trees[0] = RegressionTree {
            nodes: vec![
                Node::Split {
                    feature: 5,
                    threshold: 1.0,
                    left: 1,
                    right: 2,
                },
                Node::Leaf(0.0),
                Node::Leaf(1.0),
            ],
        };
        assert!(out_of_range.check_structure(2).is_err());

        let mut empty = model;
        empty.trees[0] = RegressionTree { nodes: Vec::new() };
        assert!(empty.check_structure(2).is_err());
    }

    #[test]
    fn test_binning_respects_bucket_limit() {
        let x = Array2::from_shape_fn((100, 1), |(i, _)| i as f64);
        let binned = BinnedFeatures::new(&x, 8);
        assert!(binned.bucket_count(0) <= 8);
        // bucket edges are consistent with the raw comparison used at predict time
        for (i, &b) in binned.bins[0].iter().enumerate() {
            let b = b as usize;
            if b < binned.thresholds[0].len() {
                assert!(i as f64 <= binned.thresholds[0][b]);
            }
            if b > 0 {
                assert!(i as f64 > binned.thresholds[0][b - 1]);
            }
        }
    }
}
