//! Native gradient boosting for binary outcomes.
//!
//! Depth-limited regression trees fit to logistic residuals, with an
//! optional held-out evaluation set driving early stopping during the fit,
//! the tree-boosting-style capability the batch engine probes for.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VitalError};

/// Gradient booster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosterConfig {
    /// Number of boosting rounds (trees)
    pub n_rounds: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio per tree
    pub subsample: f64,
    /// Random seed for subsampling
    pub seed: u64,
    /// Parallel split search across features
    pub parallel: bool,
}

impl Default for GradientBoosterConfig {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, sample: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }
}

struct FeatureSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Best variance-reduction split of `indices` along one feature.
fn best_split_for_feature(
    x: &Array2<f64>,
    residuals: &Array1<f64>,
    indices: &[usize],
    feature: usize,
    min_samples_leaf: usize,
) -> Option<FeatureSplit> {
    let mut sorted: Vec<(f64, f64)> = indices
        .iter()
        .map(|&i| (x[[i, feature]], residuals[i]))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = sorted.len();
    let total_sum: f64 = sorted.iter().map(|&(_, r)| r).sum();
    let total_sq: f64 = sorted.iter().map(|&(_, r)| r * r).sum();
    let base_sse = total_sq - total_sum * total_sum / n as f64;

    let mut left_sum = 0.0;
    let mut left_sq = 0.0;
    let mut best: Option<FeatureSplit> = None;

    for i in 0..n - 1 {
        left_sum += sorted[i].1;
        left_sq += sorted[i].1 * sorted[i].1;

        let left_n = i + 1;
        let right_n = n - left_n;
        if left_n < min_samples_leaf || right_n < min_samples_leaf {
            continue;
        }
        if sorted[i].0 == sorted[i + 1].0 {
            continue;
        }

        let right_sum = total_sum - left_sum;
        let right_sq = total_sq - left_sq;
        let left_sse = left_sq - left_sum * left_sum / left_n as f64;
        let right_sse = right_sq - right_sum * right_sum / right_n as f64;
        let gain = base_sse - left_sse - right_sse;

        if gain > best.as_ref().map(|b| b.gain).unwrap_or(0.0) {
            best = Some(FeatureSplit {
                feature,
                threshold: (sorted[i].0 + sorted[i + 1].0) / 2.0,
                gain,
            });
        }
    }
    best
}

fn build_tree(
    x: &Array2<f64>,
    residuals: &Array1<f64>,
    indices: &[usize],
    depth: usize,
    config: &GradientBoosterConfig,
) -> TreeNode {
    let mean = indices.iter().map(|&i| residuals[i]).sum::<f64>() / indices.len() as f64;

    if depth >= config.max_depth || indices.len() < config.min_samples_leaf * 2 {
        return TreeNode::Leaf { value: mean };
    }

    let n_features = x.ncols();
    let candidates: Vec<FeatureSplit> = if config.parallel {
        (0..n_features)
            .into_par_iter()
            .filter_map(|f| best_split_for_feature(x, residuals, indices, f, config.min_samples_leaf))
            .collect()
    } else {
        (0..n_features)
            .filter_map(|f| best_split_for_feature(x, residuals, indices, f, config.min_samples_leaf))
            .collect()
    };

    let Some(best) = candidates
        .into_iter()
        .max_by(|a, b| a.gain.total_cmp(&b.gain))
    else {
        return TreeNode::Leaf { value: mean };
    };

    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[[i, best.feature]] <= best.threshold);

    if left_indices.is_empty() || right_indices.is_empty() {
        return TreeNode::Leaf { value: mean };
    }

    TreeNode::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(build_tree(x, residuals, &left_indices, depth + 1, config)),
        right: Box::new(build_tree(x, residuals, &right_indices, depth + 1, config)),
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn log_loss(labels: &Array1<f64>, probs: &Array1<f64>) -> f64 {
    let n = labels.len() as f64;
    labels
        .iter()
        .zip(probs.iter())
        .map(|(&y, &p)| {
            let p = p.clamp(1e-12, 1.0 - 1e-12);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n
}

/// Binary-logistic gradient boosted trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBooster {
    config: GradientBoosterConfig,
    trees: Vec<TreeNode>,
    initial_log_odds: f64,
    best_round: Option<usize>,
    best_score: Option<f64>,
    is_fitted: bool,
}

impl GradientBooster {
    pub fn new(config: GradientBoosterConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_log_odds: 0.0,
            best_round: None,
            best_score: None,
            is_fitted: false,
        }
    }

    pub fn config(&self) -> &GradientBoosterConfig {
        &self.config
    }

    /// Enable or disable parallel split search.
    pub fn set_parallel(&mut self, parallel: bool) {
        self.config.parallel = parallel;
    }

    /// Best validation loss tracked during an eval-set fit.
    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    /// Fit on the full training set, no early stopping.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_inner(x, y, None, usize::MAX, self.config.seed)?;
        Ok(())
    }

    /// Fit with a held-out evaluation set: stop once validation log-loss has
    /// not improved for `patience` rounds, keep the trees of the best round,
    /// and return the best validation loss.
    pub fn fit_with_eval(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_eval: &Array2<f64>,
        y_eval: &Array1<f64>,
        patience: usize,
        seed: u64,
    ) -> Result<f64> {
        self.fit_inner(x, y, Some((x_eval, y_eval)), patience, seed)?;
        self.best_score.ok_or_else(|| {
            VitalError::TrainingError("eval-set fit produced no validation score".to_string())
        })
    }

    fn fit_inner(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        eval: Option<(&Array2<f64>, &Array1<f64>)>,
        patience: usize,
        seed: u64,
    ) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 || n_samples != y.len() {
            return Err(VitalError::ShapeError {
                expected: format!("{n_samples} labels for {n_samples} rows"),
                actual: format!("{}", y.len()),
            });
        }

        self.trees.clear();
        self.best_round = None;
        self.best_score = None;

        let p = y.mean().unwrap_or(0.5).clamp(1e-10, 1.0 - 1e-10);
        self.initial_log_odds = (p / (1.0 - p)).ln();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);
        let mut eval_log_odds =
            eval.map(|(xe, _)| Array1::from_elem(xe.nrows(), self.initial_log_odds));

        let mut best_loss = f64::INFINITY;
        let mut best_round = 0usize;

        for round in 0..self.config.n_rounds {
            let probs: Array1<f64> = log_odds.mapv(sigmoid);
            let residuals: Array1<f64> = y
                .iter()
                .zip(probs.iter())
                .map(|(yi, pi)| yi - pi)
                .collect();

            let indices = self.subsample_indices(n_samples, &mut rng);
            let tree = build_tree(x, &residuals, &indices, 0, &self.config);

            for i in 0..n_samples {
                let row: Vec<f64> = x.row(i).to_vec();
                log_odds[i] += self.config.learning_rate * tree.predict(&row);
            }

            if let (Some((x_eval, y_eval)), Some(eval_odds)) = (eval, eval_log_odds.as_mut()) {
                for i in 0..x_eval.nrows() {
                    let row: Vec<f64> = x_eval.row(i).to_vec();
                    eval_odds[i] += self.config.learning_rate * tree.predict(&row);
                }
                self.trees.push(tree);

                let eval_probs: Array1<f64> = eval_odds.mapv(sigmoid);
                let loss = log_loss(y_eval, &eval_probs);
                if loss < best_loss {
                    best_loss = loss;
                    best_round = round;
                }
                debug!(round, loss, best_loss, "boosting round evaluated");
                if round - best_round >= patience {
                    break;
                }
            } else {
                self.trees.push(tree);
            }
        }

        if eval.is_some() {
            // Keep only the trees of the best round
            self.trees.truncate(best_round + 1);
            self.best_round = Some(best_round);
            self.best_score = Some(best_loss);
        }

        self.is_fitted = true;
        Ok(())
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let sample_size = ((n as f64) * self.config.subsample).ceil() as usize;
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(sample_size.max(1));
        indices.sort_unstable();
        indices
    }

    /// Positive-class probability for each row (the booster's direct
    /// prediction output).
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(VitalError::ModelNotFitted);
        }
        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for tree in &self.trees {
            for i in 0..x.nrows() {
                let row: Vec<f64> = x.row(i).to_vec();
                log_odds[i] += self.config.learning_rate * tree.predict(&row);
            }
        }
        Ok(log_odds.mapv(sigmoid))
    }

    /// Two-column class probability matrix.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let pos = self.predict(x)?;
        let mut proba = Array2::zeros((pos.len(), 2));
        for (i, &p) in pos.iter().enumerate() {
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = p;
        }
        Ok(proba)
    }

    /// Number of trees kept after fitting.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
