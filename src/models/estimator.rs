//! Batch estimators and their capability descriptions.
//!
//! The batch engine is polymorphic over a small set of serializable model
//! variants (the same shape the training engine of the reference stack
//! uses), with capabilities resolved once at wrapper construction instead
//! of re-probed inside the training method.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VitalError};
use crate::models::booster::{GradientBooster, GradientBoosterConfig};

/// What an estimator supports, resolved once per wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatorCaps {
    /// Accepts a per-class weight vector before fitting.
    pub class_weight: bool,
    /// Accepts a held-out evaluation set with early stopping during fitting.
    pub eval_set_stopping: bool,
    /// Exposes class-probability output.
    pub predict_proba: bool,
}

/// Logistic regression fit by weighted gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticEstimator {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    /// L2 regularization strength
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    class_weights: Option<Vec<f64>>,
    is_fitted: bool,
}

impl LogisticEstimator {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            class_weights: None,
            is_fitted: false,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn set_class_weights(&mut self, weights: &[f64]) {
        self.class_weights = Some(weights.to_vec());
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(VitalError::ShapeError {
                expected: format!("{n_samples} labels"),
                actual: format!("{}", y.len()),
            });
        }

        // Per-sample weights from the class weight vector
        let sample_weights: Array1<f64> = y
            .iter()
            .map(|&label| {
                self.class_weights
                    .as_ref()
                    .and_then(|w| w.get(label as usize).copied())
                    .unwrap_or(1.0)
            })
            .collect();
        let weight_sum = sample_weights.sum();

        let mut weights = Array1::zeros(n_features);
        let mut bias = 0.0;

        for _iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            let errors = (&predictions - y) * &sample_weights;
            let dw = (x.t().dot(&errors) / weight_sum) + (self.alpha * &weights);
            let db = errors.sum() / weight_sum;

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - self.learning_rate * &dw;
            bias -= self.learning_rate * db;
        }

        self.coefficients = Some(weights);
        self.intercept = bias;
        self.is_fitted = true;
        Ok(())
    }

    /// Positive-class probability per row.
    pub fn predict_proba_positive(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or(VitalError::ModelNotFitted)?;
        let linear = x.dot(coefficients) + self.intercept;
        Ok(Self::sigmoid(&linear))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba_positive(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}

impl Default for LogisticEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear regression fit by gradient descent with L2 shrinkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearEstimator {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    /// L2 regularization strength
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    is_fitted: bool,
}

impl LinearEstimator {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 0.0001,
            max_iter: 2000,
            tol: 1e-8,
            learning_rate: 0.01,
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(VitalError::ShapeError {
                expected: format!("{n_samples} labels"),
                actual: format!("{}", y.len()),
            });
        }

        let mut weights = Array1::zeros(n_features);
        let mut bias = 0.0;

        for _iter in 0..self.max_iter {
            let predictions = x.dot(&weights) + bias;
            let errors = &predictions - y;
            let dw = (x.t().dot(&errors) / n_samples as f64) + (self.alpha * &weights);
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - self.learning_rate * &dw;
            bias -= self.learning_rate * db;
        }

        self.coefficients = Some(weights);
        self.intercept = bias;
        self.is_fitted = true;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or(VitalError::ModelNotFitted)?;
        Ok(x.dot(coefficients) + self.intercept)
    }
}

impl Default for LinearEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// The batch-trainable model variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    Booster(GradientBooster),
    Logistic(LogisticEstimator),
    Linear(LinearEstimator),
}

impl Estimator {
    /// Default boosting estimator.
    pub fn booster() -> Self {
        Estimator::Booster(GradientBooster::new(GradientBoosterConfig::default()))
    }

    /// Default logistic estimator.
    pub fn logistic() -> Self {
        Estimator::Logistic(LogisticEstimator::new())
    }

    /// Default linear estimator.
    pub fn linear() -> Self {
        Estimator::Linear(LinearEstimator::new())
    }

    /// Capability description, resolved once per wrapper.
    pub fn capabilities(&self) -> EstimatorCaps {
        match self {
            Estimator::Booster(_) => EstimatorCaps {
                class_weight: false,
                eval_set_stopping: true,
                predict_proba: true,
            },
            Estimator::Logistic(_) => EstimatorCaps {
                class_weight: true,
                eval_set_stopping: false,
                predict_proba: true,
            },
            Estimator::Linear(_) => EstimatorCaps {
                class_weight: false,
                eval_set_stopping: false,
                predict_proba: false,
            },
        }
    }

    /// Human-readable variant name.
    pub fn name(&self) -> &'static str {
        match self {
            Estimator::Booster(_) => "gradient_booster",
            Estimator::Logistic(_) => "logistic",
            Estimator::Linear(_) => "linear",
        }
    }

    pub fn set_class_weights(&mut self, weights: &[f64]) {
        if let Estimator::Logistic(model) = self {
            model.set_class_weights(weights);
        }
    }

    pub fn set_parallelism(&mut self, threads: usize) {
        if let Estimator::Booster(model) = self {
            model.set_parallel(threads > 1);
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Estimator::Booster(model) => model.fit(x, y),
            Estimator::Logistic(model) => model.fit(x, y),
            Estimator::Linear(model) => model.fit(x, y),
        }
    }

    /// Eval-set fit with early stopping; only valid when
    /// `capabilities().eval_set_stopping` is set.
    pub fn fit_with_eval(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_eval: &Array2<f64>,
        y_eval: &Array1<f64>,
        patience: usize,
        seed: u64,
    ) -> Result<f64> {
        match self {
            Estimator::Booster(model) => model.fit_with_eval(x, y, x_eval, y_eval, patience, seed),
            other => Err(VitalError::TrainingError(format!(
                "{} does not support eval-set fitting",
                other.name()
            ))),
        }
    }

    /// Direct prediction output: probabilities for the booster, class labels
    /// for the logistic model, scalar values for the linear model.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Estimator::Booster(model) => model.predict(x),
            Estimator::Logistic(model) => model.predict(x),
            Estimator::Linear(model) => model.predict(x),
        }
    }

    /// Class-probability matrix (`n x 2`); only valid when
    /// `capabilities().predict_proba` is set.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Estimator::Booster(model) => model.predict_proba(x),
            Estimator::Logistic(model) => {
                let pos = model.predict_proba_positive(x)?;
                let mut proba = Array2::zeros((pos.len(), 2));
                for (i, &p) in pos.iter().enumerate() {
                    proba[[i, 0]] = 1.0 - p;
                    proba[[i, 1]] = p;
                }
                Ok(proba)
            }
            Estimator::Linear(_) => Err(VitalError::TrainingError(
                "linear does not expose probability output".to_string(),
            )),
        }
    }
}
