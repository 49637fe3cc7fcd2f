//! Loss collaborators for the iterative engine.
//!
//! A loss produces both the scalar value and its gradient with respect to
//! the (already masked and flattened) predictions, so the wrapper can hand
//! the gradient back to the model for the parameter update.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{Result, VitalError};

/// Loss over flattened predictions (`n x width`) and labels (`n`).
///
/// For classification losses the labels hold integer class indices (as
/// floats) and `class_weights` scales each sample by its class weight. For
/// regression losses the labels are plain float targets and the weights are
/// ignored.
pub trait Loss: Send {
    fn name(&self) -> &'static str;

    fn loss_and_grad(
        &self,
        preds: ArrayView2<f64>,
        labels: ArrayView1<f64>,
        class_weights: Option<&[f64]>,
    ) -> Result<(f64, Array2<f64>)>;
}

/// Softmax cross-entropy with optional per-class weights; labels are cast to
/// integer class indices.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub fn new() -> Self {
        Self
    }
}

impl Loss for CrossEntropyLoss {
    fn name(&self) -> &'static str {
        "cross_entropy"
    }

    fn loss_and_grad(
        &self,
        preds: ArrayView2<f64>,
        labels: ArrayView1<f64>,
        class_weights: Option<&[f64]>,
    ) -> Result<(f64, Array2<f64>)> {
        let (n, width) = preds.dim();
        if labels.len() != n {
            return Err(VitalError::ShapeError {
                expected: format!("{n} labels"),
                actual: format!("{}", labels.len()),
            });
        }

        let mut grad = Array2::zeros((n, width));
        let mut loss_sum = 0.0;
        let mut weight_sum = 0.0;

        for i in 0..n {
            let class = labels[i] as usize;
            if class >= width {
                return Err(VitalError::TrainingError(format!(
                    "class index {class} out of range for output width {width}"
                )));
            }
            let weight = class_weights
                .map(|w| w.get(class).copied().unwrap_or(1.0))
                .unwrap_or(1.0);

            // Row-wise log-softmax, shifted for stability
            let row = preds.row(i);
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exp_sum: f64 = row.iter().map(|&v| (v - max).exp()).sum();
            let log_sum = exp_sum.ln() + max;

            loss_sum += weight * (log_sum - row[class]);
            weight_sum += weight;

            for j in 0..width {
                let softmax = (row[j] - max).exp() / exp_sum;
                let indicator = if j == class { 1.0 } else { 0.0 };
                grad[[i, j]] = weight * (softmax - indicator);
            }
        }

        if weight_sum == 0.0 {
            return Err(VitalError::TrainingError(
                "cross-entropy over zero total weight".to_string(),
            ));
        }
        grad.mapv_inplace(|v| v / weight_sum);
        Ok((loss_sum / weight_sum, grad))
    }
}

/// Mean squared error over a width-1 prediction column; labels are treated
/// as float regression targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SquaredErrorLoss;

impl SquaredErrorLoss {
    pub fn new() -> Self {
        Self
    }
}

impl Loss for SquaredErrorLoss {
    fn name(&self) -> &'static str {
        "squared_error"
    }

    fn loss_and_grad(
        &self,
        preds: ArrayView2<f64>,
        labels: ArrayView1<f64>,
        _class_weights: Option<&[f64]>,
    ) -> Result<(f64, Array2<f64>)> {
        let (n, width) = preds.dim();
        if width != 1 {
            return Err(VitalError::ShapeError {
                expected: "predictions of width 1".to_string(),
                actual: format!("width {width}"),
            });
        }
        if labels.len() != n {
            return Err(VitalError::ShapeError {
                expected: format!("{n} labels"),
                actual: format!("{}", labels.len()),
            });
        }

        let mut grad = Array2::zeros((n, 1));
        let mut loss_sum = 0.0;
        for i in 0..n {
            let err = preds[[i, 0]] - labels[i];
            loss_sum += err * err;
            grad[[i, 0]] = 2.0 * err / n as f64;
        }
        Ok((loss_sum / n as f64, grad))
    }
}
