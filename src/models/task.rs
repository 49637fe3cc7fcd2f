//! Task-kind inference and metric value encoding.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Inferred nature of the prediction target, driving metric-set selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Exactly two distinct label values.
    Binary,
    /// Integer-valued labels with more than two classes.
    MultiClass,
    /// Continuous regression target.
    Continuous,
}

impl TaskKind {
    /// Classify a label sample.
    ///
    /// Exactly two unique values is binary; otherwise integrality of the
    /// first ten labels decides multiclass vs continuous (only a prefix is
    /// inspected, matching the reference behavior).
    pub fn from_labels(labels: ArrayView1<f64>) -> TaskKind {
        let mut unique: Vec<f64> = labels.iter().copied().collect();
        unique.sort_by(|a, b| a.total_cmp(b));
        unique.dedup_by(|a, b| *a == *b);

        if unique.len() == 2 {
            TaskKind::Binary
        } else if labels.iter().take(10).all(|v| v.fract() == 0.0) {
            TaskKind::MultiClass
        } else {
            TaskKind::Continuous
        }
    }

    /// Classify from a model's output width. The width-1 ⇒ regression and
    /// width-2 ⇒ binary boundaries are preserved exactly as observed;
    /// multi-output regression is unsupported.
    pub fn from_output_width(width: usize) -> TaskKind {
        match width {
            1 => TaskKind::Continuous,
            2 => TaskKind::Binary,
            _ => TaskKind::MultiClass,
        }
    }
}

/// Computed metric value: a plain scalar, or a paired-sequence curve
/// (ROC, precision-recall, calibration).
///
/// Serializes scalars as bare numbers and curves as structured `{x, y}`
/// objects, so curve-shaped results survive persistence instead of being
/// dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    Curve { x: Vec<f64>, y: Vec<f64> },
}

impl MetricValue {
    /// The scalar payload, if this value is scalar-shaped.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::Curve { .. } => None,
        }
    }
}
