//! Model wrapper engines and their collaborators.
//!
//! Two training engines share one train / evaluate / test / persist
//! contract: [`IterativeWrapper`] runs epoch-based gradient training over a
//! [`SequenceModel`], [`BatchWrapper`] runs a single fit over an
//! [`Estimator`]. Metric suites, losses and persistence live alongside.

pub mod batch;
pub mod booster;
pub mod encoder;
pub mod estimator;
pub mod iterative;
pub mod loss;
pub mod metrics;
pub mod results;
pub mod task;

pub use batch::{BatchTrainConfig, BatchWrapper};
pub use booster::{GradientBooster, GradientBoosterConfig};
pub use encoder::{SequenceModel, SequenceOutput, TimestepMlp, TimestepMlpConfig};
pub use estimator::{Estimator, EstimatorCaps, LinearEstimator, LogisticEstimator};
pub use iterative::{IterativeTrainConfig, IterativeWrapper, TrainReport};
pub use loss::{CrossEntropyLoss, Loss, SquaredErrorLoss};
pub use metrics::{
    batch_suite, iterative_suite, Accuracy, AveragePrecision, BalancedAccuracy, CalibrationCurve,
    LabelTransform, MeanAbsoluteError, Metric, MetricSuite, OutputTransform, PrCurve, RocAuc,
    RocCurve,
};
pub use results::{append_seed_record, write_metric_record, MetricRecord, ScalarStream};
pub use task::{MetricValue, TaskKind};

/// Per-class weight specification, resolved once per train/test call.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightSpec {
    /// No class weighting.
    Unweighted,
    /// Derive weights from the training-label balance.
    Balanced,
    /// Use this weight vector as-is.
    Explicit(Vec<f64>),
}

/// Optional label scaler collaborator: maps normalized values back to the
/// original label scale.
pub trait LabelScaler: Send + Sync {
    fn inverse(&self, value: f64) -> f64;
}

/// Affine label scaler, the common case for standardized regression targets.
#[derive(Debug, Clone, Copy)]
pub struct AffineLabelScaler {
    /// Mean of the original labels
    pub center: f64,
    /// Standard deviation of the original labels
    pub scale: f64,
}

impl LabelScaler for AffineLabelScaler {
    fn inverse(&self, value: f64) -> f64 {
        value * self.scale + self.center
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_scaler_inverse() {
        let scaler = AffineLabelScaler {
            center: 10.0,
            scale: 2.0,
        };
        assert_eq!(scaler.inverse(0.0), 10.0);
        assert_eq!(scaler.inverse(1.5), 13.0);
    }
}
