//! Single-shot training engine for tabular estimators.
//!
//! One fit over the full training matrix, with metric-set selection driven
//! by the label values, capability-gated class weighting and eval-set early
//! stopping, and the same per-run / cross-run persistence contract as the
//! iterative engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use tracing::info;

use crate::data::TabularDataset;
use crate::device::ComputeTarget;
use crate::error::{Result, VitalError};
use crate::models::estimator::{Estimator, EstimatorCaps};
use crate::models::metrics::{batch_suite, MetricSuite};
use crate::models::results::{
    append_seed_record, scalar_entries, write_metric_record, MetricRecord,
};
use crate::models::task::{MetricValue, TaskKind};
use crate::models::{LabelScaler, WeightSpec};

/// Knobs for one training call.
#[derive(Debug, Clone)]
pub struct BatchTrainConfig {
    /// Early-stopping rounds passed to estimators that fit against an
    /// evaluation set
    pub patience: usize,
    /// Persist the fitted model on completion
    pub save_weights: bool,
}

impl Default for BatchTrainConfig {
    fn default() -> Self {
        Self {
            patience: 10,
            save_weights: true,
        }
    }
}

/// Single-shot trainer over a serializable estimator.
pub struct BatchWrapper {
    estimator: Estimator,
    caps: EstimatorCaps,
    target: ComputeTarget,
    log_dir: Option<PathBuf>,
    scaler: Option<Arc<dyn LabelScaler>>,
    /// Set when the model was reloaded from a raw booster serialization,
    /// which only exposes direct prediction output.
    raw_reload: bool,
    fit_calls: u64,
}

impl BatchWrapper {
    /// Wrap an estimator for training on the given compute target. Estimator
    /// capabilities are resolved here, once, and never re-probed.
    pub fn new(estimator: Estimator, target: ComputeTarget) -> Self {
        let caps = estimator.capabilities();
        let mut estimator = estimator;
        estimator.set_parallelism(target.threads());
        info!(
            ?target,
            estimator = estimator.name(),
            ?caps,
            "constructed batch wrapper"
        );
        Self {
            estimator,
            caps,
            target,
            log_dir: None,
            scaler: None,
            raw_reload: false,
            fit_calls: 0,
        }
    }

    pub fn set_log_dir(&mut self, dir: impl Into<PathBuf>) {
        self.log_dir = Some(dir.into());
    }

    pub fn set_label_scaler(&mut self, scaler: Arc<dyn LabelScaler>) {
        self.scaler = Some(scaler);
    }

    pub fn compute_target(&self) -> ComputeTarget {
        self.target
    }

    pub fn capabilities(&self) -> EstimatorCaps {
        self.caps
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    fn require_log_dir(&self) -> Result<PathBuf> {
        self.log_dir.clone().ok_or_else(|| {
            VitalError::TrainingError("log directory not set before training".to_string())
        })
    }

    fn shared_results_path(log_dir: &Path, file: &str) -> Result<PathBuf> {
        let parent = log_dir.parent().ok_or_else(|| {
            VitalError::TrainingError(format!(
                "log directory {} has no parent for shared results",
                log_dir.display()
            ))
        })?;
        Ok(parent.join(file))
    }

    /// The metric suite for the given label sample; rebuilt once per
    /// train/test call.
    pub fn metric_suite(&self, labels: &Array1<f64>) -> MetricSuite {
        let task = TaskKind::from_labels(labels.view());
        let has_proba = self.caps.predict_proba && !self.raw_reload;
        batch_suite(task, has_proba, self.scaler.clone())
    }

    fn resolve_weight(weight: &WeightSpec, labels: &Array1<f64>) -> Result<Option<Vec<f64>>> {
        match weight {
            WeightSpec::Unweighted => Ok(None),
            WeightSpec::Explicit(values) => Ok(Some(values.clone())),
            WeightSpec::Balanced => {
                let mut max_class = 0usize;
                for &label in labels {
                    if label < 0.0 || label.fract() != 0.0 {
                        return Err(VitalError::DataError(format!(
                            "balanced weights require non-negative integer labels, got {label}"
                        )));
                    }
                    max_class = max_class.max(label as usize);
                }
                let n_classes = max_class + 1;
                let mut counts = vec![0usize; n_classes];
                for &label in labels {
                    counts[label as usize] += 1;
                }
                let total = labels.len() as f64;
                Ok(Some(
                    counts
                        .iter()
                        .map(|&c| {
                            if c == 0 {
                                0.0
                            } else {
                                total / (n_classes as f64 * c as f64)
                            }
                        })
                        .collect(),
                ))
            }
        }
    }

    /// Predictions in the form the active metric suite expects: direct
    /// output for regression suites and raw-booster reloads, probability
    /// columns otherwise.
    fn predictions(&self, suite: &MetricSuite, x: &Array2<f64>) -> Result<Array2<f64>> {
        if suite.contains("MAE") || self.raw_reload || !self.caps.predict_proba {
            Ok(self.estimator.predict(x)?.insert_axis(Axis(1)))
        } else {
            self.estimator.predict_proba(x)
        }
    }

    /// Derived per-call seed: deterministic for a given caller seed, varying
    /// across repeated fits.
    fn call_seed(&self, seed: u64) -> u64 {
        seed ^ 0x9e37_79b9_7f4a_7c15u64.wrapping_mul(self.fit_calls)
    }

    /// Fit the estimator once and evaluate it. Writes the per-run best
    /// metrics (validation metrics with the loss injected) and appends one
    /// `{seed: metrics}` record to the shared validation results file.
    pub fn train(
        &mut self,
        train_set: &dyn TabularDataset,
        val_set: &dyn TabularDataset,
        weight: &WeightSpec,
        seed: u64,
        config: &BatchTrainConfig,
    ) -> Result<MetricRecord> {
        let log_dir = self.require_log_dir()?;
        fs::create_dir_all(&log_dir)?;

        let (x_train, y_train) = train_set.data_and_labels()?;
        let (x_val, y_val) = val_set.data_and_labels()?;

        let mut suite = self.metric_suite(&y_train);

        if self.caps.class_weight {
            if let Some(weights) = Self::resolve_weight(weight, &y_train)? {
                self.estimator.set_class_weights(&weights);
            }
        }

        self.fit_calls += 1;
        let val_loss = if self.caps.eval_set_stopping {
            self.estimator.fit_with_eval(
                &x_train,
                &y_train,
                &x_val,
                &y_val,
                config.patience,
                self.call_seed(seed),
            )?
        } else {
            self.estimator.fit(&x_train, &y_train)?;
            0.0
        };

        let train_pred = self.predictions(&suite, &x_train)?;
        let val_pred = self.predictions(&suite, &x_val)?;

        suite.update(&train_pred, &y_train);
        let train_metrics = suite.compute_and_reset()?;
        suite.update(&val_pred, &y_val);
        let mut val_metrics = suite.compute_and_reset()?;
        val_metrics.insert("loss".to_string(), MetricValue::Scalar(val_loss));

        for (name, value) in scalar_entries(&train_metrics) {
            info!(metric = name, value, "train result");
        }
        for (name, value) in scalar_entries(&val_metrics) {
            info!(metric = name, value, "val result");
        }

        if config.save_weights {
            self.save_weights(&log_dir)?;
        }

        write_metric_record(&log_dir.join("best_metrics.json"), &val_metrics)?;
        append_seed_record(
            &Self::shared_results_path(&log_dir, "val_metrics.json")?,
            seed,
            &val_metrics,
        )?;

        Ok(val_metrics)
    }

    /// One bulk prediction pass over a held-out set, persisted and appended
    /// like the training completion path. The `weight` argument is part of
    /// the uniform wrapper contract; weighting only affects fitting.
    pub fn test(
        &mut self,
        dataset: &dyn TabularDataset,
        seed: u64,
        _weight: &WeightSpec,
    ) -> Result<MetricRecord> {
        let log_dir = self.require_log_dir()?;
        fs::create_dir_all(&log_dir)?;

        let (x, y) = dataset.data_and_labels()?;
        let mut suite = self.metric_suite(&y);

        let preds = self.predictions(&suite, &x)?;
        suite.update(&preds, &y);
        let metrics = suite.compute_and_reset()?;

        for (name, value) in scalar_entries(&metrics) {
            info!(metric = name, value, "test result");
        }

        write_metric_record(&log_dir.join("test_metrics.json"), &metrics)?;
        append_seed_record(
            &Self::shared_results_path(&log_dir, "test_metrics.json")?,
            seed,
            &metrics,
        )?;

        Ok(metrics)
    }

    /// Persist the fitted model: boosters in their native serialization,
    /// everything else as a generic serialized estimator.
    pub fn save_weights(&self, log_dir: &Path) -> Result<PathBuf> {
        let path = match &self.estimator {
            Estimator::Booster(booster) => {
                let path = log_dir.join("model.gbt.json");
                fs::write(&path, serde_json::to_vec_pretty(booster)?)?;
                path
            }
            other => {
                let path = log_dir.join("model.est.json");
                fs::write(&path, serde_json::to_vec_pretty(other)?)?;
                path
            }
        };
        Ok(path)
    }

    /// Reload a persisted model, dispatching on the serialization format. A
    /// raw booster reload only exposes direct prediction output; `test`
    /// selects the prediction path accordingly.
    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if name.ends_with(".gbt.json") {
            let booster = serde_json::from_slice(&bytes)?;
            self.estimator = Estimator::Booster(booster);
            self.raw_reload = true;
        } else {
            self.estimator = serde_json::from_slice(&bytes)?;
            self.raw_reload = false;
        }
        self.caps = self.estimator.capabilities();
        Ok(())
    }
}
