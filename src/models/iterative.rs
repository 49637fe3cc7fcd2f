//! Epoch-based training engine for sequence models.
//!
//! Drives any [`SequenceModel`] through shuffled mini-batch epochs with
//! masked loss computation, width-keyed loss and metric selection, early
//! stopping on validation loss, best-checkpoint persistence and cross-run
//! result aggregation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3};
use tracing::info;

use crate::data::{SequenceBatch, SequenceDataset};
use crate::device::ComputeTarget;
use crate::error::{Result, VitalError};
use crate::models::encoder::SequenceModel;
use crate::models::loss::{CrossEntropyLoss, Loss, SquaredErrorLoss};
use crate::models::metrics::{iterative_suite, MetricSuite};
use crate::models::results::{
    append_seed_record, scalar_entries, write_metric_record, MetricRecord, ScalarStream,
};
use crate::models::task::MetricValue;
use crate::models::{LabelScaler, WeightSpec};

/// Knobs for one training call.
#[derive(Debug, Clone)]
pub struct IterativeTrainConfig {
    /// Maximum number of epochs
    pub epochs: usize,
    /// Mini-batch size for both training and validation passes
    pub batch_size: usize,
    /// Consecutive non-improving epochs tolerated before stopping
    pub patience: usize,
    /// Minimum validation-loss improvement that resets the patience counter
    pub min_delta: f64,
    /// Persist the checkpoint on every improvement
    pub save_weights: bool,
}

impl Default for IterativeTrainConfig {
    fn default() -> Self {
        Self {
            epochs: 1000,
            batch_size: 64,
            patience: 10,
            min_delta: 1e-4,
            save_weights: true,
        }
    }
}

/// Outcome of a training call.
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// Lowest validation loss observed
    pub best_loss: f64,
    /// Number of epochs actually run
    pub epochs_run: usize,
    /// Best validation metrics, with the loss injected under `"loss"`
    pub best_metrics: MetricRecord,
}

/// Epoch-based trainer over an opaque sequence model.
pub struct IterativeWrapper {
    model: Box<dyn SequenceModel>,
    loss: Box<dyn Loss>,
    target: ComputeTarget,
    log_dir: Option<PathBuf>,
    scaler: Option<Arc<dyn LabelScaler>>,
}

impl IterativeWrapper {
    /// Wrap a model for training on the given compute target. The loss is
    /// selected from the model's output width: width 1 trains as regression,
    /// anything wider as classification.
    pub fn new(model: Box<dyn SequenceModel>, target: ComputeTarget) -> Self {
        let width = model.output_width();
        let loss: Box<dyn Loss> = if width == 1 {
            Box::new(SquaredErrorLoss::new())
        } else {
            Box::new(CrossEntropyLoss::new())
        };
        info!(?target, width, loss = loss.name(), "constructed iterative wrapper");
        Self {
            model,
            loss,
            target,
            log_dir: None,
            scaler: None,
        }
    }

    /// Replace the loss collaborator.
    pub fn with_loss(mut self, loss: Box<dyn Loss>) -> Self {
        self.loss = loss;
        self
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

    pub fn model(&self) -> &dyn SequenceModel {
        self.model.as_ref()
    }

    /// The metric suite for this model's output width; rebuilt once per
    /// train/test call.
    pub fn metric_suite(&self) -> MetricSuite {
        iterative_suite(self.model.output_width(), self.scaler.clone())
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

    fn checkpoint_path(log_dir: &Path) -> PathBuf {
        log_dir.join("model.bin")
    }

    fn resolve_weight(
        &self,
        weight: &WeightSpec,
        dataset: &dyn SequenceDataset,
    ) -> Result<Option<Vec<f64>>> {
        match weight {
            WeightSpec::Unweighted => Ok(None),
            WeightSpec::Explicit(values) => Ok(Some(values.clone())),
            WeightSpec::Balanced => Ok(Some(dataset.balance()?)),
        }
    }

    /// Run one batch through the model: masked flatten, loss, and (when
    /// `train` is set) gradient ingestion plus an optimizer step. Returns
    /// `None` for a batch with no valid positions.
    fn step_batch(
        &mut self,
        batch: &SequenceBatch,
        class_weights: Option<&[f64]>,
        train: bool,
    ) -> Result<Option<(f64, Array2<f64>, Array1<f64>)>> {
        batch.validate()?;
        let mask = batch.effective_mask();
        let output = self.model.forward(&batch.features)?;
        let (b, t, width) = output.preds.dim();
        if (b, t) != batch.labels.dim() {
            return Err(VitalError::ShapeError {
                expected: format!("predictions over {:?} positions", batch.labels.dim()),
                actual: format!("({b}, {t})"),
            });
        }

        let valid: Vec<(usize, usize)> = (0..b)
            .flat_map(|i| (0..t).map(move |j| (i, j)))
            .filter(|&(i, j)| mask[[i, j]])
            .collect();
        if valid.is_empty() {
            return Ok(None);
        }

        let mut preds_flat = Array2::zeros((valid.len(), width));
        let mut labels_flat = Array1::zeros(valid.len());
        for (row, &(i, j)) in valid.iter().enumerate() {
            for k in 0..width {
                preds_flat[[row, k]] = output.preds[[i, j, k]];
            }
            labels_flat[row] = batch.labels[[i, j]];
        }

        // Width 1 is a regression head: class weights do not apply.
        let weights = if width > 1 { class_weights } else { None };
        let (loss_value, grad_flat) =
            self.loss
                .loss_and_grad(preds_flat.view(), labels_flat.view(), weights)?;
        let total_loss = loss_value + output.aux_loss;

        if train {
            // Masked positions contribute zero gradient
            let mut grad = Array3::zeros((b, t, width));
            for (row, &(i, j)) in valid.iter().enumerate() {
                for k in 0..width {
                    grad[[i, j, k]] = grad_flat[[row, k]];
                }
            }
            self.model.backward(&grad)?;
            self.model.step()?;
        }

        Ok(Some((total_loss, preds_flat, labels_flat)))
    }

    fn run_pass(
        &mut self,
        dataset: &dyn SequenceDataset,
        suite: &mut MetricSuite,
        class_weights: Option<&[f64]>,
        batch_size: usize,
        shuffle_seed: Option<u64>,
    ) -> Result<(f64, MetricRecord)> {
        let train = shuffle_seed.is_some();
        self.model.set_training(train);

        let mut losses = Vec::new();
        let batches = dataset.batches(batch_size, train, shuffle_seed.unwrap_or(0));
        for batch in batches {
            let batch = batch?;
            if let Some((loss, preds, labels)) = self.step_batch(&batch, class_weights, train)? {
                losses.push(loss);
                suite.update(&preds, &labels);
            }
        }

        if losses.is_empty() {
            return Err(VitalError::DataError(
                "pass over dataset produced no valid batches".to_string(),
            ));
        }
        let mean_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        let metrics = suite.compute_and_reset()?;
        Ok((mean_loss, metrics))
    }

    /// Evaluation pass shared by validation-during-training and `test`:
    /// no parameter updates, mean loss plus the metric map.
    pub fn evaluate(
        &mut self,
        dataset: &dyn SequenceDataset,
        suite: &mut MetricSuite,
        weight: &WeightSpec,
        batch_size: usize,
    ) -> Result<(f64, MetricRecord)> {
        let class_weights = self.resolve_weight(weight, dataset)?;
        self.run_pass(dataset, suite, class_weights.as_deref(), batch_size, None)
    }

    /// Train with early stopping. On completion the per-run best metrics are
    /// written, one `{seed: metrics}` record is appended to the shared
    /// validation results file, and the best checkpoint is loaded back so
    /// subsequent calls use the best weights rather than the last-trained
    /// ones.
    pub fn train(
        &mut self,
        train_set: &dyn SequenceDataset,
        val_set: &dyn SequenceDataset,
        weight: &WeightSpec,
        seed: u64,
        config: &IterativeTrainConfig,
    ) -> Result<TrainReport> {
        let log_dir = self.require_log_dir()?;
        fs::create_dir_all(&log_dir)?;
        let checkpoint = Self::checkpoint_path(&log_dir);

        let mut suite = self.metric_suite();
        let class_weights = self.resolve_weight(weight, train_set)?;

        let train_stream = ScalarStream::open(&log_dir, "train")?;
        let val_stream = ScalarStream::open(&log_dir, "val")?;

        let mut best_loss = f64::INFINITY;
        let mut epochs_no_improvement = 0usize;
        let mut best_metrics = MetricRecord::new();
        let mut last_val_metrics = MetricRecord::new();
        let mut epochs_run = 0usize;

        for epoch in 0..config.epochs {
            epochs_run = epoch + 1;

            let (train_loss, train_metrics) = self.run_pass(
                train_set,
                &mut suite,
                class_weights.as_deref(),
                config.batch_size,
                Some(seed.wrapping_add(epoch as u64)),
            )?;

            let (val_loss, val_metrics) = self.run_pass(
                val_set,
                &mut suite,
                class_weights.as_deref(),
                config.batch_size,
                None,
            )?;

            if val_loss <= best_loss - config.min_delta {
                best_metrics = val_metrics.clone();
                epochs_no_improvement = 0;
                if config.save_weights {
                    fs::write(&checkpoint, self.model.state_bytes()?)?;
                }
                best_loss = val_loss;
                info!(epoch = epoch + 1, val_loss, "validation loss improved");
            } else {
                epochs_no_improvement += 1;
                info!(
                    epoch = epoch + 1,
                    epochs_no_improvement, "no improvement on validation loss"
                );
            }
            last_val_metrics = val_metrics.clone();
            if epochs_no_improvement >= config.patience {
                info!(patience = config.patience, "early stopping");
                break;
            }

            train_stream.record_epoch(epoch, train_loss, &train_metrics)?;
            val_stream.record_epoch(epoch, val_loss, &val_metrics)?;
            info!(epoch = epoch + 1, train_loss, val_loss, "epoch finished");
        }

        best_metrics.insert("loss".to_string(), MetricValue::Scalar(best_loss));
        write_metric_record(&log_dir.join("best_metrics.json"), &best_metrics)?;
        append_seed_record(
            &Self::shared_results_path(&log_dir, "val_metrics.json")?,
            seed,
            &last_val_metrics,
        )?;

        // Load back the best iteration
        if checkpoint.exists() {
            let bytes = fs::read(&checkpoint)?;
            self.model.load_state_bytes(&bytes)?;
        }

        Ok(TrainReport {
            best_loss,
            epochs_run,
            best_metrics,
        })
    }

    /// One evaluation pass over a held-out set with batch size 1, persisted
    /// and appended like the training completion path.
    pub fn test(
        &mut self,
        dataset: &dyn SequenceDataset,
        seed: u64,
        weight: &WeightSpec,
    ) -> Result<MetricRecord> {
        let log_dir = self.require_log_dir()?;
        fs::create_dir_all(&log_dir)?;

        let mut suite = self.metric_suite();
        let (test_loss, mut metrics) = self.evaluate(dataset, &mut suite, weight, 1)?;
        metrics.insert("loss".to_string(), MetricValue::Scalar(test_loss));

        write_metric_record(&log_dir.join("test_metrics.json"), &metrics)?;
        append_seed_record(
            &Self::shared_results_path(&log_dir, "test_metrics.json")?,
            seed,
            &metrics,
        )?;

        for (name, value) in scalar_entries(&metrics) {
            info!(metric = name, value, "test result");
        }
        Ok(metrics)
    }
}
