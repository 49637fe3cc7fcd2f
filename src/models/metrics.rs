//! Streaming evaluation metrics and task-keyed metric suites.
//!
//! Metrics accumulate over batches (`update`), produce a [`MetricValue`] at
//! the end of a pass (`compute`), and are reset between passes. The harness
//! treats them as opaque name -> callable entries; the implementations here
//! are the crate's defaults. A metric undefined for the observed label
//! distribution surfaces its error; no fallback is applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Result, VitalError};
use crate::models::task::{MetricValue, TaskKind};
use crate::models::LabelScaler;

/// Streaming metric over (predictions, targets) pairs.
///
/// Predictions arrive as an `n x k` matrix (k = 1 for score-shaped outputs),
/// targets as a length-`n` vector.
pub trait Metric: Send {
    fn name(&self) -> &'static str;
    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>);
    fn compute(&self) -> Result<MetricValue>;
    fn reset(&mut self);
}

fn ensure_updated(n: usize, name: &str) -> Result<()> {
    if n == 0 {
        return Err(VitalError::MetricError(format!(
            "{name} computed before any update"
        )));
    }
    Ok(())
}

/// Sorted (score, target) pairs, ascending by score.
fn sorted_pairs(scores: &[f64], targets: &[f64]) -> Vec<(f64, f64)> {
    let mut pairs: Vec<(f64, f64)> = scores.iter().copied().zip(targets.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs
}

/// Area under the ROC curve via the trapezoidal rule, tie-aware.
/// Returns 0.5 when only one class is present.
fn trapezoid_auc(scores: &[f64], targets: &[f64]) -> f64 {
    let total_pos = targets.iter().filter(|&&t| t == 1.0).count() as f64;
    let total_neg = targets.len() as f64 - total_pos;
    if total_pos == 0.0 || total_neg == 0.0 {
        return 0.5;
    }

    let mut auc = 0.0;
    let mut cum_pos = 0.0;
    let mut cum_neg = 0.0;
    let mut prev_score = f64::NEG_INFINITY;
    let mut prev_pos = 0.0;
    let mut prev_neg = 0.0;

    for (score, target) in sorted_pairs(scores, targets) {
        if score != prev_score {
            auc += (cum_pos - prev_pos) * (cum_neg + prev_neg) / 2.0;
            prev_score = score;
            prev_pos = cum_pos;
            prev_neg = cum_neg;
        }
        if target == 1.0 {
            cum_pos += 1.0;
        } else {
            cum_neg += 1.0;
        }
    }
    auc += (total_pos - prev_pos) * (total_neg + prev_neg) / 2.0;

    auc / (total_pos * total_neg)
}

/// Confusion walk in descending-score order. Calls `visit(tp, fp)` after
/// every block of tied scores.
fn walk_thresholds(scores: &[f64], targets: &[f64], mut visit: impl FnMut(f64, f64)) {
    let mut pairs = sorted_pairs(scores, targets);
    pairs.reverse();

    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let score = pairs[i].0;
        while i < pairs.len() && pairs[i].0 == score {
            if pairs[i].1 == 1.0 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        visit(tp, fp);
    }
}

/// Average precision (area under the precision-recall curve).
#[derive(Debug, Default)]
pub struct AveragePrecision {
    scores: Vec<f64>,
    targets: Vec<f64>,
}

impl AveragePrecision {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for AveragePrecision {
    fn name(&self) -> &'static str {
        "PR"
    }

    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>) {
        for (row, t) in preds.rows().into_iter().zip(targets.iter()) {
            self.scores.push(row[0]);
            self.targets.push(*t);
        }
    }

    fn compute(&self) -> Result<MetricValue> {
        ensure_updated(self.scores.len(), self.name())?;
        let total_pos = self.targets.iter().filter(|&&t| t == 1.0).count() as f64;
        if total_pos == 0.0 {
            return Err(VitalError::MetricError(
                "average precision undefined without positive targets".to_string(),
            ));
        }

        let mut ap = 0.0;
        let mut prev_recall = 0.0;
        walk_thresholds(&self.scores, &self.targets, |tp, fp| {
            let precision = tp / (tp + fp);
            let recall = tp / total_pos;
            ap += precision * (recall - prev_recall);
            prev_recall = recall;
        });
        Ok(MetricValue::Scalar(ap))
    }

    fn reset(&mut self) {
        self.scores.clear();
        self.targets.clear();
    }
}

/// Area under the ROC curve.
#[derive(Debug, Default)]
pub struct RocAuc {
    scores: Vec<f64>,
    targets: Vec<f64>,
}

impl RocAuc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for RocAuc {
    fn name(&self) -> &'static str {
        "AUC"
    }

    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>) {
        for (row, t) in preds.rows().into_iter().zip(targets.iter()) {
            self.scores.push(row[0]);
            self.targets.push(*t);
        }
    }

    fn compute(&self) -> Result<MetricValue> {
        ensure_updated(self.scores.len(), self.name())?;
        Ok(MetricValue::Scalar(trapezoid_auc(
            &self.scores,
            &self.targets,
        )))
    }

    fn reset(&mut self) {
        self.scores.clear();
        self.targets.clear();
    }
}

/// Full ROC curve: x = false positive rate, y = true positive rate.
#[derive(Debug)]
pub struct RocCurve {
    name: &'static str,
    scores: Vec<f64>,
    targets: Vec<f64>,
}

impl RocCurve {
    pub fn new() -> Self {
        Self::named("ROC_Curve")
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            scores: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl Default for RocCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for RocCurve {
    fn name(&self) -> &'static str {
        self.name
    }

    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>) {
        for (row, t) in preds.rows().into_iter().zip(targets.iter()) {
            self.scores.push(row[0]);
            self.targets.push(*t);
        }
    }

    fn compute(&self) -> Result<MetricValue> {
        ensure_updated(self.scores.len(), self.name())?;
        let total_pos = self.targets.iter().filter(|&&t| t == 1.0).count() as f64;
        let total_neg = self.targets.len() as f64 - total_pos;
        if total_pos == 0.0 || total_neg == 0.0 {
            return Err(VitalError::MetricError(
                "ROC curve undefined with a single class".to_string(),
            ));
        }

        let mut x = vec![0.0];
        let mut y = vec![0.0];
        walk_thresholds(&self.scores, &self.targets, |tp, fp| {
            x.push(fp / total_neg);
            y.push(tp / total_pos);
        });
        Ok(MetricValue::Curve { x, y })
    }

    fn reset(&mut self) {
        self.scores.clear();
        self.targets.clear();
    }
}

/// Precision-recall curve: x = recall, y = precision.
#[derive(Debug)]
pub struct PrCurve {
    name: &'static str,
    scores: Vec<f64>,
    targets: Vec<f64>,
}

impl PrCurve {
    pub fn new() -> Self {
        Self::named("PR_Curve")
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            scores: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl Default for PrCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for PrCurve {
    fn name(&self) -> &'static str {
        self.name
    }

    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>) {
        for (row, t) in preds.rows().into_iter().zip(targets.iter()) {
            self.scores.push(row[0]);
            self.targets.push(*t);
        }
    }

    fn compute(&self) -> Result<MetricValue> {
        ensure_updated(self.scores.len(), self.name())?;
        let total_pos = self.targets.iter().filter(|&&t| t == 1.0).count() as f64;
        if total_pos == 0.0 {
            return Err(VitalError::MetricError(
                "precision-recall curve undefined without positive targets".to_string(),
            ));
        }

        // Start at the (recall 0, precision 1) convention point.
        let mut x = vec![0.0];
        let mut y = vec![1.0];
        walk_thresholds(&self.scores, &self.targets, |tp, fp| {
            x.push(tp / total_pos);
            y.push(tp / (tp + fp));
        });
        Ok(MetricValue::Curve { x, y })
    }

    fn reset(&mut self) {
        self.scores.clear();
        self.targets.clear();
    }
}

/// Reliability curve over uniform probability bins:
/// x = mean predicted probability per bin, y = observed positive fraction.
#[derive(Debug)]
pub struct CalibrationCurve {
    bins: usize,
    scores: Vec<f64>,
    targets: Vec<f64>,
}

impl CalibrationCurve {
    pub fn new() -> Self {
        Self::with_bins(10)
    }

    pub fn with_bins(bins: usize) -> Self {
        Self {
            bins: bins.max(1),
            scores: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl Default for CalibrationCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for CalibrationCurve {
    fn name(&self) -> &'static str {
        "Calibration_Curve"
    }

    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>) {
        for (row, t) in preds.rows().into_iter().zip(targets.iter()) {
            self.scores.push(row[0]);
            self.targets.push(*t);
        }
    }

    fn compute(&self) -> Result<MetricValue> {
        ensure_updated(self.scores.len(), self.name())?;
        let mut sums = vec![0.0; self.bins];
        let mut positives = vec![0.0; self.bins];
        let mut counts = vec![0usize; self.bins];

        for (&score, &target) in self.scores.iter().zip(self.targets.iter()) {
            let bin = ((score * self.bins as f64) as usize).min(self.bins - 1);
            sums[bin] += score;
            positives[bin] += target;
            counts[bin] += 1;
        }

        let mut x = Vec::new();
        let mut y = Vec::new();
        for bin in 0..self.bins {
            if counts[bin] > 0 {
                x.push(sums[bin] / counts[bin] as f64);
                y.push(positives[bin] / counts[bin] as f64);
            }
        }
        Ok(MetricValue::Curve { x, y })
    }

    fn reset(&mut self) {
        self.scores.clear();
        self.targets.clear();
    }
}

/// Fraction of exactly matched class predictions. Multi-column inputs are
/// argmaxed; single-column inputs are compared directly.
#[derive(Debug, Default)]
pub struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }
}

fn predicted_class(row: ArrayView1<f64>) -> f64 {
    if row.len() > 1 {
        let mut best = 0;
        for (i, v) in row.iter().enumerate() {
            if *v > row[best] {
                best = i;
            }
        }
        best as f64
    } else {
        row[0]
    }
}

impl Metric for Accuracy {
    fn name(&self) -> &'static str {
        "Accuracy"
    }

    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>) {
        for (row, t) in preds.rows().into_iter().zip(targets.iter()) {
            if (predicted_class(row) - *t).abs() < 0.5 {
                self.correct += 1;
            }
            self.total += 1;
        }
    }

    fn compute(&self) -> Result<MetricValue> {
        ensure_updated(self.total, self.name())?;
        Ok(MetricValue::Scalar(self.correct as f64 / self.total as f64))
    }

    fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }
}

/// Mean of per-class recall; robust to class imbalance.
#[derive(Debug, Default)]
pub struct BalancedAccuracy {
    preds: Vec<usize>,
    targets: Vec<usize>,
}

impl BalancedAccuracy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for BalancedAccuracy {
    fn name(&self) -> &'static str {
        "BalancedAccuracy"
    }

    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>) {
        for (row, t) in preds.rows().into_iter().zip(targets.iter()) {
            self.preds.push(predicted_class(row).round().max(0.0) as usize);
            self.targets.push(t.round().max(0.0) as usize);
        }
    }

    fn compute(&self) -> Result<MetricValue> {
        ensure_updated(self.targets.len(), self.name())?;
        let n_classes = self.targets.iter().copied().max().unwrap_or(0) + 1;
        let mut hits = vec![0usize; n_classes];
        let mut counts = vec![0usize; n_classes];
        for (&p, &t) in self.preds.iter().zip(self.targets.iter()) {
            counts[t] += 1;
            if p == t {
                hits[t] += 1;
            }
        }

        let mut recall_sum = 0.0;
        let mut present = 0usize;
        for c in 0..n_classes {
            if counts[c] > 0 {
                recall_sum += hits[c] as f64 / counts[c] as f64;
                present += 1;
            }
        }
        Ok(MetricValue::Scalar(recall_sum / present as f64))
    }

    fn reset(&mut self) {
        self.preds.clear();
        self.targets.clear();
    }
}

/// Mean absolute error, optionally mapped back to the original label scale
/// before the error is taken.
pub struct MeanAbsoluteError {
    invert: Option<Arc<dyn LabelScaler>>,
    abs_errors: Vec<f64>,
}

impl MeanAbsoluteError {
    pub fn new() -> Self {
        Self {
            invert: None,
            abs_errors: Vec::new(),
        }
    }

    /// Invert both predictions and targets through `scaler` before the error.
    pub fn with_inverse(scaler: Arc<dyn LabelScaler>) -> Self {
        Self {
            invert: Some(scaler),
            abs_errors: Vec::new(),
        }
    }
}

impl Default for MeanAbsoluteError {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for MeanAbsoluteError {
    fn name(&self) -> &'static str {
        "MAE"
    }

    fn update(&mut self, preds: ArrayView2<f64>, targets: ArrayView1<f64>) {
        for (row, t) in preds.rows().into_iter().zip(targets.iter()) {
            let (mut p, mut t) = (row[0], *t);
            if let Some(scaler) = &self.invert {
                p = scaler.inverse(p);
                t = scaler.inverse(t);
            }
            self.abs_errors.push((p - t).abs());
        }
    }

    fn compute(&self) -> Result<MetricValue> {
        ensure_updated(self.abs_errors.len(), self.name())?;
        let mean = self.abs_errors.iter().sum::<f64>() / self.abs_errors.len() as f64;
        Ok(MetricValue::Scalar(mean))
    }

    fn reset(&mut self) {
        self.abs_errors.clear();
    }
}

/// How raw model outputs are mapped before metric updates.
#[derive(Clone)]
pub enum OutputTransform {
    /// Pass predictions through unchanged.
    Identity,
    /// Row-wise softmax, keep the positive-class column only.
    SoftmaxPositive,
    /// Row-wise softmax over the full output.
    Softmax,
    /// Keep the positive-class probability column of an `n x 2` matrix.
    PositiveColumn,
    /// Collapse each row to its argmax class index.
    Argmax,
    /// Map each value back to the original label scale.
    InverseScale(Arc<dyn LabelScaler>),
}

fn softmax_rows(preds: &Array2<f64>) -> Array2<f64> {
    let mut out = preds.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp_sum: f64 = row.iter().map(|&v| (v - max).exp()).sum();
        for v in row.iter_mut() {
            *v = (*v - max).exp() / exp_sum;
        }
    }
    out
}

impl OutputTransform {
    pub fn apply(&self, preds: &Array2<f64>) -> Array2<f64> {
        match self {
            OutputTransform::Identity => preds.clone(),
            OutputTransform::Softmax => softmax_rows(preds),
            OutputTransform::SoftmaxPositive => {
                let soft = softmax_rows(preds);
                let last = soft.ncols().saturating_sub(1);
                let col: Array1<f64> = soft.column(last).to_owned();
                col.insert_axis(ndarray::Axis(1))
            }
            OutputTransform::PositiveColumn => {
                let last = preds.ncols().saturating_sub(1);
                let col: Array1<f64> = preds.column(last).to_owned();
                col.insert_axis(ndarray::Axis(1))
            }
            OutputTransform::Argmax => {
                let classes: Array1<f64> =
                    preds.rows().into_iter().map(predicted_class).collect();
                classes.insert_axis(ndarray::Axis(1))
            }
            OutputTransform::InverseScale(scaler) => preds.mapv(|v| scaler.inverse(v)),
        }
    }
}

impl std::fmt::Debug for OutputTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputTransform::Identity => "Identity",
            OutputTransform::SoftmaxPositive => "SoftmaxPositive",
            OutputTransform::Softmax => "Softmax",
            OutputTransform::PositiveColumn => "PositiveColumn",
            OutputTransform::Argmax => "Argmax",
            OutputTransform::InverseScale(_) => "InverseScale",
        };
        f.write_str(name)
    }
}

/// How labels are mapped before metric updates.
#[derive(Clone)]
pub enum LabelTransform {
    Identity,
    InverseScale(Arc<dyn LabelScaler>),
}

impl LabelTransform {
    pub fn apply(&self, labels: &Array1<f64>) -> Array1<f64> {
        match self {
            LabelTransform::Identity => labels.clone(),
            LabelTransform::InverseScale(scaler) => labels.mapv(|v| scaler.inverse(v)),
        }
    }
}

impl std::fmt::Debug for LabelTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelTransform::Identity => f.write_str("Identity"),
            LabelTransform::InverseScale(_) => f.write_str("InverseScale"),
        }
    }
}

/// The metric set active for one task, together with the output and label
/// transforms it expects. Exactly one suite is active per train/test call.
pub struct MetricSuite {
    pub task: TaskKind,
    pub metrics: Vec<Box<dyn Metric>>,
    pub output: OutputTransform,
    pub label: LabelTransform,
}

impl MetricSuite {
    /// Names of every metric in the suite.
    pub fn names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    /// Whether the suite carries a metric with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.metrics.iter().any(|m| m.name() == name)
    }

    /// Transform a (predictions, labels) pair and feed it to every metric.
    pub fn update(&mut self, preds: &Array2<f64>, labels: &Array1<f64>) {
        let preds = self.output.apply(preds);
        let labels = self.label.apply(labels);
        for metric in &mut self.metrics {
            metric.update(preds.view(), labels.view());
        }
    }

    /// Compute every metric, then reset them for the next pass.
    pub fn compute_and_reset(&mut self) -> Result<BTreeMap<String, MetricValue>> {
        let mut results = BTreeMap::new();
        for metric in &mut self.metrics {
            let value = metric.compute()?;
            results.insert(metric.name().to_string(), value);
            metric.reset();
        }
        Ok(results)
    }
}

/// Suite for the iterative engine, keyed on the model's output width.
pub fn iterative_suite(output_width: usize, scaler: Option<Arc<dyn LabelScaler>>) -> MetricSuite {
    match TaskKind::from_output_width(output_width) {
        TaskKind::Binary => MetricSuite {
            task: TaskKind::Binary,
            metrics: vec![
                Box::new(AveragePrecision::new()),
                Box::new(RocAuc::new()),
                Box::new(PrCurve::new()),
                Box::new(RocCurve::new()),
                Box::new(CalibrationCurve::new()),
            ],
            output: OutputTransform::SoftmaxPositive,
            label: LabelTransform::Identity,
        },
        TaskKind::Continuous => {
            let mae: Box<dyn Metric> = match scaler {
                Some(scaler) => Box::new(MeanAbsoluteError::with_inverse(scaler)),
                None => Box::new(MeanAbsoluteError::new()),
            };
            MetricSuite {
                task: TaskKind::Continuous,
                metrics: vec![mae],
                output: OutputTransform::Identity,
                label: LabelTransform::Identity,
            }
        }
        TaskKind::MultiClass => MetricSuite {
            task: TaskKind::MultiClass,
            metrics: vec![Box::new(Accuracy::new()), Box::new(BalancedAccuracy::new())],
            output: OutputTransform::Softmax,
            label: LabelTransform::Identity,
        },
    }
}

/// Suite for the batch engine, keyed on the labels themselves. `has_proba`
/// selects between probability-column and raw-score output handling for the
/// binary task.
pub fn batch_suite(
    task: TaskKind,
    has_proba: bool,
    scaler: Option<Arc<dyn LabelScaler>>,
) -> MetricSuite {
    match task {
        TaskKind::Binary => MetricSuite {
            task,
            metrics: vec![
                Box::new(AveragePrecision::new()),
                Box::new(RocAuc::new()),
                Box::new(RocCurve::named("ROC")),
                Box::new(PrCurve::named("PRC")),
            ],
            output: if has_proba {
                OutputTransform::PositiveColumn
            } else {
                OutputTransform::Identity
            },
            label: LabelTransform::Identity,
        },
        TaskKind::MultiClass => MetricSuite {
            task,
            metrics: vec![Box::new(Accuracy::new()), Box::new(BalancedAccuracy::new())],
            output: OutputTransform::Argmax,
            label: LabelTransform::Identity,
        },
        TaskKind::Continuous => MetricSuite {
            task,
            metrics: vec![Box::new(MeanAbsoluteError::new())],
            output: match &scaler {
                Some(scaler) => OutputTransform::InverseScale(Arc::clone(scaler)),
                None => OutputTransform::Identity,
            },
            label: match scaler {
                Some(scaler) => LabelTransform::InverseScale(scaler),
                None => LabelTransform::Identity,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn column(values: &[f64]) -> Array2<f64> {
        Array1::from_vec(values.to_vec()).insert_axis(ndarray::Axis(1))
    }

    #[test]
    fn test_auc_perfect_ranking() {
        let mut auc = RocAuc::new();
        auc.update(
            column(&[0.1, 0.2, 0.8, 0.9]).view(),
            array![0.0, 0.0, 1.0, 1.0].view(),
        );
        assert_eq!(auc.compute().unwrap(), MetricValue::Scalar(1.0));
    }

    #[test]
    fn test_auc_inverted_ranking() {
        let mut auc = RocAuc::new();
        auc.update(
            column(&[0.9, 0.8, 0.2, 0.1]).view(),
            array![0.0, 0.0, 1.0, 1.0].view(),
        );
        assert_eq!(auc.compute().unwrap(), MetricValue::Scalar(0.0));
    }

    #[test]
    fn test_auc_single_class_is_half() {
        let mut auc = RocAuc::new();
        auc.update(column(&[0.2, 0.8]).view(), array![1.0, 1.0].view());
        assert_eq!(auc.compute().unwrap(), MetricValue::Scalar(0.5));
    }

    #[test]
    fn test_average_precision_perfect() {
        let mut ap = AveragePrecision::new();
        ap.update(
            column(&[0.1, 0.9, 0.8, 0.3]).view(),
            array![0.0, 1.0, 1.0, 0.0].view(),
        );
        assert_eq!(ap.compute().unwrap(), MetricValue::Scalar(1.0));
    }

    #[test]
    fn test_accuracy_with_argmax_rows() {
        let mut acc = Accuracy::new();
        let preds = array![[0.9, 0.1], [0.2, 0.8], [0.6, 0.4]];
        acc.update(preds.view(), array![0.0, 1.0, 1.0].view());
        let MetricValue::Scalar(v) = acc.compute().unwrap() else {
            panic!("accuracy must be scalar");
        };
        assert!((v - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_balanced_accuracy_imbalanced() {
        let mut bacc = BalancedAccuracy::new();
        // Class 0: 3 of 3 right; class 1: 0 of 1 right -> (1.0 + 0.0) / 2
        bacc.update(
            column(&[0.0, 0.0, 0.0, 0.0]).view(),
            array![0.0, 0.0, 0.0, 1.0].view(),
        );
        assert_eq!(bacc.compute().unwrap(), MetricValue::Scalar(0.5));
    }

    #[test]
    fn test_mae_with_inverse_scaling() {
        struct Doubler;
        impl LabelScaler for Doubler {
            fn inverse(&self, value: f64) -> f64 {
                value * 2.0
            }
        }

        let mut mae = MeanAbsoluteError::with_inverse(Arc::new(Doubler));
        mae.update(column(&[1.0, 2.0]).view(), array![2.0, 2.0].view());
        // Errors on the original scale: |2-4| = 2 and |4-4| = 0
        assert_eq!(mae.compute().unwrap(), MetricValue::Scalar(1.0));
    }

    #[test]
    fn test_compute_before_update_errors() {
        let auc = RocAuc::new();
        assert!(auc.compute().is_err());
    }

    #[test]
    fn test_roc_curve_ends_at_one_one() {
        let mut roc = RocCurve::new();
        roc.update(
            column(&[0.9, 0.7, 0.3, 0.1]).view(),
            array![1.0, 0.0, 1.0, 0.0].view(),
        );
        let MetricValue::Curve { x, y } = roc.compute().unwrap() else {
            panic!("ROC must be a curve");
        };
        assert_eq!((x[0], y[0]), (0.0, 0.0));
        assert_eq!((*x.last().unwrap(), *y.last().unwrap()), (1.0, 1.0));
    }

    #[test]
    fn test_softmax_positive_transform() {
        let preds = array![[0.0, 0.0], [2.0, 2.0]];
        let out = OutputTransform::SoftmaxPositive.apply(&preds);
        assert_eq!(out.dim(), (2, 1));
        assert!((out[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((out[[1, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_iterative_suite_selection_by_width() {
        let binary = iterative_suite(2, None);
        assert_eq!(
            binary.names(),
            vec!["PR", "AUC", "PR_Curve", "ROC_Curve", "Calibration_Curve"]
        );

        let regression = iterative_suite(1, None);
        assert_eq!(regression.names(), vec!["MAE"]);

        let multi = iterative_suite(3, None);
        assert_eq!(multi.names(), vec!["Accuracy", "BalancedAccuracy"]);
    }

    #[test]
    fn test_batch_suite_selection() {
        let binary = batch_suite(TaskKind::Binary, true, None);
        assert_eq!(binary.names(), vec!["PR", "AUC", "ROC", "PRC"]);

        let continuous = batch_suite(TaskKind::Continuous, false, None);
        assert_eq!(continuous.names(), vec!["MAE"]);
    }
}
