//! Persisted training artifacts: per-run metric files, the shared cross-run
//! results files, and the per-epoch scalar streams.
//!
//! Layout per training run, rooted at the wrapper's log directory:
//!
//! ```text
//! <logdir>/model.<ext>            checkpoint / serialized model
//! <logdir>/best_metrics.json      best validation metrics (+ "loss")
//! <logdir>/test_metrics.json      test metrics (+ "loss")
//! <logdir>/scalars/train.jsonl    per-epoch scalar stream, training pass
//! <logdir>/scalars/val.jsonl      per-epoch scalar stream, validation pass
//! <logdir>/../val_metrics.json    {seed: {metric: value}} across runs
//! <logdir>/../test_metrics.json   {seed: {metric: value}} across runs
//! ```
//!
//! The cross-run files assume a single writer per log directory; concurrent
//! writers from multiple processes must be serialized by the caller.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::models::task::MetricValue;

/// Metric name -> value map as persisted.
pub type MetricRecord = BTreeMap<String, MetricValue>;

/// Write one run's metric record as pretty JSON, replacing any previous file.
pub fn write_metric_record(path: &Path, record: &MetricRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json)?;
    Ok(())
}

/// Append one seed's record to a shared cross-run results file.
///
/// The file holds `{seed: {metric: value}}`. Records of other seeds are
/// never touched; re-running a seed replaces only that seed's entry.
pub fn append_seed_record(path: &Path, seed: u64, record: &MetricRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut all: BTreeMap<String, MetricRecord> = if path.exists() {
        serde_json::from_str(&fs::read_to_string(path)?)?
    } else {
        BTreeMap::new()
    };
    all.insert(seed.to_string(), record.clone());

    let json = serde_json::to_string_pretty(&all)?;
    fs::write(path, json)?;
    Ok(())
}

/// Keep only scalar-valued entries of a record (curves are retained in the
/// persisted files but excluded from streaming).
pub fn scalar_entries(record: &MetricRecord) -> Vec<(&str, f64)> {
    record
        .iter()
        .filter_map(|(name, value)| value.as_scalar().map(|v| (name.as_str(), v)))
        .collect()
}

#[derive(Serialize)]
struct ScalarLine<'a> {
    epoch: usize,
    name: &'a str,
    value: f64,
}

/// Append-only JSON-lines stream of per-epoch scalars, one per
/// visualization channel (train / val).
#[derive(Debug)]
pub struct ScalarStream {
    path: PathBuf,
}

impl ScalarStream {
    /// Open (creating directories as needed) the stream at
    /// `<logdir>/scalars/<channel>.jsonl`.
    pub fn open(log_dir: &Path, channel: &str) -> Result<Self> {
        let dir = log_dir.join("scalars");
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(format!("{channel}.jsonl")),
        })
    }

    /// Record one scalar value for one epoch.
    pub fn record(&self, epoch: usize, name: &str, value: f64) -> Result<()> {
        let line = serde_json::to_string(&ScalarLine { epoch, name, value })?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Record every scalar entry of a metric record, plus the loss.
    pub fn record_epoch(&self, epoch: usize, loss: f64, record: &MetricRecord) -> Result<()> {
        for (name, value) in scalar_entries(record) {
            self.record(epoch, name, value)?;
        }
        self.record(epoch, "Loss", loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entries: &[(&str, f64)]) -> MetricRecord {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), MetricValue::Scalar(*v)))
            .collect()
    }

    #[test]
    fn test_append_preserves_prior_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("val_metrics.json");

        append_seed_record(&path, 1, &record(&[("AUC", 0.8)])).unwrap();
        append_seed_record(&path, 2, &record(&[("AUC", 0.9)])).unwrap();

        let all: BTreeMap<String, MetricRecord> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["1"]["AUC"], MetricValue::Scalar(0.8));
        assert_eq!(all["2"]["AUC"], MetricValue::Scalar(0.9));
    }

    #[test]
    fn test_append_same_seed_replaces_only_that_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("val_metrics.json");

        append_seed_record(&path, 1, &record(&[("AUC", 0.5)])).unwrap();
        append_seed_record(&path, 2, &record(&[("AUC", 0.9)])).unwrap();
        append_seed_record(&path, 1, &record(&[("AUC", 0.7)])).unwrap();

        let all: BTreeMap<String, MetricRecord> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(all["1"]["AUC"], MetricValue::Scalar(0.7));
        assert_eq!(all["2"]["AUC"], MetricValue::Scalar(0.9));
    }

    #[test]
    fn test_curves_survive_per_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best_metrics.json");

        let mut rec = record(&[("AUC", 0.8)]);
        rec.insert(
            "ROC_Curve".to_string(),
            MetricValue::Curve {
                x: vec![0.0, 1.0],
                y: vec![0.0, 1.0],
            },
        );
        write_metric_record(&path, &rec).unwrap();

        let back: MetricRecord =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(matches!(back["ROC_Curve"], MetricValue::Curve { .. }));
        assert_eq!(back["AUC"], MetricValue::Scalar(0.8));
    }

    #[test]
    fn test_scalar_stream_excludes_curves() {
        let dir = tempfile::tempdir().unwrap();
        let stream = ScalarStream::open(dir.path(), "train").unwrap();

        let mut rec = record(&[("AUC", 0.8)]);
        rec.insert(
            "ROC_Curve".to_string(),
            MetricValue::Curve {
                x: vec![0.0],
                y: vec![0.0],
            },
        );
        stream.record_epoch(0, 0.5, &rec).unwrap();

        let contents =
            fs::read_to_string(dir.path().join("scalars").join("train.jsonl")).unwrap();
        assert!(contents.contains("AUC"));
        assert!(contents.contains("Loss"));
        assert!(!contents.contains("ROC_Curve"));
    }
}
