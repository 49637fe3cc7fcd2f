//! Dataset collaborator interfaces.
//!
//! The harness never owns data. Iterative training consumes batches of
//! sequence windows through [`SequenceDataset`]; single-shot training pulls
//! full matrices through [`TabularDataset`]. Both are implemented here for
//! in-memory arrays, and by whatever loader the caller brings (including
//! channel-backed prefetching loaders; the batch iterator makes no
//! assumption about how batches are produced).

use ndarray::{Array1, Array2, Array3, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{Result, VitalError};

/// One mini-batch of grouped time-series data.
///
/// `features` is batch x time x feature, `labels` is batch x time. A missing
/// mask means every position is valid.
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    pub features: Array3<f64>,
    pub labels: Array2<f64>,
    pub mask: Option<Array2<bool>>,
}

impl SequenceBatch {
    /// Build a batch, checking the shape contract eagerly. A malformed batch
    /// is a caller contract violation and surfaces immediately.
    pub fn new(
        features: Array3<f64>,
        labels: Array2<f64>,
        mask: Option<Array2<bool>>,
    ) -> Result<Self> {
        let batch = Self {
            features,
            labels,
            mask,
        };
        batch.validate()?;
        Ok(batch)
    }

    /// Check that features, labels and mask agree on batch and time dims.
    pub fn validate(&self) -> Result<()> {
        let (b, t, _) = self.features.dim();
        if self.labels.dim() != (b, t) {
            return Err(VitalError::ShapeError {
                expected: format!("labels of shape ({b}, {t})"),
                actual: format!("{:?}", self.labels.dim()),
            });
        }
        if let Some(mask) = &self.mask {
            if mask.dim() != (b, t) {
                return Err(VitalError::ShapeError {
                    expected: format!("mask of shape ({b}, {t})"),
                    actual: format!("{:?}", mask.dim()),
                });
            }
        }
        Ok(())
    }

    /// The mask to use for this batch; absent mask means all-true.
    pub fn effective_mask(&self) -> Array2<bool> {
        match &self.mask {
            Some(mask) => mask.clone(),
            None => Array2::from_elem(self.labels.dim(), true),
        }
    }

    /// Number of sequences in the batch.
    pub fn len(&self) -> usize {
        self.features.dim().0
    }

    /// Whether the batch holds no sequences.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Boxed batch stream. Items are `Result` so a loader may surface delivery
/// failures in-band.
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<SequenceBatch>> + 'a>;

/// Batchable view over grouped sequence data, for iterative training.
pub trait SequenceDataset {
    /// Iterate the dataset in mini-batches. `shuffle` reorders sequences
    /// with a generator seeded from `seed`.
    fn batches(&self, batch_size: usize, shuffle: bool, seed: u64) -> BatchIter<'_>;

    /// Per-class weight vector derived from the label balance, used to
    /// resolve the `Balanced` weight sentinel.
    fn balance(&self) -> Result<Vec<f64>>;
}

/// Bulk matrix view over the same data, for single-shot training.
pub trait TabularDataset {
    /// Full feature matrix and label vector (valid positions only).
    fn data_and_labels(&self) -> Result<(Array2<f64>, Array1<f64>)>;
}

/// Owned in-memory dataset implementing both access forms.
#[derive(Debug, Clone)]
pub struct InMemorySequenceDataset {
    features: Array3<f64>,
    labels: Array2<f64>,
    mask: Option<Array2<bool>>,
}

impl InMemorySequenceDataset {
    pub fn new(
        features: Array3<f64>,
        labels: Array2<f64>,
        mask: Option<Array2<bool>>,
    ) -> Result<Self> {
        // Reuse the batch shape contract for the whole dataset.
        SequenceBatch::new(features.clone(), labels.clone(), mask.clone())?;
        Ok(Self {
            features,
            labels,
            mask,
        })
    }

    /// Number of sequences held.
    pub fn len(&self) -> usize {
        self.features.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn valid_positions(&self) -> Vec<(usize, usize)> {
        let (b, t, _) = self.features.dim();
        let mut positions = Vec::new();
        for i in 0..b {
            for j in 0..t {
                let valid = self.mask.as_ref().map(|m| m[[i, j]]).unwrap_or(true);
                if valid {
                    positions.push((i, j));
                }
            }
        }
        positions
    }
}

impl SequenceDataset for InMemorySequenceDataset {
    fn batches(&self, batch_size: usize, shuffle: bool, seed: u64) -> BatchIter<'_> {
        let n = self.len();
        let mut order: Vec<usize> = (0..n).collect();
        if shuffle {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }
        let chunks: Vec<Vec<usize>> = order
            .chunks(batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();

        Box::new(chunks.into_iter().map(move |idx| {
            SequenceBatch::new(
                self.features.select(Axis(0), &idx),
                self.labels.select(Axis(0), &idx),
                self.mask.as_ref().map(|m| m.select(Axis(0), &idx)),
            )
        }))
    }

    fn balance(&self) -> Result<Vec<f64>> {
        let positions = self.valid_positions();
        if positions.is_empty() {
            return Err(VitalError::DataError(
                "cannot compute class balance on an empty dataset".to_string(),
            ));
        }
        let mut max_class = 0usize;
        for &(i, j) in &positions {
            let label = self.labels[[i, j]];
            if label < 0.0 || label.fract() != 0.0 {
                return Err(VitalError::DataError(format!(
                    "class balance requires non-negative integer labels, got {label}"
                )));
            }
            max_class = max_class.max(label as usize);
        }
        let n_classes = max_class + 1;
        let mut counts = vec![0usize; n_classes];
        for &(i, j) in &positions {
            counts[self.labels[[i, j]] as usize] += 1;
        }
        let total = positions.len() as f64;
        Ok(counts
            .iter()
            .map(|&c| {
                if c == 0 {
                    0.0
                } else {
                    total / (n_classes as f64 * c as f64)
                }
            })
            .collect())
    }
}

impl TabularDataset for InMemorySequenceDataset {
    fn data_and_labels(&self) -> Result<(Array2<f64>, Array1<f64>)> {
        let positions = self.valid_positions();
        let n_features = self.features.dim().2;
        let mut x = Array2::zeros((positions.len(), n_features));
        let mut y = Array1::zeros(positions.len());
        for (row, &(i, j)) in positions.iter().enumerate() {
            for f in 0..n_features {
                x[[row, f]] = self.features[[i, j, f]];
            }
            y[row] = self.labels[[i, j]];
        }
        Ok((x, y))
    }
}
