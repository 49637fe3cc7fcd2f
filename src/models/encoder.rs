//! Trainable sequence-model collaborator interface and a default encoder.
//!
//! The iterative engine drives any [`SequenceModel`]: it owns the masking,
//! loss selection and early stopping, while the model owns its parameters,
//! gradients and optimizer state. [`TimestepMlp`] is the crate's default
//! implementation: a shared-weight feedforward encoder applied at every
//! timestep.

use ndarray::{Array1, Array2, Array3};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VitalError};

/// Output of one forward pass: per-timestep predictions plus any auxiliary
/// loss the architecture accumulated internally (zero when it has none).
#[derive(Debug, Clone)]
pub struct SequenceOutput {
    /// batch x time x output width
    pub preds: Array3<f64>,
    pub aux_loss: f64,
}

/// A trainable encoder over sequence batches.
pub trait SequenceModel: Send {
    /// Width of the model's output layer; drives loss and metric selection.
    fn output_width(&self) -> usize;

    /// Switch between training and evaluation mode.
    fn set_training(&mut self, training: bool);

    /// Run the encoder over a feature batch.
    fn forward(&mut self, features: &Array3<f64>) -> Result<SequenceOutput>;

    /// Ingest the loss gradient with respect to the predictions of the most
    /// recent forward pass.
    fn backward(&mut self, grad_preds: &Array3<f64>) -> Result<()>;

    /// Apply one optimizer update from the accumulated gradients, then clear
    /// them.
    fn step(&mut self) -> Result<()>;

    /// Serialize the trainable state for checkpointing.
    fn state_bytes(&self) -> Result<Vec<u8>>;

    /// Restore trainable state written by [`SequenceModel::state_bytes`].
    fn load_state_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Configuration for [`TimestepMlp`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestepMlpConfig {
    pub input_dim: usize,
    pub hidden_layers: Vec<usize>,
    pub output_width: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub seed: u64,
}

impl Default for TimestepMlpConfig {
    fn default() -> Self {
        Self {
            input_dim: 1,
            hidden_layers: vec![64],
            output_width: 2,
            learning_rate: 0.001,
            momentum: 0.9,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct ForwardCache {
    activations: Vec<Array2<f64>>,
    z_values: Vec<Array2<f64>>,
    batch: usize,
    time: usize,
}

/// Shared-weight MLP applied independently at every timestep.
#[derive(Debug, Serialize, Deserialize)]
pub struct TimestepMlp {
    config: TimestepMlpConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    #[serde(skip)]
    velocities_w: Vec<Array2<f64>>,
    #[serde(skip)]
    velocities_b: Vec<Array1<f64>>,
    #[serde(skip)]
    grads_w: Vec<Array2<f64>>,
    #[serde(skip)]
    grads_b: Vec<Array1<f64>>,
    #[serde(skip)]
    cache: Option<ForwardCache>,
    #[serde(skip)]
    training: bool,
}

impl TimestepMlp {
    pub fn new(config: TimestepMlpConfig) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);

        let mut layer_sizes = vec![config.input_dim];
        layer_sizes.extend(&config.hidden_layers);
        layer_sizes.push(config.output_width);

        let mut weights = Vec::new();
        let mut biases = Vec::new();
        for i in 0..layer_sizes.len() - 1 {
            let n_in = layer_sizes[i];
            let n_out = layer_sizes[i + 1];

            // Xavier/Glorot initialization
            let scale = (2.0 / (n_in + n_out) as f64).sqrt();
            let values: Vec<f64> = (0..n_in * n_out)
                .map(|_| rng.gen::<f64>() * 2.0 * scale - scale)
                .collect();
            weights.push(Array2::from_shape_vec((n_in, n_out), values).expect("layer shape"));
            biases.push(Array1::zeros(n_out));
        }

        Self {
            config,
            weights,
            biases,
            velocities_w: Vec::new(),
            velocities_b: Vec::new(),
            grads_w: Vec::new(),
            grads_b: Vec::new(),
            cache: None,
            training: true,
        }
    }

    pub fn config(&self) -> &TimestepMlpConfig {
        &self.config
    }

    fn ensure_buffers(&mut self) {
        if self.velocities_w.len() != self.weights.len() {
            self.velocities_w = self
                .weights
                .iter()
                .map(|w| Array2::zeros(w.raw_dim()))
                .collect();
            self.velocities_b = self.biases.iter().map(|b| Array1::zeros(b.len())).collect();
        }
        if self.grads_w.len() != self.weights.len() {
            self.grads_w = self
                .weights
                .iter()
                .map(|w| Array2::zeros(w.raw_dim()))
                .collect();
            self.grads_b = self.biases.iter().map(|b| Array1::zeros(b.len())).collect();
        }
    }

    fn flatten(features: &Array3<f64>) -> Array2<f64> {
        let (b, t, f) = features.dim();
        Array2::from_shape_fn((b * t, f), |(row, col)| features[[row / t, row % t, col]])
    }
}

impl SequenceModel for TimestepMlp {
    fn output_width(&self) -> usize {
        self.config.output_width
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn forward(&mut self, features: &Array3<f64>) -> Result<SequenceOutput> {
        let (b, t, f) = features.dim();
        if f != self.config.input_dim {
            return Err(VitalError::ShapeError {
                expected: format!("{} input features", self.config.input_dim),
                actual: format!("{f}"),
            });
        }

        let flat = Self::flatten(features);
        let mut activations = vec![flat];
        let mut z_values = Vec::new();

        for (i, (w, bias)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let z = activations.last().expect("input activation").dot(w) + bias;
            z_values.push(z.clone());
            let a = if i < self.weights.len() - 1 {
                z.mapv(|v| v.max(0.0))
            } else {
                z
            };
            activations.push(a);
        }

        let out = activations.last().expect("output activation");
        let width = self.config.output_width;
        let preds = Array3::from_shape_fn((b, t, width), |(i, j, k)| out[[i * t + j, k]]);

        if self.training {
            self.cache = Some(ForwardCache {
                activations,
                z_values,
                batch: b,
                time: t,
            });
        } else {
            self.cache = None;
        }

        Ok(SequenceOutput {
            preds,
            aux_loss: 0.0,
        })
    }

    fn backward(&mut self, grad_preds: &Array3<f64>) -> Result<()> {
        self.ensure_buffers();
        let cache = self.cache.take().ok_or_else(|| {
            VitalError::TrainingError("backward called without a cached forward pass".to_string())
        })?;
        let (b, t, w) = grad_preds.dim();
        if b != cache.batch || t != cache.time || w != self.config.output_width {
            return Err(VitalError::ShapeError {
                expected: format!(
                    "gradient of shape ({}, {}, {})",
                    cache.batch, cache.time, self.config.output_width
                ),
                actual: format!("{:?}", grad_preds.dim()),
            });
        }

        let mut delta = Self::flatten(grad_preds);
        for i in (0..self.weights.len()).rev() {
            let a_prev = &cache.activations[i];
            self.grads_w[i] = &self.grads_w[i] + &a_prev.t().dot(&delta);
            self.grads_b[i] = &self.grads_b[i] + &delta.sum_axis(ndarray::Axis(0));

            if i > 0 {
                let relu_grad = cache.z_values[i - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                delta = delta.dot(&self.weights[i].t()) * relu_grad;
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        self.ensure_buffers();
        let lr = self.config.learning_rate;
        let momentum = self.config.momentum;
        for i in 0..self.weights.len() {
            self.velocities_w[i] = &self.velocities_w[i] * momentum - &self.grads_w[i] * lr;
            self.velocities_b[i] = &self.velocities_b[i] * momentum - &self.grads_b[i] * lr;
            self.weights[i] = &self.weights[i] + &self.velocities_w[i];
            self.biases[i] = &self.biases[i] + &self.velocities_b[i];
            self.grads_w[i].fill(0.0);
            self.grads_b[i].fill(0.0);
        }
        Ok(())
    }

    fn state_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn load_state_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let restored: TimestepMlp = serde_json::from_slice(bytes)?;
        *self = restored;
        Ok(())
    }
}
