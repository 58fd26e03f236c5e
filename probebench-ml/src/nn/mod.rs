//! Network and optimizer capabilities.
//!
//! The training controller and feature extractor only ever see [`Network`] and
//! [`Optimizer`]; any architecture that can produce logits plus a feature
//! representation and back-propagate into its own gradient buffers can be
//! plugged in. [`Mlp`] and [`Sgd`] are the reference implementations the CLI uses.

pub mod loss;
pub mod mlp;
pub mod optimizer;

pub use loss::{CrossEntropy, LossOutput, argmax_rows};
pub use mlp::Mlp;
pub use optimizer::{Optimizer, Sgd, SgdConfig};

use crate::error::MlError;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Whether a network records activations for back-propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Train,
    /// Frozen: no activation caching, `backward` is rejected.
    Eval,
}

/// Output of one forward pass over a batch.
#[derive(Debug, Clone)]
pub struct Forward {
    /// Penultimate representation, `[batch, feature_dim]`.
    pub features: Array2<f32>,
    /// Class scores, `[batch, num_classes]`.
    pub logits: Array2<f32>,
}

/// A trainable tensor together with its gradient buffer.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub value: Array2<f32>,
    pub grad: Array2<f32>,
}

impl Parameter {
    pub fn new(value: Array2<f32>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self { value, grad }
    }

    /// Zero-filled gradient buffer matching `value`.
    pub fn reset_grad(&mut self) {
        self.grad = Array2::zeros(self.value.raw_dim());
    }
}

/// Opaque trainable function from an input batch to class logits.
pub trait Network {
    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    fn num_classes(&self) -> usize;

    fn feature_dim(&self) -> usize;

    /// Run a batch of flattened inputs `[batch, input_dim]`.
    fn forward(&mut self, inputs: ArrayView2<'_, f32>) -> Result<Forward, MlError>;

    /// Back-propagate `d loss / d logits` for the most recent `Train`-mode
    /// forward pass, overwriting every parameter's gradient buffer.
    fn backward(&mut self, grad_logits: ArrayView2<'_, f32>) -> Result<(), MlError>;

    /// Trainable parameters in a stable order.
    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    /// Serialize all weights.
    fn state(&self) -> Result<Vec<u8>, MlError>;

    /// Replace all weights with a blob produced by [`Network::state`].
    fn load_state(&mut self, blob: &[u8]) -> Result<(), MlError>;
}

/// Builds fresh, untrained networks.
pub trait NetworkFactory {
    fn build(&self) -> Result<Box<dyn Network>, MlError>;
}

impl<F> NetworkFactory for F
where
    F: Fn() -> Result<Box<dyn Network>, MlError>,
{
    fn build(&self) -> Result<Box<dyn Network>, MlError> {
        self()
    }
}
