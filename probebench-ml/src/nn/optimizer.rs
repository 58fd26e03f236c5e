//! Gradient-update step behind a small capability trait.

use super::Network;
use crate::error::MlError;
use ndarray::Array2;

/// Applies gradient updates computed by [`Network::backward`].
pub trait Optimizer {
    /// Apply one update from the network's current gradient buffers.
    fn step(&mut self, network: &mut dyn Network) -> Result<(), MlError>;

    /// Effective learning rate (base rate times the schedule multiplier).
    fn learning_rate(&self) -> f64;

    fn set_learning_rate_multiplier(&mut self, multiplier: f64);
}

/// SGD hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SgdConfig {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub nesterov: bool,
}

impl From<&crate::config::TrainingRecipe> for SgdConfig {
    fn from(recipe: &crate::config::TrainingRecipe) -> Self {
        Self {
            learning_rate: recipe.learning_rate,
            momentum: recipe.momentum,
            weight_decay: recipe.weight_decay,
            nesterov: recipe.nesterov,
        }
    }
}

/// Stochastic gradient descent with momentum and L2 weight decay.
///
/// Update per parameter `p` with gradient `g`:
/// `g += wd * p; buf = momentum * buf + g; p -= lr * (nesterov ? g + momentum * buf : buf)`.
#[derive(Debug, Clone)]
pub struct Sgd {
    config: SgdConfig,
    multiplier: f64,
    /// Momentum buffers, indexed like `Network::parameters_mut`.
    velocity: Vec<Array2<f32>>,
}

impl Sgd {
    pub fn new(config: SgdConfig) -> Self {
        Self {
            config,
            multiplier: 1.0,
            velocity: Vec::new(),
        }
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, network: &mut dyn Network) -> Result<(), MlError> {
        let lr = self.learning_rate() as f32;
        let momentum = self.config.momentum as f32;
        let weight_decay = self.config.weight_decay as f32;
        let params = network.parameters_mut();

        if self.velocity.is_empty() {
            self.velocity = params
                .iter()
                .map(|p| Array2::zeros(p.value.raw_dim()))
                .collect();
        } else if self.velocity.len() != params.len() {
            return Err(MlError::training(format!(
                "optimizer tracks {} parameters but the network exposes {}",
                self.velocity.len(),
                params.len()
            )));
        }

        for (param, buf) in params.into_iter().zip(self.velocity.iter_mut()) {
            if param.grad.raw_dim() != param.value.raw_dim() || buf.raw_dim() != param.value.raw_dim()
            {
                return Err(MlError::training("gradient shape does not match its parameter"));
            }
            let mut grad = param.grad.clone();
            if weight_decay != 0.0 {
                grad.scaled_add(weight_decay, &param.value);
            }
            if momentum != 0.0 {
                *buf *= momentum;
                *buf += &grad;
                if self.config.nesterov {
                    grad.scaled_add(momentum, &*buf);
                } else {
                    grad.assign(&*buf);
                }
            }
            param.value.scaled_add(-lr, &grad);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.learning_rate * self.multiplier
    }

    fn set_learning_rate_multiplier(&mut self, multiplier: f64) {
        self.multiplier = multiplier;
    }
}
