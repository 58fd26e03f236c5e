//! Fully connected ReLU network over flattened images.

use super::{Forward, Mode, Network, Parameter};
use crate::error::MlError;
use ndarray::{Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

const STATE_MAGIC: &[u8; 8] = b"PBMLP001";

#[derive(Debug, Clone)]
struct Dense {
    weights: Parameter,
    bias: Parameter,
}

impl Dense {
    fn he_uniform(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Self {
        let bound = (6.0 / fan_in as f32).sqrt();
        let dist = Uniform::new(-bound, bound);
        let weights = Array2::from_shape_simple_fn((fan_in, fan_out), || dist.sample(&mut *rng));
        Self {
            weights: Parameter::new(weights),
            bias: Parameter::new(Array2::zeros((1, fan_out))),
        }
    }

    fn apply(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        x.dot(&self.weights.value) + &self.bias.value
    }
}

/// Multi-layer perceptron: `input -> (dense -> relu)* -> dense -> logits`.
///
/// The last hidden activation is the feature representation.
#[derive(Debug, Clone)]
pub struct Mlp {
    input_dim: usize,
    num_classes: usize,
    layers: Vec<Dense>,
    mode: Mode,
    /// Layer inputs from the last `Train`-mode forward pass.
    cache: Option<Vec<Array2<f32>>>,
}

impl Mlp {
    pub fn new(
        input_dim: usize,
        hidden_layers: &[usize],
        num_classes: usize,
        seed: u64,
    ) -> Result<Self, MlError> {
        if input_dim == 0 || num_classes == 0 || hidden_layers.is_empty() {
            return Err(MlError::model(
                "an MLP needs a non-empty input, at least one hidden layer, and classes",
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut widths = Vec::with_capacity(hidden_layers.len() + 2);
        widths.push(input_dim);
        widths.extend_from_slice(hidden_layers);
        widths.push(num_classes);
        let layers = widths
            .windows(2)
            .map(|w| Dense::he_uniform(w[0], w[1], &mut rng))
            .collect();
        Ok(Self {
            input_dim,
            num_classes,
            layers,
            mode: Mode::Train,
            cache: None,
        })
    }

    fn hidden(&self) -> &[Dense] {
        &self.layers[..self.layers.len() - 1]
    }
}

fn relu_inplace(x: &mut Array2<f32>) {
    x.mapv_inplace(|v| v.max(0.0));
}

impl Network for Mlp {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if mode == Mode::Eval {
            self.cache = None;
        }
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn feature_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].weights.value.nrows()
    }

    fn forward(&mut self, inputs: ArrayView2<'_, f32>) -> Result<Forward, MlError> {
        if inputs.ncols() != self.input_dim {
            return Err(MlError::model(format!(
                "expected {} input features, got {}",
                self.input_dim,
                inputs.ncols()
            )));
        }
        let training = self.mode == Mode::Train;
        let mut cache = Vec::with_capacity(self.layers.len());

        let mut activation = inputs.to_owned();
        for layer in self.hidden() {
            let mut next = layer.apply(activation.view());
            relu_inplace(&mut next);
            if training {
                cache.push(activation);
            }
            activation = next;
        }
        let head = &self.layers[self.layers.len() - 1];
        let logits = head.apply(activation.view());

        if training {
            cache.push(activation.clone());
            self.cache = Some(cache);
        }
        Ok(Forward {
            features: activation,
            logits,
        })
    }

    fn backward(&mut self, grad_logits: ArrayView2<'_, f32>) -> Result<(), MlError> {
        if self.mode != Mode::Train {
            return Err(MlError::model("backward called on a network in eval mode"));
        }
        let cache = self
            .cache
            .take()
            .ok_or_else(|| MlError::model("backward called without a preceding forward pass"))?;
        if cache.len() != self.layers.len() || grad_logits.nrows() != cache[0].nrows() {
            return Err(MlError::model("gradient does not match the cached forward pass"));
        }

        let mut grad = grad_logits.to_owned();
        for (idx, layer) in self.layers.iter_mut().enumerate().rev() {
            let input = &cache[idx];
            layer.weights.grad = input.t().dot(&grad);
            layer.bias.grad = grad.sum_axis(Axis(0)).insert_axis(Axis(0));
            if idx > 0 {
                let mut upstream = grad.dot(&layer.weights.value.t());
                // `input` is a post-ReLU activation
                ndarray::Zip::from(&mut upstream)
                    .and(input)
                    .for_each(|g, &a| {
                        if a <= 0.0 {
                            *g = 0.0;
                        }
                    });
                grad = upstream;
            }
        }
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.layers
            .iter_mut()
            .flat_map(|l| [&mut l.weights, &mut l.bias])
            .collect()
    }

    fn state(&self) -> Result<Vec<u8>, MlError> {
        let mut out = Vec::new();
        out.extend_from_slice(STATE_MAGIC);
        out.extend_from_slice(&(self.layers.len() as u32).to_le_bytes());
        for layer in &self.layers {
            for param in [&layer.weights, &layer.bias] {
                let (rows, cols) = param.value.dim();
                out.extend_from_slice(&(rows as u32).to_le_bytes());
                out.extend_from_slice(&(cols as u32).to_le_bytes());
                for v in param.value.iter() {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        Ok(out)
    }

    fn load_state(&mut self, blob: &[u8]) -> Result<(), MlError> {
        let mut reader = StateReader { blob, pos: 0 };
        if reader.take(STATE_MAGIC.len())? != STATE_MAGIC {
            return Err(MlError::model("state blob is not an MLP state"));
        }
        let layer_count = reader.u32()? as usize;
        if layer_count != self.layers.len() {
            return Err(MlError::model(format!(
                "state has {layer_count} layers, network has {}",
                self.layers.len()
            )));
        }
        let mut loaded = Vec::with_capacity(layer_count * 2);
        for param in self.parameters_mut() {
            let rows = reader.u32()? as usize;
            let cols = reader.u32()? as usize;
            if (rows, cols) != param.value.dim() {
                return Err(MlError::model(format!(
                    "parameter shape {rows}x{cols} does not match {:?}",
                    param.value.dim()
                )));
            }
            let values = reader
                .take(rows * cols * 4)?
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect::<Vec<_>>();
            loaded.push(Array2::from_shape_vec((rows, cols), values)?);
        }
        if reader.pos != blob.len() {
            return Err(MlError::model("trailing bytes after MLP state"));
        }
        for (param, value) in self.parameters_mut().into_iter().zip(loaded) {
            param.value = value;
            param.reset_grad();
        }
        self.cache = None;
        Ok(())
    }
}

struct StateReader<'a> {
    blob: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], MlError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.blob.len())
            .ok_or_else(|| MlError::model("truncated MLP state"))?;
        let slice = &self.blob[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, MlError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{CrossEntropy, Optimizer, Sgd, SgdConfig};
    use ndarray::array;

    #[test]
    fn test_forward_shapes() {
        let mut net = Mlp::new(6, &[8, 4], 3, 1).unwrap();
        let out = net.forward(Array2::<f32>::ones((5, 6)).view()).unwrap();
        assert_eq!(out.features.dim(), (5, 4));
        assert_eq!(out.logits.dim(), (5, 3));
        assert_eq!(net.feature_dim(), 4);
        assert_eq!(net.parameters_mut().len(), 6);
    }

    #[test]
    fn test_eval_mode_rejects_backward() {
        let mut net = Mlp::new(2, &[4], 2, 1).unwrap();
        net.set_mode(Mode::Eval);
        let out = net.forward(array![[1.0f32, 2.0]].view()).unwrap();
        assert!(net.backward(out.logits.view()).is_err());
    }

    #[test]
    fn test_state_roundtrip_reproduces_outputs() {
        let mut a = Mlp::new(4, &[6], 3, 7).unwrap();
        let mut b = Mlp::new(4, &[6], 3, 99).unwrap();
        let x = array![[0.5f32, -1.0, 2.0, 0.0]];
        a.set_mode(Mode::Eval);
        b.set_mode(Mode::Eval);

        b.load_state(&a.state().unwrap()).unwrap();
        let ya = a.forward(x.view()).unwrap().logits;
        let yb = b.forward(x.view()).unwrap().logits;
        assert_eq!(ya, yb);
    }

    #[test]
    fn test_load_state_rejects_other_shapes() {
        let a = Mlp::new(4, &[6], 3, 7).unwrap();
        let mut b = Mlp::new(4, &[5], 3, 7).unwrap();
        assert!(b.load_state(&a.state().unwrap()).is_err());
        assert!(b.load_state(b"garbage").is_err());
    }

    #[test]
    fn test_training_steps_reduce_loss() {
        // two linearly separable blobs
        let x = array![
            [1.0f32, 1.0],
            [1.2, 0.8],
            [0.9, 1.1],
            [-1.0, -1.0],
            [-1.1, -0.9],
            [-0.8, -1.2]
        ];
        let y = [0usize, 0, 0, 1, 1, 1];
        let mut net = Mlp::new(2, &[8], 2, 3).unwrap();
        let mut opt = Sgd::new(SgdConfig {
            learning_rate: 0.1,
            momentum: 0.9,
            weight_decay: 0.0,
            nesterov: true,
        });

        let first = CrossEntropy
            .with_grad(net.forward(x.view()).unwrap().logits.view(), &y)
            .unwrap()
            .loss;
        for _ in 0..50 {
            let out = net.forward(x.view()).unwrap();
            let loss = CrossEntropy.with_grad(out.logits.view(), &y).unwrap();
            net.backward(loss.grad.as_ref().unwrap().view()).unwrap();
            opt.step(&mut net).unwrap();
        }
        let last = CrossEntropy
            .evaluate(net.forward(x.view()).unwrap().logits.view(), &y)
            .unwrap();
        assert!(last.loss < first);
        assert_eq!(last.predictions, y.to_vec());
    }
}
