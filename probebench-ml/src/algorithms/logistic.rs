//! Multinomial logistic regression trained by full-batch gradient descent.

use super::{Classifier, check_fit_input, check_predict_input, encode_labels};
use crate::error::MlError;
use crate::nn::{argmax_rows, loss::softmax_rows};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Stop once the loss changes by less than this between iterations.
const TOLERANCE: f64 = 1e-6;

/// Softmax regression on standardized inputs with an L2 penalty on weights.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    l2: f64,
    max_iter: usize,
    learning_rate: f64,
    fitted: Option<Fitted>,
}

#[derive(Debug, Clone)]
struct Fitted {
    mean: Array1<f32>,
    scale: Array1<f32>,
    weights: Array2<f32>,
    bias: Array1<f32>,
    classes: Vec<usize>,
}

impl LogisticRegression {
    pub fn new(l2: f64, max_iter: usize, learning_rate: f64) -> Self {
        Self {
            l2,
            max_iter,
            learning_rate,
            fitted: None,
        }
    }
}

fn standardize(x: ArrayView2<'_, f32>, mean: &Array1<f32>, scale: &Array1<f32>) -> Array2<f32> {
    (&x - mean) / scale
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn fit(&mut self, features: ArrayView2<'_, f32>, labels: &[usize]) -> Result<(), MlError> {
        self.fitted = None;
        check_fit_input(self.name(), features, labels)?;
        if self.max_iter == 0 || !(self.learning_rate > 0.0) {
            return Err(MlError::invalid_input(
                "logistic_regression: max_iter and learning_rate must be positive",
            ));
        }
        let (classes, encoded) = encode_labels(labels);
        let (n, d) = features.dim();
        let k = classes.len();

        let mean = features
            .mean_axis(Axis(0))
            .ok_or_else(|| MlError::invalid_input("logistic_regression: no training samples"))?;
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let x = standardize(features, &mean, &scale);

        let mut targets = Array2::<f32>::zeros((n, k));
        for (i, &c) in encoded.iter().enumerate() {
            targets[[i, c]] = 1.0;
        }

        let mut weights = Array2::<f32>::zeros((d, k));
        let mut bias = Array1::<f32>::zeros(k);
        let lr = self.learning_rate as f32;
        let l2 = self.l2 as f32;
        let mut previous = f64::INFINITY;

        for iter in 0..self.max_iter {
            let logits = x.dot(&weights) + &bias;
            let probs = softmax_rows(logits.view());
            let nll: f64 = probs
                .axis_iter(Axis(0))
                .zip(&encoded)
                .map(|(p, &c)| -f64::from(p[c].max(f32::MIN_POSITIVE)).ln())
                .sum::<f64>()
                / n as f64;
            let loss = nll + 0.5 * self.l2 * f64::from(weights.mapv(|w| w * w).sum());
            if !loss.is_finite() {
                return Err(MlError::training(format!(
                    "logistic_regression diverged at iteration {iter}"
                )));
            }
            if (previous - loss).abs() < TOLERANCE {
                tracing::trace!(iter, loss, "logistic_regression converged");
                break;
            }
            previous = loss;

            let residual = (probs - &targets) / n as f32;
            let grad_w = x.t().dot(&residual) + &(&weights * l2);
            let grad_b = residual.sum_axis(Axis(0));
            weights.scaled_add(-lr, &grad_w);
            bias.scaled_add(-lr, &grad_b);
        }

        self.fitted = Some(Fitted {
            mean,
            scale,
            weights,
            bias,
            classes,
        });
        Ok(())
    }

    fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<usize>, MlError> {
        check_predict_input(
            self.name(),
            self.fitted.as_ref().map(|f| f.weights.nrows()),
            features,
        )?;
        let Some(fitted) = &self.fitted else {
            return Ok(Vec::new());
        };
        let x = standardize(features, &fitted.mean, &fitted.scale);
        let logits = x.dot(&fitted.weights) + &fitted.bias;
        Ok(argmax_rows(logits.view())
            .into_iter()
            .map(|c| fitted.classes[c])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_separates_two_classes() {
        let x = array![[0.0f32, 1.0], [0.2, 0.8], [3.0, -1.0], [3.2, -0.9]];
        let mut clf = LogisticRegression::new(1e-4, 200, 0.5);
        clf.fit(x.view(), &[4, 4, 1, 1]).unwrap();
        assert_eq!(clf.predict(x.view()).unwrap(), vec![4, 4, 1, 1]);
        assert_eq!(
            clf.predict(array![[-1.0f32, 2.0], [5.0, -2.0]].view()).unwrap(),
            vec![4, 1]
        );
    }

    #[test]
    fn test_single_class() {
        let x = array![[0.0f32], [1.0]];
        let mut clf = LogisticRegression::new(1e-4, 10, 0.5);
        clf.fit(x.view(), &[3, 3]).unwrap();
        assert_eq!(clf.predict(x.view()).unwrap(), vec![3, 3]);
    }

    #[test]
    fn test_invalid_hyperparameters() {
        let mut clf = LogisticRegression::new(1e-4, 0, 0.5);
        assert!(clf.fit(array![[0.0f32]].view(), &[0]).is_err());
    }
}
