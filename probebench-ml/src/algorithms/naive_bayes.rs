//! Gaussian naive Bayes.

use super::{Classifier, check_fit_input, check_predict_input, encode_labels};
use crate::error::MlError;
use ndarray::{Array2, ArrayView2, Axis};

/// Per-class, per-feature normal likelihoods with a class prior.
///
/// Every variance is padded by `var_smoothing` times the largest feature
/// variance of the whole training set.
#[derive(Debug, Clone)]
pub struct GaussianNaiveBayes {
    var_smoothing: f64,
    fitted: Option<Fitted>,
}

#[derive(Debug, Clone)]
struct Fitted {
    means: Array2<f64>,
    variances: Array2<f64>,
    log_priors: Vec<f64>,
    classes: Vec<usize>,
}

impl GaussianNaiveBayes {
    pub fn new(var_smoothing: f64) -> Self {
        Self {
            var_smoothing,
            fitted: None,
        }
    }
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &str {
        "naive_bayes"
    }

    fn fit(&mut self, features: ArrayView2<'_, f32>, labels: &[usize]) -> Result<(), MlError> {
        self.fitted = None;
        check_fit_input(self.name(), features, labels)?;
        let x = features.mapv(f64::from);
        let (classes, encoded) = encode_labels(labels);
        let (n, d) = x.dim();

        let mut means = Array2::<f64>::zeros((classes.len(), d));
        let mut variances = Array2::<f64>::zeros((classes.len(), d));
        let mut counts = vec![0usize; classes.len()];
        for (row, &class) in x.axis_iter(Axis(0)).zip(&encoded) {
            let mut mean = means.row_mut(class);
            mean += &row;
            counts[class] += 1;
        }
        for (mut mean, &count) in means.axis_iter_mut(Axis(0)).zip(&counts) {
            mean /= count as f64;
        }
        for (row, &class) in x.axis_iter(Axis(0)).zip(&encoded) {
            let diff = &row - &means.row(class);
            let mut var = variances.row_mut(class);
            var += &diff.mapv(|v| v * v);
        }
        for (mut var, &count) in variances.axis_iter_mut(Axis(0)).zip(&counts) {
            var /= count as f64;
        }

        let max_variance = x
            .var_axis(Axis(0), 0.0)
            .iter()
            .copied()
            .fold(0.0_f64, f64::max);
        // constant features everywhere would otherwise give zero variance
        let epsilon = (self.var_smoothing * max_variance).max(f64::MIN_POSITIVE);
        variances.mapv_inplace(|v| v + epsilon);

        let log_priors = counts
            .iter()
            .map(|&c| (c as f64 / n as f64).ln())
            .collect();
        self.fitted = Some(Fitted {
            means,
            variances,
            log_priors,
            classes,
        });
        Ok(())
    }

    fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<usize>, MlError> {
        check_predict_input(
            self.name(),
            self.fitted.as_ref().map(|f| f.means.ncols()),
            features,
        )?;
        let Some(fitted) = &self.fitted else {
            return Ok(Vec::new());
        };
        let log_norm: Vec<f64> = fitted
            .variances
            .axis_iter(Axis(0))
            .map(|var| -0.5 * var.iter().map(|v| (2.0 * std::f64::consts::PI * v).ln()).sum::<f64>())
            .collect();

        Ok(features
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best = (f64::NEG_INFINITY, 0);
                for class in 0..fitted.classes.len() {
                    let mean = fitted.means.row(class);
                    let var = fitted.variances.row(class);
                    let sq: f64 = row
                        .iter()
                        .zip(mean.iter().zip(var.iter()))
                        .map(|(&x, (&m, &v))| {
                            let d = f64::from(x) - m;
                            d * d / v
                        })
                        .sum();
                    let score = fitted.log_priors[class] + log_norm[class] - 0.5 * sq;
                    if score > best.0 {
                        best = (score, class);
                    }
                }
                fitted.classes[best.1]
            })
            .collect())
    }
}
