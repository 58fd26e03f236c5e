//! Softmax cross-entropy, averaged over the batch.

use crate::error::MlError;
use ndarray::{Array2, ArrayView2, Axis};

/// Loss value for one batch plus what the accumulator and optimizer need.
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Mean negative log-likelihood over the batch.
    pub loss: f64,
    /// Row-wise argmax of the logits.
    pub predictions: Vec<usize>,
    /// `d loss / d logits`; present only when requested.
    pub grad: Option<Array2<f32>>,
}

/// Mean softmax cross-entropy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Loss and predictions without a gradient (validation passes).
    pub fn evaluate(
        &self,
        logits: ArrayView2<'_, f32>,
        targets: &[usize],
    ) -> Result<LossOutput, MlError> {
        self.compute(logits, targets, false)
    }

    /// Loss, predictions, and `d loss / d logits` (training passes).
    pub fn with_grad(
        &self,
        logits: ArrayView2<'_, f32>,
        targets: &[usize],
    ) -> Result<LossOutput, MlError> {
        self.compute(logits, targets, true)
    }

    fn compute(
        &self,
        logits: ArrayView2<'_, f32>,
        targets: &[usize],
        want_grad: bool,
    ) -> Result<LossOutput, MlError> {
        let (rows, classes) = logits.dim();
        if rows != targets.len() {
            return Err(MlError::invalid_input(format!(
                "logits have {rows} rows but {} targets were given",
                targets.len()
            )));
        }
        if rows == 0 {
            return Err(MlError::invalid_input("empty batch"));
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= classes) {
            return Err(MlError::invalid_input(format!(
                "target {bad} out of range for {classes} classes"
            )));
        }

        let probs = softmax_rows(logits);
        let mut total = 0.0f64;
        for (row, &target) in probs.axis_iter(Axis(0)).zip(targets) {
            total -= f64::from(row[target].max(f32::MIN_POSITIVE)).ln();
        }

        let grad = want_grad.then(|| {
            let mut grad = probs.clone();
            for (mut row, &target) in grad.axis_iter_mut(Axis(0)).zip(targets) {
                row[target] -= 1.0;
            }
            grad /= rows as f32;
            grad
        });

        Ok(LossOutput {
            loss: total / rows as f64,
            predictions: argmax_rows(logits),
            grad,
        })
    }
}

/// Numerically stable row-wise softmax.
pub fn softmax_rows(logits: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Index of the largest value in each row; the first index wins ties.
pub fn argmax_rows(values: ArrayView2<'_, f32>) -> Vec<usize> {
    values
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 { (i, v) } else { best }
                })
                .0
        })
        .collect()
}
