//! Training metrics tracking.

use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Average loss and accuracy (percent) of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub loss: f64,
    pub accuracy: f64,
}

/// Running loss/accuracy counters for one pass over a data stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricAccumulator {
    cumulative_loss: f64,
    correct: usize,
    total: usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold in one batch: its loss, predicted labels, and target labels.
    pub fn update(
        &mut self,
        batch_loss: f64,
        predictions: &[usize],
        targets: &[usize],
    ) -> Result<(), MlError> {
        if predictions.len() != targets.len() {
            return Err(MlError::invalid_input(format!(
                "{} predictions for {} targets",
                predictions.len(),
                targets.len()
            )));
        }
        self.cumulative_loss += batch_loss;
        self.total += targets.len();
        self.correct += predictions
            .iter()
            .zip(targets)
            .filter(|(p, t)| p == t)
            .count();
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    /// `(cumulative_loss / total, 100 * correct / total)`; `None` before any update.
    pub fn summary(&self) -> Option<PassSummary> {
        if self.total == 0 {
            return None;
        }
        let total = self.total as f64;
        Some(PassSummary {
            loss: self.cumulative_loss / total,
            accuracy: 100.0 * self.correct as f64 / total,
        })
    }
}

/// Everything known at the end of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 0-based epoch index.
    pub epoch: usize,
    pub total_epochs: usize,
    pub train: PassSummary,
    pub validation: PassSummary,
    /// Learning rate used during this epoch's training pass.
    pub learning_rate: f64,
    /// Best validation accuracy so far, including this epoch.
    pub best_accuracy: f64,
    /// Whether this epoch produced a new checkpoint.
    pub improved: bool,
    pub elapsed_ms: u64,
}

/// Per-epoch history of a training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub accuracy_history: Vec<f64>,
    pub val_loss_history: Vec<f64>,
    pub val_accuracy_history: Vec<f64>,
    pub learning_rate_history: Vec<f64>,
    pub best_epoch: Option<usize>,
    pub best_accuracy: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    pub fn record_epoch(&mut self, summary: &EpochSummary) {
        self.loss_history.push(summary.train.loss);
        self.accuracy_history.push(summary.train.accuracy);
        self.val_loss_history.push(summary.validation.loss);
        self.val_accuracy_history.push(summary.validation.accuracy);
        self.learning_rate_history.push(summary.learning_rate);
        self.epochs_completed += 1;
        self.total_training_time_secs += summary.elapsed_ms as f64 / 1000.0;

        let acc = summary.validation.accuracy;
        if self.best_accuracy.is_none_or(|best| acc > best) {
            self.best_accuracy = Some(acc);
            self.best_epoch = Some(summary.epoch);
        }
    }
}
