//! Training callbacks: progress logging and anomaly detection.

use crate::training::metrics::{EpochSummary, PassSummary};

/// Action a callback can request at an epoch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Running state of the current training pass after one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProgress {
    pub epoch: usize,
    /// 1-based index of the batch just processed.
    pub batch: usize,
    pub num_batches: usize,
    pub batch_loss: f64,
    /// Running averages over the pass so far.
    pub running: PassSummary,
    pub learning_rate: f64,
}

/// Observer hooks for the training controller.
pub trait TrainingCallback {
    fn on_batch_end(&mut self, _progress: &BatchProgress) {}

    /// Called after the checkpoint decision for each epoch.
    fn on_epoch_end(&mut self, summary: &EpochSummary) -> CallbackAction;
}

/// Emits a debug line every `every` batches.
#[derive(Debug, Clone)]
pub struct LoggingCallback {
    pub every: usize,
}

impl LoggingCallback {
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1) }
    }
}

impl TrainingCallback for LoggingCallback {
    fn on_batch_end(&mut self, progress: &BatchProgress) {
        if progress.batch % self.every == 0 || progress.batch == progress.num_batches {
            tracing::debug!(
                epoch = progress.epoch,
                batch = progress.batch,
                num_batches = progress.num_batches,
                loss = format_args!("{:.3}", progress.running.loss),
                accuracy = format_args!("{:.2}", progress.running.accuracy),
                lr = progress.learning_rate,
                "Training progress"
            );
        }
    }

    fn on_epoch_end(&mut self, _summary: &EpochSummary) -> CallbackAction {
        CallbackAction::Continue
    }
}

/// Stops training once a batch or epoch loss goes non-finite. Finite loss
/// jumps, however large, never stop the run.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetectionCallback {
    tripped: bool,
}

impl AnomalyDetectionCallback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrainingCallback for AnomalyDetectionCallback {
    fn on_batch_end(&mut self, progress: &BatchProgress) {
        if !progress.batch_loss.is_finite() {
            self.tripped = true;
        }
    }

    fn on_epoch_end(&mut self, summary: &EpochSummary) -> CallbackAction {
        if self.tripped || !summary.train.loss.is_finite() {
            tracing::warn!(
                epoch = summary.epoch,
                loss = summary.train.loss,
                "Non-finite training loss, stopping"
            );
            return CallbackAction::Stop;
        }
        CallbackAction::Continue
    }
}
