//! Training controller: epochs, validation, schedule, best-model checkpointing.

use crate::config::TrainingRecipe;
use crate::data::DataLoader;
use crate::error::MlError;
use crate::nn::{CrossEntropy, Mode, Network, Optimizer};
use crate::training::callbacks::{BatchProgress, CallbackAction, TrainingCallback};
use crate::training::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::training::metrics::{EpochSummary, MetricAccumulator, PassSummary, TrainingMetrics};
use crate::training::schedule::MultiStepSchedule;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Result of one controller invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// Highest validation accuracy seen; 0 when no epoch improved on 0.
    pub best_accuracy: f64,
    /// Epoch whose state is in the checkpoint store, if any was written.
    pub best_epoch: Option<usize>,
    pub epochs_run: usize,
    /// A callback requested an early stop.
    pub stopped_early: bool,
    pub metrics: TrainingMetrics,
}

impl TrainingOutcome {
    /// Training-stage success predicate: `best_accuracy > floor`.
    pub fn passed(&self, floor: f64) -> bool {
        self.best_accuracy > floor
    }
}

/// Runs the recipe's epochs against a network and commits every strict
/// validation improvement to the checkpoint store.
pub struct TrainingController {
    recipe: TrainingRecipe,
    store: CheckpointStore,
    loss: CrossEntropy,
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl TrainingController {
    pub fn new(recipe: TrainingRecipe, store: CheckpointStore) -> Self {
        Self {
            recipe,
            store,
            loss: CrossEntropy,
            callbacks: Vec::new(),
        }
    }

    pub fn with_callback(mut self, callback: Box<dyn TrainingCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn run(
        &mut self,
        network: &mut dyn Network,
        optimizer: &mut dyn Optimizer,
        train: &mut DataLoader,
        validation: &mut DataLoader,
    ) -> Result<TrainingOutcome, MlError> {
        let total_epochs = self.recipe.epochs;
        let mut schedule = MultiStepSchedule::from_recipe(&self.recipe);
        let mut metrics = TrainingMetrics::default();
        let mut best_accuracy = 0.0_f64;
        let mut best_epoch = None;
        let mut stopped_early = false;

        tracing::info!(
            epochs = total_epochs,
            train_samples = train.num_samples(),
            validation_samples = validation.num_samples(),
            checkpoint = %self.store.path().display(),
            "Starting training"
        );

        for epoch in 0..total_epochs {
            let started = Instant::now();
            optimizer.set_learning_rate_multiplier(schedule.current_multiplier());
            let learning_rate = optimizer.learning_rate();

            let train_summary = self.train_epoch(epoch, network, optimizer, train, learning_rate)?;
            let val_summary = self.validate(network, validation)?;

            let improved = val_summary.accuracy > best_accuracy;
            if improved {
                best_accuracy = val_summary.accuracy;
                best_epoch = Some(epoch);
                let record = CheckpointRecord::new(network.state()?, best_accuracy, epoch);
                self.store.save(&record)?;
                tracing::info!(
                    epoch,
                    accuracy = best_accuracy,
                    path = %self.store.path().display(),
                    "Saved new best checkpoint"
                );
            }

            let summary = EpochSummary {
                epoch,
                total_epochs,
                train: train_summary,
                validation: val_summary,
                learning_rate,
                best_accuracy,
                improved,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            metrics.record_epoch(&summary);
            tracing::info!(
                epoch = epoch + 1,
                total_epochs,
                train_loss = format_args!("{:.4}", summary.train.loss),
                train_acc = format_args!("{:.2}", summary.train.accuracy),
                val_loss = format_args!("{:.4}", summary.validation.loss),
                val_acc = format_args!("{:.2}", summary.validation.accuracy),
                lr = learning_rate,
                best_acc = format_args!("{:.2}", best_accuracy),
                "Epoch complete"
            );

            schedule.step();

            let mut stop = false;
            for callback in &mut self.callbacks {
                if callback.on_epoch_end(&summary) == CallbackAction::Stop {
                    stop = true;
                }
            }
            if stop && epoch + 1 < total_epochs {
                tracing::warn!(epoch, "Training stopped early by callback");
                stopped_early = true;
                break;
            }
        }

        Ok(TrainingOutcome {
            best_accuracy,
            best_epoch,
            epochs_run: metrics.epochs_completed,
            stopped_early,
            metrics,
        })
    }

    fn train_epoch(
        &mut self,
        epoch: usize,
        network: &mut dyn Network,
        optimizer: &mut dyn Optimizer,
        loader: &mut DataLoader,
        learning_rate: f64,
    ) -> Result<PassSummary, MlError> {
        network.set_mode(Mode::Train);
        let num_batches = loader.num_batches();
        let mut acc = MetricAccumulator::new();

        for (index, batch) in loader.iter().enumerate() {
            let batch = batch?;
            let forward = network.forward(batch.inputs.view())?;
            let out = self.loss.with_grad(forward.logits.view(), &batch.labels)?;
            let grad = out
                .grad
                .ok_or_else(|| MlError::training("loss produced no gradient"))?;
            network.backward(grad.view())?;
            optimizer.step(network)?;
            // weight the batch mean so a short final batch counts per sample
            acc.update(out.loss * batch.len() as f64, &out.predictions, &batch.labels)?;

            if let Some(running) = acc.summary() {
                let progress = BatchProgress {
                    epoch,
                    batch: index + 1,
                    num_batches,
                    batch_loss: out.loss,
                    running,
                    learning_rate,
                };
                for callback in &mut self.callbacks {
                    callback.on_batch_end(&progress);
                }
            }
        }

        acc.summary()
            .ok_or_else(|| MlError::training("training stream produced no batches"))
    }

    fn validate(
        &self,
        network: &mut dyn Network,
        loader: &mut DataLoader,
    ) -> Result<PassSummary, MlError> {
        network.set_mode(Mode::Eval);
        let mut acc = MetricAccumulator::new();
        for batch in loader.iter() {
            let batch = batch?;
            let forward = network.forward(batch.inputs.view())?;
            let out = self.loss.evaluate(forward.logits.view(), &batch.labels)?;
            acc.update(out.loss * batch.len() as f64, &out.predictions, &batch.labels)?;
        }
        acc.summary()
            .ok_or_else(|| MlError::training("validation stream produced no batches"))
    }
}
