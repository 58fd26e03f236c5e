//! Checkpoint gate: decides whether the base network must be trained at all.

use crate::config::BenchConfig;
use crate::data::{Augmentation, DataLoader, DatasetProvider, LoaderOptions, Split};
use crate::error::MlError;
use crate::nn::{NetworkFactory, Sgd, SgdConfig};
use crate::training::callbacks::{AnomalyDetectionCallback, LoggingCallback};
use crate::training::checkpoint::{CheckpointStore, CheckpointSummary};
use crate::training::reproducibility::{SeedManager, components};
use crate::training::runner::{TrainingController, TrainingOutcome};

/// What [`CheckpointGate::ensure_trained`] did.
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// A valid record existed; no training ran.
    Reused(CheckpointSummary),
    /// Training ran; `passed` is the training-stage success predicate.
    Trained {
        outcome: TrainingOutcome,
        passed: bool,
    },
}

impl GateDecision {
    /// False only when training ran and missed the floor.
    pub fn passed(&self) -> bool {
        match self {
            Self::Reused(_) => true,
            Self::Trained { passed, .. } => *passed,
        }
    }

    pub fn trained(&self) -> bool {
        matches!(self, Self::Trained { .. })
    }
}

pub struct CheckpointGate<'a> {
    config: &'a BenchConfig,
    store: CheckpointStore,
}

impl<'a> CheckpointGate<'a> {
    pub fn new(config: &'a BenchConfig) -> Self {
        Self {
            config,
            store: CheckpointStore::new(config.checkpoint.path.clone()),
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Reuse a valid checkpoint or train a fresh network into the store.
    ///
    /// A record that fails verification is treated as absent. I/O faults
    /// while reading or writing the store are returned as errors.
    pub fn ensure_trained(
        &self,
        provider: &dyn DatasetProvider,
        factory: &dyn NetworkFactory,
    ) -> Result<GateDecision, MlError> {
        let floor = self.config.quality.training_floor;
        match self.store.load() {
            Ok(Some(record)) => {
                if self.config.checkpoint.revalidate_accuracy && record.accuracy <= floor {
                    tracing::warn!(
                        path = %self.store.path().display(),
                        accuracy = record.accuracy,
                        floor,
                        "Checkpoint accuracy does not clear the training floor, retraining"
                    );
                } else {
                    tracing::info!(
                        path = %self.store.path().display(),
                        accuracy = record.accuracy,
                        epoch = record.epoch,
                        "Checkpoint found, skipping training"
                    );
                    return Ok(GateDecision::Reused(record.summary(self.store.path())));
                }
            }
            Ok(None) => {
                tracing::info!(
                    path = %self.store.path().display(),
                    "No checkpoint found, training from scratch"
                );
            }
            Err(e @ MlError::CorruptCheckpoint { .. }) => {
                tracing::warn!(error = %e, "Ignoring unreadable checkpoint, retraining");
            }
            Err(e) => return Err(e),
        }
        self.train(provider, factory)
    }

    fn train(
        &self,
        provider: &dyn DatasetProvider,
        factory: &dyn NetworkFactory,
    ) -> Result<GateDecision, MlError> {
        let recipe = &self.config.recipe;
        let mut seeds = SeedManager::new(self.config.seed);

        let mut train = DataLoader::new(
            provider.dataset(Split::Train)?,
            provider.pipeline(Augmentation::Train),
            LoaderOptions {
                batch_size: recipe.batch_size,
                shuffle: true,
                drop_last: recipe.drop_last,
                seed: seeds.get_seed(components::TRAIN_LOADER),
            },
        )?;
        let mut validation = DataLoader::new(
            provider.dataset(Split::Test)?,
            provider.pipeline(Augmentation::Eval),
            LoaderOptions {
                seed: seeds.get_seed(components::VALIDATION_LOADER),
                ..LoaderOptions::sequential(recipe.batch_size)
            },
        )?;

        let mut network = factory.build()?;
        let mut optimizer = Sgd::new(SgdConfig::from(recipe));
        let mut controller = TrainingController::new(recipe.clone(), self.store.clone())
            .with_callback(Box::new(LoggingCallback::new(recipe.log_every_batches)))
            .with_callback(Box::new(AnomalyDetectionCallback::new()));

        let outcome = controller.run(network.as_mut(), &mut optimizer, &mut train, &mut validation)?;
        let passed = outcome.passed(self.config.quality.training_floor);
        if passed {
            tracing::info!(
                best_accuracy = outcome.best_accuracy,
                floor = self.config.quality.training_floor,
                "Training passed"
            );
        } else {
            tracing::error!(
                best_accuracy = outcome.best_accuracy,
                floor = self.config.quality.training_floor,
                "Training did not reach the accuracy floor"
            );
        }
        Ok(GateDecision::Trained { outcome, passed })
    }
}
