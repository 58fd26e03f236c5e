//! Two-stage benchmark: checkpoint gate, then frozen-feature classifier comparison.

use super::report::ExperimentReport;
use crate::algorithms::ClassifierEvaluator;
use crate::config::BenchConfig;
use crate::data::{Augmentation, Dataset, DatasetProvider, Split, SubsetSizes, truncate_splits};
use crate::error::MlError;
use crate::features::FeatureExtractor;
use crate::nn::{Network, NetworkFactory};
use crate::training::{CheckpointGate, CheckpointStore, GateDecision};
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::sync::Arc;
use thiserror::Error;

/// Pipeline step an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Training,
    CheckpointLoad,
    DatasetConstruction,
    FeatureExtraction,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Training => write!(f, "training"),
            Self::CheckpointLoad => write!(f, "checkpoint load"),
            Self::DatasetConstruction => write!(f, "dataset construction"),
            Self::FeatureExtraction => write!(f, "feature extraction"),
        }
    }
}

/// Why a run failed.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("best validation accuracy {best_accuracy:.2}% did not exceed the {floor}% floor")]
    TrainingQuality { best_accuracy: f64, floor: f64 },

    #[error("every classifier scored below the {floor}% floor")]
    ClassifierQuality { floor: f64 },

    #[error("{stage} failed: {error}")]
    Stage {
        stage: Stage,
        #[source]
        error: MlError,
    },

    #[error("{0}")]
    Persistence(#[source] MlError),
}

impl RunFailure {
    /// Classify an error raised while running `stage`.
    pub fn at(stage: Stage, error: MlError) -> Self {
        if error.is_persistence_fault() {
            Self::Persistence(error)
        } else {
            Self::Stage { stage, error }
        }
    }

    /// Process exit status for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::TrainingQuality { .. } => 2,
            Self::ClassifierQuality { .. } => 3,
            Self::Stage { .. } => 4,
            Self::Persistence(_) => 5,
        }
    }
}

/// Report plus the failure, if any.
#[derive(Debug)]
pub struct ExperimentOutcome {
    pub report: ExperimentReport,
    pub failure: Option<RunFailure>,
}

impl ExperimentOutcome {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_code(&self) -> u8 {
        self.failure.as_ref().map_or(0, RunFailure::exit_code)
    }
}

/// Runs gate, extraction, evaluation, and the quality gate in order, stopping
/// at the first failure.
pub struct ExperimentOrchestrator<'a> {
    config: &'a BenchConfig,
    provider: &'a dyn DatasetProvider,
    factory: &'a dyn NetworkFactory,
}

impl<'a> ExperimentOrchestrator<'a> {
    pub fn new(
        config: &'a BenchConfig,
        provider: &'a dyn DatasetProvider,
        factory: &'a dyn NetworkFactory,
    ) -> Self {
        Self {
            config,
            provider,
            factory,
        }
    }

    /// Run the whole benchmark. Never panics on stage errors; every failure
    /// ends up in [`ExperimentOutcome::failure`].
    pub fn run(&self) -> ExperimentOutcome {
        tracing::info!(
            dataset = self.provider.name(),
            subset_size = ?self.config.evaluation.subset_size,
            "Running experiment"
        );
        let mut report = ExperimentReport::new(self.provider.name(), self.config.seed);
        let failure = self.execute(&mut report).err();

        match &failure {
            None => tracing::info!(run_id = %report.run_id, "Experiment passed"),
            Some(f) => tracing::error!(
                run_id = %report.run_id,
                exit_code = f.exit_code(),
                "{} experiment failed or returned poor results: {f}",
                self.provider.name()
            ),
        }
        report.finish(failure.as_ref().map(ToString::to_string));

        if let Some(path) = &self.config.evaluation.report_path
            && let Err(e) = report.write_json(path)
        {
            tracing::warn!(path = %path.display(), error = %e, "Could not write experiment report");
        }
        ExperimentOutcome { report, failure }
    }

    fn execute(&self, report: &mut ExperimentReport) -> Result<(), RunFailure> {
        let gate = CheckpointGate::new(self.config);
        let decision = gate
            .ensure_trained(self.provider, self.factory)
            .map_err(|e| stage_failure(Stage::Training, e))?;
        report.record_gate(&decision);
        if let GateDecision::Trained {
            outcome,
            passed: false,
        } = &decision
        {
            return Err(RunFailure::TrainingQuality {
                best_accuracy: outcome.best_accuracy,
                floor: self.config.quality.training_floor,
            });
        }

        let mut network = self
            .restore_network(gate.store(), report)
            .map_err(|e| stage_failure(Stage::CheckpointLoad, e))?;

        let (train, test) = self
            .build_views()
            .map_err(|e| stage_failure(Stage::DatasetConstruction, e))?;
        report.subset = Some(SubsetSizes {
            train: train.len(),
            test: test.len(),
        });
        tracing::info!(
            train_samples = train.len(),
            test_samples = test.len(),
            "Extracting features"
        );

        let extractor = FeatureExtractor::new(self.config.evaluation.batch_size);
        let pipeline = self.provider.pipeline(Augmentation::Eval);
        let train_features = extractor
            .extract(network.as_mut(), train, pipeline.clone())
            .map_err(|e| stage_failure(Stage::FeatureExtraction, e))?;
        let test_features = extractor
            .extract(network.as_mut(), test, pipeline)
            .map_err(|e| stage_failure(Stage::FeatureExtraction, e))?;
        report.feature_dim = Some(train_features.dim());

        report.results = ClassifierEvaluator::new(self.config.evaluation.classifiers.clone())
            .evaluate_all(&train_features, &test_features);
        report.log_results();

        let floor = self.config.quality.classifier_floor;
        if !report.results.passes(floor) {
            return Err(RunFailure::ClassifierQuality { floor });
        }
        Ok(())
    }

    /// Fresh network with the stored best state loaded into it.
    fn restore_network(
        &self,
        store: &CheckpointStore,
        report: &mut ExperimentReport,
    ) -> Result<Box<dyn Network>, MlError> {
        let record = store.load()?.ok_or_else(|| {
            MlError::model(format!(
                "no checkpoint at {} after training",
                store.path().display()
            ))
        })?;
        let mut network = self.factory.build()?;
        network.load_state(&record.model_state)?;
        tracing::info!(
            path = %store.path().display(),
            accuracy = record.accuracy,
            epoch = record.epoch,
            "Loaded checkpoint for feature extraction"
        );
        report.checkpoint = Some(record.summary(store.path()));
        Ok(network)
    }

    fn build_views(&self) -> Result<(Arc<dyn Dataset>, Arc<dyn Dataset>), MlError> {
        let train = self.provider.dataset(Split::Train)?;
        let test = self.provider.dataset(Split::Test)?;
        Ok(truncate_splits(train, test, self.config.evaluation.subset_size))
    }
}

fn stage_failure(stage: Stage, error: MlError) -> RunFailure {
    let mut chain = String::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    tracing::error!(%stage, error = %error, causes = %chain, "Stage failed");
    RunFailure::at(stage, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;

    #[test]
    fn test_exit_codes_are_distinct_and_non_zero() {
        let failures = [
            RunFailure::TrainingQuality {
                best_accuracy: 40.0,
                floor: 50.0,
            },
            RunFailure::ClassifierQuality { floor: 10.0 },
            RunFailure::at(Stage::FeatureExtraction, MlError::dataset("bad label")),
            RunFailure::at(
                Stage::Training,
                MlError::checkpoint(Path::new("c.json"), io::Error::other("disk full")),
            ),
        ];
        let codes: Vec<u8> = failures.iter().map(RunFailure::exit_code).collect();
        assert_eq!(codes, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_failure_messages() {
        let f = RunFailure::at(Stage::FeatureExtraction, MlError::dataset("bad label"));
        assert_eq!(
            f.to_string(),
            "feature extraction failed: Dataset error: bad label"
        );
    }
}
