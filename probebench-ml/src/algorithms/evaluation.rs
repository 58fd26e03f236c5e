//! Classifier comparison on extracted features.

use super::{Classifier, ClassifierKind};
use crate::error::MlError;
use crate::features::FeatureDataset;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Outcome of fitting and scoring one classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    pub name: String,
    /// Test accuracy in percent.
    pub accuracy: f64,
    /// Wall-clock seconds spent in `fit`.
    pub train_time: f64,
    /// Wall-clock seconds spent in `predict`.
    pub inference_time: f64,
}

/// A classifier that could not be fitted or scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierFailure {
    pub name: String,
    pub error: String,
}

/// Results in configured order, plus any per-classifier failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResults {
    results: Vec<ClassifierResult>,
    failures: Vec<ClassifierFailure>,
}

impl ClassifierResults {
    pub fn push(&mut self, result: ClassifierResult) {
        self.results.push(result);
    }

    pub fn push_failure(&mut self, failure: ClassifierFailure) {
        self.failures.push(failure);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassifierResult> {
        self.results.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ClassifierResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn failures(&self) -> &[ClassifierFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// See [`passes_quality_gate`].
    pub fn passes(&self, floor: f64) -> bool {
        passes_quality_gate(self.iter().map(|r| r.accuracy), floor)
    }

    pub fn best(&self) -> Option<&ClassifierResult> {
        self.results
            .iter()
            .max_by(|a, b| a.accuracy.total_cmp(&b.accuracy))
    }
}

/// The run fails when every accuracy is below `floor`, which includes the
/// case of no accuracies at all.
pub fn passes_quality_gate(accuracies: impl IntoIterator<Item = f64>, floor: f64) -> bool {
    accuracies.into_iter().any(|acc| acc >= floor)
}

/// Percentage of positions where `predictions` matches `truth`.
pub fn accuracy_percent(predictions: &[usize], truth: &[usize]) -> Result<f64, MlError> {
    if predictions.len() != truth.len() {
        return Err(MlError::evaluation(format!(
            "{} predictions for {} test samples",
            predictions.len(),
            truth.len()
        )));
    }
    if truth.is_empty() {
        return Err(MlError::evaluation("no test samples to score"));
    }
    let correct = predictions.iter().zip(truth).filter(|(p, t)| p == t).count();
    Ok(100.0 * correct as f64 / truth.len() as f64)
}

/// Fits and scores each configured classifier independently.
#[derive(Debug, Clone)]
pub struct ClassifierEvaluator {
    kinds: Vec<ClassifierKind>,
}

impl ClassifierEvaluator {
    pub fn new(kinds: Vec<ClassifierKind>) -> Self {
        Self { kinds }
    }

    /// Evaluate every classifier; a failing classifier is recorded and the
    /// rest still run.
    pub fn evaluate_all(&self, train: &FeatureDataset, test: &FeatureDataset) -> ClassifierResults {
        let mut results = ClassifierResults::default();
        for kind in &self.kinds {
            tracing::info!(classifier = kind.name(), "Training classifier");
            let mut classifier = kind.build();
            match evaluate_one(classifier.as_mut(), train, test) {
                Ok(result) => {
                    tracing::info!(
                        classifier = %result.name,
                        accuracy = format_args!("{:.2}", result.accuracy),
                        train_time = format_args!("{:.2}", result.train_time),
                        inference_time = format_args!("{:.2}", result.inference_time),
                        "Classifier evaluated"
                    );
                    results.push(result);
                }
                Err(e) => {
                    tracing::error!(classifier = kind.name(), error = %e, "Classifier failed");
                    results.push_failure(ClassifierFailure {
                        name: kind.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        results
    }
}

/// Fit on `train`, predict `test`, and time both.
pub fn evaluate_one(
    classifier: &mut dyn Classifier,
    train: &FeatureDataset,
    test: &FeatureDataset,
) -> Result<ClassifierResult, MlError> {
    let started = Instant::now();
    classifier.fit(train.features(), train.labels())?;
    let train_time = started.elapsed().as_secs_f64();

    let started = Instant::now();
    let predictions = classifier.predict(test.features())?;
    let inference_time = started.elapsed().as_secs_f64();

    Ok(ClassifierResult {
        name: classifier.name().to_string(),
        accuracy: accuracy_percent(&predictions, test.labels())?,
        train_time,
        inference_time,
    })
}
