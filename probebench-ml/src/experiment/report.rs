//! Structured record of one benchmark run.

use crate::algorithms::ClassifierResults;
use crate::data::SubsetSizes;
use crate::error::MlError;
use crate::training::{CheckpointSummary, GateDecision, TrainingOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub run_id: String,
    pub dataset: String,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// True when the base network was trained in this run.
    pub trained: bool,
    pub training: Option<TrainingOutcome>,
    /// Checkpoint the features were extracted with.
    pub checkpoint: Option<CheckpointSummary>,
    pub subset: Option<SubsetSizes>,
    pub feature_dim: Option<usize>,
    pub results: ClassifierResults,
    pub passed: bool,
    pub failure: Option<String>,
}

impl ExperimentReport {
    pub fn new(dataset: &str, seed: u64) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            dataset: dataset.to_string(),
            seed,
            started_at: Utc::now(),
            finished_at: None,
            trained: false,
            training: None,
            checkpoint: None,
            subset: None,
            feature_dim: None,
            results: ClassifierResults::default(),
            passed: false,
            failure: None,
        }
    }

    pub fn record_gate(&mut self, decision: &GateDecision) {
        match decision {
            GateDecision::Reused(summary) => {
                self.checkpoint = Some(summary.clone());
            }
            GateDecision::Trained { outcome, .. } => {
                self.trained = true;
                self.training = Some(outcome.clone());
            }
        }
    }

    pub fn finish(&mut self, failure: Option<String>) {
        self.finished_at = Some(Utc::now());
        self.passed = failure.is_none();
        self.failure = failure;
    }

    /// Per-classifier lines, in configured order.
    pub fn render_table(&self) -> String {
        let mut out = format!("{} results:\n", self.dataset);
        for r in self.results.iter() {
            let _ = writeln!(
                out,
                "  {:<20} {:>6.2}%  (train {:>8.2}s, inference {:>8.2}s)",
                r.name, r.accuracy, r.train_time, r.inference_time
            );
        }
        for f in self.results.failures() {
            let _ = writeln!(out, "  {:<20} failed: {}", f.name, f.error);
        }
        out
    }

    pub fn log_results(&self) {
        tracing::info!("{} results:", self.dataset);
        for r in self.results.iter() {
            tracing::info!(
                "{}: {:.2}% (Train: {:.2}s, Inference: {:.2}s)",
                r.name,
                r.accuracy,
                r.train_time,
                r.inference_time
            );
        }
        for f in self.results.failures() {
            tracing::warn!("{}: failed ({})", f.name, f.error);
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), MlError> {
        probebench_core::persistence::atomic_write_json(path, self)?;
        tracing::info!(path = %path.display(), run_id = %self.run_id, "Wrote experiment report");
        Ok(())
    }
}
