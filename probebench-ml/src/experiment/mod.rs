//! Experiment orchestration and reporting.

pub mod orchestrator;
pub mod report;

pub use orchestrator::{ExperimentOrchestrator, ExperimentOutcome, RunFailure, Stage};
pub use report::ExperimentReport;
