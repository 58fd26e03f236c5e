//! Training infrastructure: controller, schedule, metrics, checkpoints, gate.

pub mod callbacks;
pub mod checkpoint;
pub mod gate;
pub mod metrics;
pub mod reproducibility;
pub mod runner;
pub mod schedule;

pub use callbacks::{
    AnomalyDetectionCallback, BatchProgress, CallbackAction, LoggingCallback, TrainingCallback,
};
pub use checkpoint::{CheckpointRecord, CheckpointStore, CheckpointSummary};
pub use gate::{CheckpointGate, GateDecision};
pub use metrics::{EpochSummary, MetricAccumulator, PassSummary, TrainingMetrics};
pub use reproducibility::SeedManager;
pub use runner::{TrainingController, TrainingOutcome};
pub use schedule::MultiStepSchedule;
