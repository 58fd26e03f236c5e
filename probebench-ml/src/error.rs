//! Error types for the probebench-ml crate.

use thiserror::Error;

/// Top-level error type for ML operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint could not be read or written. Never retried.
    #[error("Checkpoint persistence fault at {path}: {source}")]
    Checkpoint {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint exists but its contents fail integrity checks.
    #[error("Corrupt checkpoint at {path}: {reason}")]
    CorruptCheckpoint { path: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn checkpoint(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Checkpoint {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn corrupt_checkpoint(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::CorruptCheckpoint {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// True for checkpoint read/write faults.
    pub fn is_persistence_fault(&self) -> bool {
        matches!(self, Self::Checkpoint { .. })
    }
}
