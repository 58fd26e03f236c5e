//! Best-model checkpoint store.
//!
//! A single JSON record per configured path: metadata in the clear, the model
//! state base64-encoded alongside its SHA-256. Writes go through
//! [`probebench_core::persistence::atomic_write_json`], so a reader sees either
//! the previous record or the new one, never a partial file.

use crate::error::MlError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

/// Best model seen by a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub model_state: Vec<u8>,
    /// Validation accuracy in percent.
    pub accuracy: f64,
    /// 0-based epoch that produced this state.
    pub epoch: usize,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(model_state: Vec<u8>, accuracy: f64, epoch: usize) -> Self {
        Self {
            model_state,
            accuracy,
            epoch,
            saved_at: Utc::now(),
        }
    }

    pub fn summary(&self, path: &Path) -> CheckpointSummary {
        CheckpointSummary {
            path: path.to_path_buf(),
            accuracy: self.accuracy,
            epoch: self.epoch,
            saved_at: self.saved_at,
            state_sha256: sha256_hex(&self.model_state),
            state_bytes: self.model_state.len() as u64,
        }
    }
}

/// Record metadata without the model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub path: PathBuf,
    pub accuracy: f64,
    pub epoch: usize,
    pub saved_at: DateTime<Utc>,
    pub state_sha256: String,
    pub state_bytes: u64,
}

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCheckpoint {
    format_version: u32,
    accuracy: f64,
    epoch: usize,
    saved_at: DateTime<Utc>,
    state_sha256: String,
    state_bytes: u64,
    model_state: String,
}

/// Reads and overwrites the single checkpoint slot at `path`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether anything (valid or not) occupies the slot.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and verify the record.
    ///
    /// `Ok(None)` when no file exists, `CorruptCheckpoint` when the file fails
    /// to parse or verify, `Checkpoint` on any other I/O fault.
    pub fn load(&self) -> Result<Option<CheckpointRecord>, MlError> {
        let stored: StoredCheckpoint =
            match probebench_core::persistence::load_json(&self.path) {
                Ok(Some(stored)) => stored,
                Ok(None) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    return Err(MlError::corrupt_checkpoint(&self.path, e.to_string()));
                }
                Err(e) => return Err(MlError::checkpoint(&self.path, e)),
            };
        self.verify(stored).map(Some)
    }

    fn verify(&self, stored: StoredCheckpoint) -> Result<CheckpointRecord, MlError> {
        if stored.format_version != FORMAT_VERSION {
            return Err(MlError::corrupt_checkpoint(
                &self.path,
                format!(
                    "format version {} (expected {FORMAT_VERSION})",
                    stored.format_version
                ),
            ));
        }
        if !(0.0..=100.0).contains(&stored.accuracy) {
            return Err(MlError::corrupt_checkpoint(
                &self.path,
                format!("accuracy {} outside [0, 100]", stored.accuracy),
            ));
        }
        let model_state = BASE64
            .decode(stored.model_state.as_bytes())
            .map_err(|e| MlError::corrupt_checkpoint(&self.path, format!("model state: {e}")))?;
        let digest = sha256_hex(&model_state);
        if digest != stored.state_sha256 || model_state.len() as u64 != stored.state_bytes {
            return Err(MlError::corrupt_checkpoint(
                &self.path,
                "model state does not match its recorded hash",
            ));
        }
        Ok(CheckpointRecord {
            model_state,
            accuracy: stored.accuracy,
            epoch: stored.epoch,
            saved_at: stored.saved_at,
        })
    }

    /// Overwrite the slot with `record`.
    pub fn save(&self, record: &CheckpointRecord) -> Result<CheckpointSummary, MlError> {
        let summary = record.summary(&self.path);
        let stored = StoredCheckpoint {
            format_version: FORMAT_VERSION,
            accuracy: record.accuracy,
            epoch: record.epoch,
            saved_at: record.saved_at,
            state_sha256: summary.state_sha256.clone(),
            state_bytes: summary.state_bytes,
            model_state: BASE64.encode(&record.model_state),
        };
        probebench_core::persistence::atomic_write_json(&self.path, &stored)
            .map_err(|e| MlError::checkpoint(&self.path, e))?;
        tracing::debug!(
            path = %self.path.display(),
            accuracy = record.accuracy,
            epoch = record.epoch,
            bytes = summary.state_bytes,
            "Checkpoint written"
        );
        Ok(summary)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
