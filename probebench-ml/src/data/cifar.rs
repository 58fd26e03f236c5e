//! CIFAR-100 binary distribution reader.
//!
//! Each record in `train.bin` / `test.bin` is 3074 bytes: coarse label, fine
//! label, then 3072 pixel bytes in CHW order (1024 red, 1024 green, 1024 blue).

use super::{Augmentation, Dataset, DatasetProvider, Pipeline, Sample, Split};
use crate::error::MlError;
use ndarray::Array1;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const IMAGE_SHAPE: [usize; 3] = [3, 32, 32];
pub const PIXELS: usize = 3 * 32 * 32;
pub const RECORD_BYTES: usize = 2 + PIXELS;
pub const NUM_CLASSES: usize = 100;
pub const NUM_COARSE_CLASSES: usize = 20;

/// One split of CIFAR-100, kept as raw bytes and decoded per sample.
#[derive(Debug, Clone)]
pub struct Cifar100 {
    split: Split,
    bytes: Arc<Vec<u8>>,
}

impl Cifar100 {
    /// Read `train.bin` or `test.bin` from `dir`.
    pub fn load(dir: &Path, split: Split) -> Result<Self, MlError> {
        let path = dir.join(Self::file_name(split));
        let bytes = std::fs::read(&path).map_err(|e| {
            MlError::dataset(format!(
                "cannot read CIFAR-100 {split} split at {}: {e}",
                path.display()
            ))
        })?;
        let dataset = Self::from_bytes(split, bytes)?;
        tracing::info!(
            split = %split,
            samples = dataset.len(),
            path = %path.display(),
            "Loaded CIFAR-100 split"
        );
        Ok(dataset)
    }

    pub fn from_bytes(split: Split, bytes: Vec<u8>) -> Result<Self, MlError> {
        if bytes.is_empty() || bytes.len() % RECORD_BYTES != 0 {
            return Err(MlError::dataset(format!(
                "CIFAR-100 {split} data is {} bytes, not a multiple of the {RECORD_BYTES}-byte record",
                bytes.len()
            )));
        }
        Ok(Self {
            split,
            bytes: Arc::new(bytes),
        })
    }

    pub fn file_name(split: Split) -> &'static str {
        match split {
            Split::Train => "train.bin",
            Split::Test => "test.bin",
        }
    }

    pub fn split(&self) -> Split {
        self.split
    }

    fn record(&self, index: usize) -> Result<&[u8], MlError> {
        if index >= self.len() {
            return Err(MlError::dataset(format!(
                "index {index} out of range for CIFAR-100 {} ({} samples)",
                self.split,
                self.len()
            )));
        }
        let start = index * RECORD_BYTES;
        Ok(&self.bytes[start..start + RECORD_BYTES])
    }

    /// Superclass label of a sample.
    pub fn coarse_label(&self, index: usize) -> Result<usize, MlError> {
        let coarse = self.record(index)?[0] as usize;
        if coarse >= NUM_COARSE_CLASSES {
            return Err(MlError::dataset(format!(
                "malformed CIFAR-100 {} sample {index}: coarse label {coarse}",
                self.split
            )));
        }
        Ok(coarse)
    }
}

impl Dataset for Cifar100 {
    fn len(&self) -> usize {
        self.bytes.len() / RECORD_BYTES
    }

    fn input_dim(&self) -> usize {
        PIXELS
    }

    fn get(&self, index: usize) -> Result<Sample, MlError> {
        let record = self.record(index)?;
        let label = record[1] as usize;
        if label >= NUM_CLASSES {
            return Err(MlError::dataset(format!(
                "malformed CIFAR-100 {} sample {index}: fine label {label}",
                self.split
            )));
        }
        let input = Array1::from_iter(record[2..].iter().map(|&b| f32::from(b) / 255.0));
        Ok(Sample { input, label })
    }
}

/// Serves CIFAR-100 splits from the extracted binary archive.
#[derive(Debug, Clone)]
pub struct Cifar100Provider {
    data_dir: PathBuf,
}

impl Cifar100Provider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl DatasetProvider for Cifar100Provider {
    fn name(&self) -> &str {
        crate::config::CIFAR100
    }

    fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    fn dataset(&self, split: Split) -> Result<Arc<dyn Dataset>, MlError> {
        Ok(Arc::new(Cifar100::load(&self.data_dir, split)?))
    }

    fn pipeline(&self, augmentation: Augmentation) -> Pipeline {
        match augmentation {
            Augmentation::Train => Pipeline::cifar100_train(),
            Augmentation::Eval => Pipeline::cifar100_eval(),
        }
    }
}
