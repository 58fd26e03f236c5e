//! Dataset capabilities: indexed sample sources, per-split providers, batching.
//!
//! A [`Dataset`] yields untransformed samples; the [`DataLoader`] owns the
//! shuffle order, the per-split transform [`Pipeline`], and batch assembly.

pub mod cifar;
pub mod loader;
pub mod subset;
pub mod transform;

pub use cifar::{Cifar100, Cifar100Provider};
pub use loader::{Batch, DataLoader, LoaderOptions};
pub use subset::{Subset, SubsetSizes, truncate_splits};
pub use transform::{Pipeline, Transform};

use crate::error::MlError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which half of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Test,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// Which transform pipeline a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Augmentation {
    /// Random crops/flips plus normalization.
    Train,
    /// Normalization only.
    Eval,
}

/// One input sample, flattened, before transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Array1<f32>,
    pub label: usize,
}

/// Finite, indexed, ordered source of samples.
pub trait Dataset {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of every flattened input.
    fn input_dim(&self) -> usize;

    fn get(&self, index: usize) -> Result<Sample, MlError>;

    /// Labels in iteration order, failing on the first malformed sample.
    fn labels(&self) -> Result<Vec<usize>, MlError> {
        (0..self.len()).map(|i| self.get(i).map(|s| s.label)).collect()
    }
}

/// Produces the benchmark's dataset splits and their transform pipelines.
pub trait DatasetProvider {
    /// Dataset name, for logs and reports.
    fn name(&self) -> &str;

    fn num_classes(&self) -> usize;

    fn dataset(&self, split: Split) -> Result<Arc<dyn Dataset>, MlError>;

    fn pipeline(&self, augmentation: Augmentation) -> Pipeline;
}

/// Dataset held entirely in memory, one row per sample.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    inputs: Array2<f32>,
    labels: Vec<usize>,
}

impl InMemoryDataset {
    pub fn new(inputs: Array2<f32>, labels: Vec<usize>) -> Result<Self, MlError> {
        if inputs.nrows() != labels.len() {
            return Err(MlError::dataset(format!(
                "{} inputs but {} labels",
                inputs.nrows(),
                labels.len()
            )));
        }
        Ok(Self { inputs, labels })
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn input_dim(&self) -> usize {
        self.inputs.ncols()
    }

    fn get(&self, index: usize) -> Result<Sample, MlError> {
        let label = *self
            .labels
            .get(index)
            .ok_or_else(|| MlError::dataset(format!("index {index} out of range")))?;
        Ok(Sample {
            input: self.inputs.row(index).to_owned(),
            label,
        })
    }

    fn labels(&self) -> Result<Vec<usize>, MlError> {
        Ok(self.labels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_in_memory_dataset() {
        let ds = InMemoryDataset::new(array![[1.0f32, 2.0], [3.0, 4.0]], vec![1, 0]).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.input_dim(), 2);
        assert_eq!(ds.get(1).unwrap().input, array![3.0f32, 4.0]);
        assert_eq!(ds.labels().unwrap(), vec![1, 0]);
        assert!(ds.get(2).is_err());
    }

    #[test]
    fn test_in_memory_dataset_rejects_mismatch() {
        assert!(InMemoryDataset::new(array![[1.0f32]], vec![0, 1]).is_err());
    }
}
