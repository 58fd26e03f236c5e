//! Deterministic first-`n` views used to cap benchmark cost.

use super::{Dataset, Sample};
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The test split is capped at `subset_size / TEST_DIVISOR`.
pub const TEST_DIVISOR: usize = 5;

/// The first `len` samples of another dataset.
pub struct Subset {
    inner: Arc<dyn Dataset>,
    len: usize,
}

impl Subset {
    /// View of `min(n, inner.len())` leading samples.
    pub fn first(inner: Arc<dyn Dataset>, n: usize) -> Self {
        let len = n.min(inner.len());
        Self { inner, len }
    }
}

impl Dataset for Subset {
    fn len(&self) -> usize {
        self.len
    }

    fn input_dim(&self) -> usize {
        self.inner.input_dim()
    }

    fn get(&self, index: usize) -> Result<Sample, MlError> {
        if index >= self.len {
            return Err(MlError::dataset(format!(
                "index {index} out of range for subset of {}",
                self.len
            )));
        }
        self.inner.get(index)
    }
}

/// Resulting split sizes after truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetSizes {
    pub train: usize,
    pub test: usize,
}

impl SubsetSizes {
    /// `train = min(subset, train_len)`, `test = min(subset / 5, test_len)`;
    /// no cap keeps both lengths.
    pub fn compute(subset_size: Option<usize>, train_len: usize, test_len: usize) -> Self {
        match subset_size {
            Some(n) => Self {
                train: n.min(train_len),
                test: (n / TEST_DIVISOR).min(test_len),
            },
            None => Self {
                train: train_len,
                test: test_len,
            },
        }
    }
}

/// Apply the benchmark's subset cap to both splits.
pub fn truncate_splits(
    train: Arc<dyn Dataset>,
    test: Arc<dyn Dataset>,
    subset_size: Option<usize>,
) -> (Arc<dyn Dataset>, Arc<dyn Dataset>) {
    let Some(n) = subset_size else {
        return (train, test);
    };
    let sizes = SubsetSizes::compute(Some(n), train.len(), test.len());
    (
        Arc::new(Subset::first(train, sizes.train)),
        Arc::new(Subset::first(test, sizes.test)),
    )
}
