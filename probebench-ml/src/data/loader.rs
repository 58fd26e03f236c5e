//! Batching over a dataset with optional shuffling and a transform pipeline.

use super::{Dataset, Pipeline};
use crate::error::MlError;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Inputs stacked row-wise with their labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Array2<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// How a loader walks its dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    /// Skip a final batch smaller than `batch_size`.
    pub drop_last: bool,
    pub seed: u64,
}

impl LoaderOptions {
    /// In-order, every sample kept.
    pub fn sequential(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: false,
            drop_last: false,
            seed: 0,
        }
    }
}

/// Re-iterable stream of batches. Each call to [`DataLoader::iter`] is one
/// epoch; shuffled loaders draw a fresh order per epoch from `seed`.
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    pipeline: Pipeline,
    options: LoaderOptions,
    epoch: u64,
}

impl DataLoader {
    pub fn new(
        dataset: Arc<dyn Dataset>,
        pipeline: Pipeline,
        options: LoaderOptions,
    ) -> Result<Self, MlError> {
        if options.batch_size == 0 {
            return Err(MlError::invalid_input("batch size must be positive"));
        }
        Ok(Self {
            dataset,
            pipeline,
            options,
            epoch: 0,
        })
    }

    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Number of samples an epoch yields.
    pub fn num_samples(&self) -> usize {
        self.num_batches_full() * self.options.batch_size + self.tail_len()
    }

    /// Number of batches an epoch yields.
    pub fn num_batches(&self) -> usize {
        self.num_batches_full() + usize::from(self.tail_len() > 0)
    }

    fn num_batches_full(&self) -> usize {
        self.dataset.len() / self.options.batch_size
    }

    fn tail_len(&self) -> usize {
        if self.options.drop_last {
            0
        } else {
            self.dataset.len() % self.options.batch_size
        }
    }

    /// Start the next epoch.
    pub fn iter(&mut self) -> Batches<'_> {
        let epoch_seed = self
            .options
            .seed
            .wrapping_add(self.epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        self.epoch += 1;
        let mut rng = StdRng::seed_from_u64(epoch_seed);
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.options.shuffle {
            order.shuffle(&mut rng);
        }
        order.truncate(self.num_samples());
        Batches {
            loader: &*self,
            order,
            cursor: 0,
            rng,
        }
    }
}

/// One epoch's batches. Yields at most one error, then ends.
pub struct Batches<'a> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl Batches<'_> {
    fn assemble(&mut self, indices: &[usize]) -> Result<Batch, MlError> {
        let dataset = &self.loader.dataset;
        let mut rows = Vec::with_capacity(indices.len() * dataset.input_dim());
        let mut labels = Vec::with_capacity(indices.len());
        let mut width = None;
        for &index in indices {
            let sample = dataset.get(index)?;
            let input = self.loader.pipeline.apply(sample.input, &mut self.rng)?;
            match width {
                None => width = Some(input.len()),
                Some(w) if w != input.len() => {
                    return Err(MlError::dataset(format!(
                        "sample {index} has {} values, expected {w}",
                        input.len()
                    )));
                }
                Some(_) => {}
            }
            rows.extend(input.iter().copied());
            labels.push(sample.label);
        }
        let inputs = Array2::from_shape_vec((labels.len(), width.unwrap_or(0)), rows)?;
        Ok(Batch { inputs, labels })
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch, MlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.options.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        let batch = self.assemble(&indices);
        if batch.is_err() {
            self.cursor = self.order.len();
        }
        Some(batch)
    }
}
