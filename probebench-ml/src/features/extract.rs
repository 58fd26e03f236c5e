//! Frozen-network feature extraction over a split.

use crate::data::{DataLoader, Dataset, LoaderOptions, Pipeline};
use crate::error::MlError;
use crate::nn::{Mode, Network};
use ndarray::{Array2, ArrayView2, Axis, concatenate};
use std::sync::Arc;

/// Penultimate representations paired with labels, one row per input sample,
/// in the input's iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDataset {
    features: Array2<f32>,
    labels: Vec<usize>,
}

impl FeatureDataset {
    pub fn new(features: Array2<f32>, labels: Vec<usize>) -> Result<Self, MlError> {
        if features.nrows() != labels.len() {
            return Err(MlError::invalid_input(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.features.ncols()
    }
}

/// Runs a frozen network over a dataset and keeps only its feature output.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    batch_size: usize,
}

impl FeatureExtractor {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    /// Extract one feature vector per sample of `dataset`.
    ///
    /// The network is switched to [`Mode::Eval`] and left there; samples are
    /// visited in order without shuffling or dropping a partial batch.
    pub fn extract(
        &self,
        network: &mut dyn Network,
        dataset: Arc<dyn Dataset>,
        pipeline: Pipeline,
    ) -> Result<FeatureDataset, MlError> {
        let expected = dataset.len();
        network.set_mode(Mode::Eval);
        let mut loader =
            DataLoader::new(dataset, pipeline, LoaderOptions::sequential(self.batch_size))?;

        let mut chunks = Vec::with_capacity(loader.num_batches());
        let mut labels = Vec::with_capacity(expected);
        for batch in loader.iter() {
            let batch = batch?;
            let forward = network.forward(batch.inputs.view())?;
            if forward.features.nrows() != batch.len() {
                return Err(MlError::model(format!(
                    "network returned {} feature rows for a batch of {}",
                    forward.features.nrows(),
                    batch.len()
                )));
            }
            chunks.push(forward.features);
            labels.extend(batch.labels);
        }

        if labels.len() != expected {
            return Err(MlError::evaluation(format!(
                "extracted {} feature vectors from {expected} samples",
                labels.len()
            )));
        }
        let features = if chunks.is_empty() {
            Array2::zeros((0, network.feature_dim()))
        } else {
            let views: Vec<_> = chunks.iter().map(|c| c.view()).collect();
            concatenate(Axis(0), &views)?
        };
        tracing::debug!(
            samples = labels.len(),
            dim = features.ncols(),
            "Extracted features"
        );
        FeatureDataset::new(features, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryDataset;
    use crate::nn::Mlp;

    #[test]
    fn test_extract_preserves_count_and_order() {
        let n = 11;
        let inputs = Array2::from_shape_fn((n, 3), |(i, j)| (i + j) as f32 / 10.0);
        let labels: Vec<usize> = (0..n).map(|i| (i * 7) % 5).collect();
        let dataset = Arc::new(InMemoryDataset::new(inputs, labels.clone()).unwrap());
        let mut network = Mlp::new(3, &[6, 4], 5, 1).unwrap();
        network.set_mode(Mode::Train);

        let out = FeatureExtractor::new(4)
            .extract(&mut network, dataset, Pipeline::identity("id"))
            .unwrap();

        assert_eq!(out.len(), n);
        assert_eq!(out.dim(), 4);
        assert_eq!(out.labels(), labels.as_slice());
        assert_eq!(network.mode(), Mode::Eval);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let inputs = Array2::from_shape_fn((5, 2), |(i, j)| (i * 2 + j) as f32);
        let dataset: Arc<dyn Dataset> =
            Arc::new(InMemoryDataset::new(inputs, vec![0, 1, 0, 1, 0]).unwrap());
        let mut network = Mlp::new(2, &[3], 2, 9).unwrap();
        let extractor = FeatureExtractor::new(2);
        let a = extractor
            .extract(&mut network, dataset.clone(), Pipeline::identity("id"))
            .unwrap();
        let b = extractor
            .extract(&mut network, dataset, Pipeline::identity("id"))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset_yields_empty_features() {
        let dataset = Arc::new(InMemoryDataset::new(Array2::zeros((0, 2)), vec![]).unwrap());
        let mut network = Mlp::new(2, &[3], 2, 9).unwrap();
        let out = FeatureExtractor::new(2)
            .extract(&mut network, dataset, Pipeline::identity("id"))
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.dim(), 3);
    }
}
