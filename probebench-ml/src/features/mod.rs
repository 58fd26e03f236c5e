//! Frozen-network feature extraction.

pub mod extract;

pub use extract::{FeatureDataset, FeatureExtractor};
