//! Downstream classifiers compared on extracted features.
//!
//! The set is fixed and closed: [`ClassifierKind`] names every classifier the
//! benchmark knows, and [`ClassifierKind::build`] is the only way to get one.

pub mod centroid;
pub mod evaluation;
pub mod knn;
pub mod logistic;
pub mod naive_bayes;

pub use centroid::NearestCentroid;
pub use evaluation::{
    ClassifierEvaluator, ClassifierFailure, ClassifierResult, ClassifierResults,
    passes_quality_gate,
};
pub use knn::KNearestNeighbors;
pub use logistic::LogisticRegression;
pub use naive_bayes::GaussianNaiveBayes;

use crate::error::MlError;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A supervised classifier over dense feature rows.
///
/// `fit` discards anything learned by an earlier `fit`.
pub trait Classifier {
    fn name(&self) -> &str;

    fn fit(&mut self, features: ArrayView2<'_, f32>, labels: &[usize]) -> Result<(), MlError>;

    fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<usize>, MlError>;
}

/// Configurable classifier identifiers, in the order they are listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierKind {
    LogisticRegression {
        #[serde(default = "default_l2")]
        l2: f64,
        #[serde(default = "default_max_iter")]
        max_iter: usize,
        #[serde(default = "default_lr")]
        learning_rate: f64,
    },
    Knn {
        #[serde(default = "default_neighbors")]
        n_neighbors: usize,
    },
    NaiveBayes {
        #[serde(default = "default_var_smoothing")]
        var_smoothing: f64,
    },
    NearestCentroid,
}

fn default_l2() -> f64 {
    1e-4
}

fn default_max_iter() -> usize {
    200
}

fn default_lr() -> f64 {
    0.5
}

fn default_neighbors() -> usize {
    5
}

fn default_var_smoothing() -> f64 {
    1e-9
}

impl ClassifierKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LogisticRegression { .. } => "logistic_regression",
            Self::Knn { .. } => "knn",
            Self::NaiveBayes { .. } => "naive_bayes",
            Self::NearestCentroid => "nearest_centroid",
        }
    }

    /// A fresh, unfitted classifier.
    pub fn build(&self) -> Box<dyn Classifier> {
        match *self {
            Self::LogisticRegression {
                l2,
                max_iter,
                learning_rate,
            } => Box::new(LogisticRegression::new(l2, max_iter, learning_rate)),
            Self::Knn { n_neighbors } => Box::new(KNearestNeighbors::new(n_neighbors)),
            Self::NaiveBayes { var_smoothing } => {
                Box::new(GaussianNaiveBayes::new(var_smoothing))
            }
            Self::NearestCentroid => Box::new(NearestCentroid::new()),
        }
    }

    pub fn default_set() -> Vec<Self> {
        vec![
            Self::LogisticRegression {
                l2: default_l2(),
                max_iter: default_max_iter(),
                learning_rate: default_lr(),
            },
            Self::Knn {
                n_neighbors: default_neighbors(),
            },
            Self::NaiveBayes {
                var_smoothing: default_var_smoothing(),
            },
            Self::NearestCentroid,
        ]
    }
}

/// Sorted distinct labels and each sample's index into them.
pub(crate) fn encode_labels(labels: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let classes: Vec<usize> = labels.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let encoded = labels
        .iter()
        .map(|l| classes.partition_point(|c| c < l))
        .collect();
    (classes, encoded)
}

pub(crate) fn check_fit_input(
    name: &str,
    features: ArrayView2<'_, f32>,
    labels: &[usize],
) -> Result<(), MlError> {
    if features.nrows() != labels.len() {
        return Err(MlError::invalid_input(format!(
            "{name}: {} feature rows but {} labels",
            features.nrows(),
            labels.len()
        )));
    }
    if labels.is_empty() {
        return Err(MlError::invalid_input(format!("{name}: no training samples")));
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(MlError::invalid_input(format!(
            "{name}: training features contain non-finite values"
        )));
    }
    Ok(())
}

pub(crate) fn check_predict_input(
    name: &str,
    fitted_dim: Option<usize>,
    features: ArrayView2<'_, f32>,
) -> Result<(), MlError> {
    let Some(dim) = fitted_dim else {
        return Err(MlError::model(format!("{name}: predict called before fit")));
    };
    if features.ncols() != dim {
        return Err(MlError::invalid_input(format!(
            "{name}: fitted on {dim} features, got {}",
            features.ncols()
        )));
    }
    Ok(())
}
