//! k-nearest-neighbours with Euclidean distance and majority vote.

use super::{Classifier, check_fit_input, check_predict_input, encode_labels};
use crate::error::MlError;
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Test rows scored against the training set at once.
const QUERY_CHUNK: usize = 256;

#[derive(Debug, Clone)]
pub struct KNearestNeighbors {
    n_neighbors: usize,
    fitted: Option<Fitted>,
}

#[derive(Debug, Clone)]
struct Fitted {
    points: Array2<f32>,
    sq_norms: Array1<f32>,
    encoded: Vec<usize>,
    classes: Vec<usize>,
}

impl KNearestNeighbors {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors,
            fitted: None,
        }
    }
}

impl Classifier for KNearestNeighbors {
    fn name(&self) -> &str {
        "knn"
    }

    fn fit(&mut self, features: ArrayView2<'_, f32>, labels: &[usize]) -> Result<(), MlError> {
        self.fitted = None;
        check_fit_input(self.name(), features, labels)?;
        if self.n_neighbors == 0 {
            return Err(MlError::invalid_input("knn: n_neighbors must be positive"));
        }
        let (classes, encoded) = encode_labels(labels);
        let sq_norms = features.map_axis(Axis(1), |row| row.dot(&row));
        self.fitted = Some(Fitted {
            points: features.to_owned(),
            sq_norms,
            encoded,
            classes,
        });
        Ok(())
    }

    fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<usize>, MlError> {
        check_predict_input(
            self.name(),
            self.fitted.as_ref().map(|f| f.points.ncols()),
            features,
        )?;
        let Some(fitted) = &self.fitted else {
            return Ok(Vec::new());
        };
        let k = self.n_neighbors.min(fitted.encoded.len());
        let mut predictions = Vec::with_capacity(features.nrows());
        let mut votes = vec![0usize; fitted.classes.len()];

        for chunk in features.axis_chunks_iter(Axis(0), QUERY_CHUNK) {
            // |q - p|^2 = |q|^2 + |p|^2 - 2 q.p; |q|^2 is constant per row
            let cross = chunk.dot(&fitted.points.t());
            for row in cross.axis_iter(Axis(0)) {
                let mut dist: Vec<(f32, usize)> = row
                    .iter()
                    .zip(fitted.sq_norms.iter())
                    .enumerate()
                    .map(|(i, (&c, &n))| (n - 2.0 * c, i))
                    .collect();
                if k < dist.len() {
                    dist.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
                }
                votes.iter_mut().for_each(|v| *v = 0);
                for &(_, i) in &dist[..k] {
                    votes[fitted.encoded[i]] += 1;
                }
                // ties go to the smallest label
                let mut winner = 0;
                for (class, &count) in votes.iter().enumerate() {
                    if count > votes[winner] {
                        winner = class;
                    }
                }
                predictions.push(fitted.classes[winner]);
            }
        }
        Ok(predictions)
    }
}
