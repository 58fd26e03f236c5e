//! Nearest class mean.

use super::{Classifier, check_fit_input, check_predict_input, encode_labels};
use crate::error::MlError;
use ndarray::{Array1, Array2, ArrayView2, Axis};

#[derive(Debug, Clone, Default)]
pub struct NearestCentroid {
    fitted: Option<(Array2<f32>, Array1<f32>, Vec<usize>)>,
}

impl NearestCentroid {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Classifier for NearestCentroid {
    fn name(&self) -> &str {
        "nearest_centroid"
    }

    fn fit(&mut self, features: ArrayView2<'_, f32>, labels: &[usize]) -> Result<(), MlError> {
        self.fitted = None;
        check_fit_input(self.name(), features, labels)?;
        let (classes, encoded) = encode_labels(labels);
        let mut centroids = Array2::<f32>::zeros((classes.len(), features.ncols()));
        let mut counts = vec![0usize; classes.len()];
        for (row, &class) in features.axis_iter(Axis(0)).zip(&encoded) {
            let mut centroid = centroids.row_mut(class);
            centroid += &row;
            counts[class] += 1;
        }
        for (mut centroid, &count) in centroids.axis_iter_mut(Axis(0)).zip(&counts) {
            centroid /= count as f32;
        }
        let sq_norms = centroids.map_axis(Axis(1), |c| c.dot(&c));
        self.fitted = Some((centroids, sq_norms, classes));
        Ok(())
    }

    fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<usize>, MlError> {
        check_predict_input(
            self.name(),
            self.fitted.as_ref().map(|(c, _, _)| c.ncols()),
            features,
        )?;
        let Some((centroids, sq_norms, classes)) = &self.fitted else {
            return Ok(Vec::new());
        };
        let cross = features.dot(&centroids.t());
        Ok(cross
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best = (f32::INFINITY, 0);
                for (i, (&c, &n)) in row.iter().zip(sq_norms.iter()).enumerate() {
                    let d = n - 2.0 * c;
                    if d < best.0 {
                        best = (d, i);
                    }
                }
                classes[best.1]
            })
            .collect())
    }
}
