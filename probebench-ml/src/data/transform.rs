//! Named per-split transform pipelines over flattened CHW images.

use crate::error::MlError;
use ndarray::Array1;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// CIFAR-100 per-channel mean (RGB).
pub const CIFAR100_MEAN: [f32; 3] = [0.5071, 0.4867, 0.4408];
/// CIFAR-100 per-channel standard deviation (RGB).
pub const CIFAR100_STD: [f32; 3] = [0.2675, 0.2565, 0.2761];

/// One image transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Zero-pad every side by `padding`, then take a random `size`x`size` window.
    RandomCrop { size: usize, padding: usize },
    /// Mirror left-right with the given probability.
    RandomHorizontalFlip { probability: f64 },
    /// `(x - mean[c]) / std[c]` per channel.
    Normalize { mean: Vec<f32>, std: Vec<f32> },
}

/// Ordered list of transforms applied to each sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    /// `[channels, height, width]`; required by every image transform.
    pub image_shape: Option<[usize; 3]>,
    pub steps: Vec<Transform>,
}

impl Pipeline {
    /// Pass-through pipeline for inputs that are not images.
    pub fn identity(name: &str) -> Self {
        Self {
            name: name.to_string(),
            image_shape: None,
            steps: Vec::new(),
        }
    }

    /// Random crop (32, padding 4), horizontal flip, normalization.
    pub fn cifar100_train() -> Self {
        Self {
            name: "cifar100_train".to_string(),
            image_shape: Some(super::cifar::IMAGE_SHAPE),
            steps: vec![
                Transform::RandomCrop {
                    size: 32,
                    padding: 4,
                },
                Transform::RandomHorizontalFlip { probability: 0.5 },
                cifar100_normalize(),
            ],
        }
    }

    /// Normalization only.
    pub fn cifar100_eval() -> Self {
        Self {
            name: "cifar100_eval".to_string(),
            image_shape: Some(super::cifar::IMAGE_SHAPE),
            steps: vec![cifar100_normalize()],
        }
    }

    /// Apply every step in order.
    pub fn apply(&self, input: Array1<f32>, rng: &mut StdRng) -> Result<Array1<f32>, MlError> {
        if self.steps.is_empty() {
            return Ok(input);
        }
        let [channels, mut height, mut width] = self.image_shape.ok_or_else(|| {
            MlError::dataset(format!("pipeline '{}' has no image shape", self.name))
        })?;
        if input.len() != channels * height * width {
            return Err(MlError::dataset(format!(
                "pipeline '{}' expects {} values, sample has {}",
                self.name,
                channels * height * width,
                input.len()
            )));
        }

        let mut image = input;
        for step in &self.steps {
            image = match step {
                Transform::RandomCrop { size, padding } => {
                    let out = random_crop(&image, [channels, height, width], *size, *padding, rng)?;
                    height = *size;
                    width = *size;
                    out
                }
                Transform::RandomHorizontalFlip { probability } => {
                    if rng.gen_bool(probability.clamp(0.0, 1.0)) {
                        flip_horizontal(&image, [channels, height, width])
                    } else {
                        image
                    }
                }
                Transform::Normalize { mean, std } => {
                    normalize(image, channels, height * width, mean, std)?
                }
            };
        }
        Ok(image)
    }
}

fn cifar100_normalize() -> Transform {
    Transform::Normalize {
        mean: CIFAR100_MEAN.to_vec(),
        std: CIFAR100_STD.to_vec(),
    }
}

fn random_crop(
    image: &Array1<f32>,
    [channels, height, width]: [usize; 3],
    size: usize,
    padding: usize,
    rng: &mut StdRng,
) -> Result<Array1<f32>, MlError> {
    let padded_h = height + 2 * padding;
    let padded_w = width + 2 * padding;
    if size > padded_h || size > padded_w {
        return Err(MlError::dataset(format!(
            "crop size {size} exceeds padded image {padded_h}x{padded_w}"
        )));
    }
    let oy = rng.gen_range(0..=padded_h - size);
    let ox = rng.gen_range(0..=padded_w - size);

    let mut out = Array1::<f32>::zeros(channels * size * size);
    for c in 0..channels {
        for y in 0..size {
            let src_y = (oy + y).checked_sub(padding).filter(|&v| v < height);
            let Some(src_y) = src_y else { continue };
            for x in 0..size {
                if let Some(src_x) = (ox + x).checked_sub(padding).filter(|&v| v < width) {
                    out[(c * size + y) * size + x] = image[(c * height + src_y) * width + src_x];
                }
            }
        }
    }
    Ok(out)
}

fn flip_horizontal(image: &Array1<f32>, [channels, height, width]: [usize; 3]) -> Array1<f32> {
    let mut out = Array1::<f32>::zeros(image.len());
    for c in 0..channels {
        for y in 0..height {
            let row = (c * height + y) * width;
            for x in 0..width {
                out[row + x] = image[row + width - 1 - x];
            }
        }
    }
    out
}

fn normalize(
    mut image: Array1<f32>,
    channels: usize,
    plane: usize,
    mean: &[f32],
    std: &[f32],
) -> Result<Array1<f32>, MlError> {
    if mean.len() != channels || std.len() != channels {
        return Err(MlError::dataset(format!(
            "normalize needs {channels} means/stds, got {}/{}",
            mean.len(),
            std.len()
        )));
    }
    if std.iter().any(|&s| s <= 0.0) {
        return Err(MlError::dataset("normalize std must be positive"));
    }
    for (i, v) in image.iter_mut().enumerate() {
        let c = i / plane;
        *v = (*v - mean[c]) / std[c];
    }
    Ok(image)
}
