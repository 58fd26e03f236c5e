//! Configuration types for the probebench-ml crate.
//!
//! Everything that used to be a process-wide constant in a benchmark script
//! (checkpoint path, quality floors, recipe hyperparameters) is a field here and
//! is handed to the training controller, checkpoint gate, and orchestrator at
//! construction time.

use crate::algorithms::ClassifierKind;
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The only dataset this benchmark recipe is defined for.
pub const CIFAR100: &str = "cifar100";

/// Top-level benchmark configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Dataset location.
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Checkpoint location and reuse policy.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Training recipe for the base network.
    #[serde(default)]
    pub recipe: TrainingRecipe,
    /// Reference network shape.
    #[serde(default)]
    pub model: ModelConfig,
    /// Feature extraction and classifier comparison.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Pass/fail floors.
    #[serde(default)]
    pub quality: QualityFloors,
    /// Global seed from which every component seed is derived.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            checkpoint: CheckpointConfig::default(),
            recipe: TrainingRecipe::default(),
            model: ModelConfig::default(),
            evaluation: EvaluationConfig::default(),
            quality: QualityFloors::default(),
            seed: default_seed(),
        }
    }
}

impl BenchConfig {
    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), MlError> {
        if self.dataset.name != CIFAR100 {
            return Err(MlError::config(format!(
                "unsupported dataset '{}'; this recipe is defined for '{CIFAR100}' only",
                self.dataset.name
            )));
        }
        self.recipe.validate()?;
        if self.model.hidden_layers.is_empty() || self.model.hidden_layers.contains(&0) {
            return Err(MlError::config(
                "model.hidden_layers must list at least one non-zero layer width",
            ));
        }
        if self.evaluation.batch_size == 0 {
            return Err(MlError::config("evaluation.batch_size must be positive"));
        }
        if self.evaluation.classifiers.is_empty() {
            return Err(MlError::config("evaluation.classifiers must not be empty"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for kind in &self.evaluation.classifiers {
            if !seen.insert(kind.name()) {
                return Err(MlError::config(format!(
                    "evaluation.classifiers lists '{}' more than once",
                    kind.name()
                )));
            }
        }
        if self.evaluation.subset_size == Some(0) {
            return Err(MlError::config(
                "evaluation.subset_size must be positive (use --full to extract whole splits)",
            ));
        }
        for (name, floor) in [
            ("training_floor", self.quality.training_floor),
            ("classifier_floor", self.quality.classifier_floor),
        ] {
            if !(0.0..=100.0).contains(&floor) {
                return Err(MlError::config(format!(
                    "quality.{name} must be a percentage in [0, 100], got {floor}"
                )));
            }
        }
        Ok(())
    }

    /// Anchor relative data, checkpoint, and report paths at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.dataset.data_dir);
        anchor(&mut self.checkpoint.path);
        if let Some(report) = &mut self.evaluation.report_path {
            anchor(report);
        }
    }
}

fn default_seed() -> u64 {
    42
}

/// Dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name; must be `cifar100`.
    #[serde(default = "default_dataset_name")]
    pub name: String,
    /// Directory containing `train.bin` and `test.bin` (the extracted
    /// `cifar-100-binary` archive).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: default_dataset_name(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_dataset_name() -> String {
    CIFAR100.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/cifar-100-binary")
}

/// Checkpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Path of the single best-model record.
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
    /// Re-train when an existing record's accuracy does not clear the training
    /// floor. Off by default: existing records are reused as-is.
    #[serde(default)]
    pub revalidate_accuracy: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
            revalidate_accuracy: false,
        }
    }
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoints/wideresnet/wideresnet_best.json")
}

/// Wide-ResNet paper training recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecipe {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
    #[serde(default = "default_true")]
    pub nesterov: bool,
    /// Epochs at which the learning rate is multiplied by `gamma`.
    #[serde(default = "default_milestones")]
    pub milestones: Vec<usize>,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Drop the final partial training batch (keeps batch statistics stable).
    #[serde(default = "default_true")]
    pub drop_last: bool,
    /// Emit a progress line every N training batches.
    #[serde(default = "default_log_every")]
    pub log_every_batches: usize,
}

impl Default for TrainingRecipe {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            momentum: default_momentum(),
            weight_decay: default_weight_decay(),
            nesterov: true,
            milestones: default_milestones(),
            gamma: default_gamma(),
            drop_last: true,
            log_every_batches: default_log_every(),
        }
    }
}

impl TrainingRecipe {
    pub fn validate(&self) -> Result<(), MlError> {
        if self.epochs == 0 {
            return Err(MlError::config("recipe.epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(MlError::config("recipe.batch_size must be positive"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(MlError::config("recipe.learning_rate must be positive"));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(MlError::config("recipe.momentum must be in [0, 1)"));
        }
        if self.weight_decay < 0.0 {
            return Err(MlError::config("recipe.weight_decay must be non-negative"));
        }
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(MlError::config(format!(
                "recipe.gamma must be in (0, 1), got {}",
                self.gamma
            )));
        }
        if self.milestones.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MlError::config(
                "recipe.milestones must be strictly increasing",
            ));
        }
        Ok(())
    }
}

fn default_epochs() -> usize {
    200
}

fn default_batch_size() -> usize {
    128
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_momentum() -> f64 {
    0.9
}

fn default_weight_decay() -> f64 {
    5e-4
}

fn default_milestones() -> Vec<usize> {
    vec![60, 120, 160]
}

fn default_gamma() -> f64 {
    0.2
}

fn default_log_every() -> usize {
    50
}

fn default_true() -> bool {
    true
}

/// Reference network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden layer widths; the last one is the feature dimension.
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_layers: default_hidden_layers(),
        }
    }
}

fn default_hidden_layers() -> Vec<usize> {
    vec![1024, 512]
}

/// Feature extraction and classifier comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Cap on training samples; the test split gets `subset_size / 5`.
    /// `None` uses both splits in full.
    #[serde(default = "default_subset_size")]
    pub subset_size: Option<usize>,
    /// Batch size used while extracting features.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Classifiers to compare, in reporting order.
    #[serde(default = "default_classifiers")]
    pub classifiers: Vec<ClassifierKind>,
    /// Where to write the JSON results report, if anywhere.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            subset_size: default_subset_size(),
            batch_size: default_batch_size(),
            classifiers: default_classifiers(),
            report_path: None,
        }
    }
}

fn default_subset_size() -> Option<usize> {
    Some(5000)
}

fn default_classifiers() -> Vec<ClassifierKind> {
    ClassifierKind::default_set()
}

/// Accuracy floors, in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityFloors {
    /// Best validation accuracy must be strictly above this.
    #[serde(default = "default_training_floor")]
    pub training_floor: f64,
    /// At least one classifier must reach this.
    #[serde(default = "default_classifier_floor")]
    pub classifier_floor: f64,
}

impl Default for QualityFloors {
    fn default() -> Self {
        Self {
            training_floor: default_training_floor(),
            classifier_floor: default_classifier_floor(),
        }
    }
}

fn default_training_floor() -> f64 {
    50.0
}

fn default_classifier_floor() -> f64 {
    10.0
}
