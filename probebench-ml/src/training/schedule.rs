//! Step learning-rate schedule.

use crate::config::TrainingRecipe;
use serde::{Deserialize, Serialize};

/// Multiplies the learning rate by `gamma` at each milestone epoch.
///
/// `multiplier(epoch) = gamma ^ |{m in milestones : m <= epoch}|`. The
/// schedule is stepped once after every completed epoch, so the multiplier in
/// effect while training epoch `e` only reflects milestones passed before `e`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStepSchedule {
    milestones: Vec<usize>,
    gamma: f64,
    /// Epochs completed so far.
    epoch: usize,
}

impl MultiStepSchedule {
    pub fn new(mut milestones: Vec<usize>, gamma: f64) -> Self {
        milestones.sort_unstable();
        Self {
            milestones,
            gamma,
            epoch: 0,
        }
    }

    pub fn from_recipe(recipe: &TrainingRecipe) -> Self {
        Self::new(recipe.milestones.clone(), recipe.gamma)
    }

    /// Multiplier in effect during `epoch`.
    pub fn multiplier(&self, epoch: usize) -> f64 {
        let passed = self.milestones.iter().filter(|&&m| m <= epoch).count();
        self.gamma.powi(passed as i32)
    }

    /// Multiplier for the epoch about to run.
    pub fn current_multiplier(&self) -> f64 {
        self.multiplier(self.epoch)
    }

    /// Mark one epoch complete; returns the multiplier for the next one.
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.current_multiplier()
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}
