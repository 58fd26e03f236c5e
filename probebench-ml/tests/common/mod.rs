//! Shared stubs for integration tests.
//!
//! Samples are `[code, position]` rows. The scripted network's feature output
//! is a scaled one-hot of `code`, and during validation pass `p` it predicts
//! `code` for every sample whose `position` is below `script[p]` and a wrong
//! class otherwise, so a 100-sample validation split scores exactly
//! `script[p]` percent. Training passes predict `code`, except the optional
//! `wrong_train_pass`, which mispredicts every sample with finite logits.

#![allow(dead_code)]

use ndarray::{Array2, ArrayView2};
use probebench_ml::config::{BenchConfig, TrainingRecipe};
use probebench_ml::data::{
    Augmentation, Dataset, DatasetProvider, InMemoryDataset, Pipeline, Sample, Split,
};
use probebench_ml::error::MlError;
use probebench_ml::nn::{Forward, Mode, Network, NetworkFactory, Parameter};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

pub const NUM_CLASSES: usize = 10;

pub struct ScriptedNetwork {
    script: Vec<f64>,
    mode: Mode,
    /// Completed train→eval transitions; the current validation pass index + 1.
    eval_passes: usize,
    train_passes: usize,
    wrong_train_pass: Option<usize>,
    param: Parameter,
    forwards: Rc<Cell<usize>>,
    tag: u64,
}

impl ScriptedNetwork {
    pub fn new(script: Vec<f64>, forwards: Rc<Cell<usize>>) -> Self {
        Self {
            script,
            mode: Mode::Eval,
            eval_passes: 0,
            train_passes: 0,
            wrong_train_pass: None,
            param: Parameter::new(Array2::zeros((1, 1))),
            forwards,
            tag: 0,
        }
    }

    fn current_accuracy(&self) -> f64 {
        let pass = self.eval_passes.saturating_sub(1);
        self.script
            .get(pass)
            .or(self.script.last())
            .copied()
            .unwrap_or(100.0)
    }
}

impl Network for ScriptedNetwork {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode == Mode::Train && mode == Mode::Eval {
            self.eval_passes += 1;
        }
        if self.mode != Mode::Train && mode == Mode::Train {
            self.train_passes += 1;
        }
        self.mode = mode;
    }

    fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    fn feature_dim(&self) -> usize {
        NUM_CLASSES
    }

    fn forward(&mut self, inputs: ArrayView2<'_, f32>) -> Result<Forward, MlError> {
        self.forwards.set(self.forwards.get() + 1);
        let rows = inputs.nrows();
        let accuracy = self.current_accuracy();
        let wrong_pass = self.mode == Mode::Train
            && self.wrong_train_pass == Some(self.train_passes.saturating_sub(1));
        let mut features = Array2::zeros((rows, NUM_CLASSES));
        let mut logits = Array2::zeros((rows, NUM_CLASSES));
        for (i, row) in inputs.outer_iter().enumerate() {
            let code = row[0] as usize % NUM_CLASSES;
            let position = f64::from(row[1]);
            features[[i, code]] = 10.0;
            let predicted = if wrong_pass {
                (code + 1) % NUM_CLASSES
            } else if self.mode == Mode::Train || position < accuracy {
                code
            } else {
                (code + 1) % NUM_CLASSES
            };
            logits[[i, predicted]] = 5.0;
        }
        Ok(Forward { features, logits })
    }

    fn backward(&mut self, _grad_logits: ArrayView2<'_, f32>) -> Result<(), MlError> {
        if self.mode != Mode::Train {
            return Err(MlError::model("backward in eval mode"));
        }
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.param]
    }

    fn state(&self) -> Result<Vec<u8>, MlError> {
        Ok((self.eval_passes as u64).to_le_bytes().to_vec())
    }

    fn load_state(&mut self, blob: &[u8]) -> Result<(), MlError> {
        let bytes: [u8; 8] = blob
            .try_into()
            .map_err(|_| MlError::model("scripted state must be 8 bytes"))?;
        self.tag = u64::from_le_bytes(bytes);
        Ok(())
    }
}

/// Builds scripted networks and counts how often it was asked to.
pub struct ScriptedFactory {
    pub script: Vec<f64>,
    pub wrong_train_pass: Option<usize>,
    pub builds: Rc<Cell<usize>>,
    pub forwards: Rc<Cell<usize>>,
}

impl ScriptedFactory {
    pub fn new(script: Vec<f64>) -> Self {
        Self {
            script,
            wrong_train_pass: None,
            builds: Rc::new(Cell::new(0)),
            forwards: Rc::new(Cell::new(0)),
        }
    }

    /// Training pass `epoch` mispredicts everything.
    pub fn with_wrong_train_pass(mut self, epoch: usize) -> Self {
        self.wrong_train_pass = Some(epoch);
        self
    }

    pub fn network(&self) -> ScriptedNetwork {
        let mut network = ScriptedNetwork::new(self.script.clone(), self.forwards.clone());
        network.wrong_train_pass = self.wrong_train_pass;
        network
    }
}

impl NetworkFactory for ScriptedFactory {
    fn build(&self) -> Result<Box<dyn Network>, MlError> {
        self.builds.set(self.builds.get() + 1);
        Ok(Box::new(self.network()))
    }
}

/// `n` samples `[i % 10, i]` with label `(i + label_shift) % 10`.
pub fn coded_dataset(n: usize, label_shift: usize) -> Arc<dyn Dataset> {
    let inputs = Array2::from_shape_fn((n, 2), |(i, j)| {
        if j == 0 { (i % NUM_CLASSES) as f32 } else { i as f32 }
    });
    let labels = (0..n).map(|i| (i + label_shift) % NUM_CLASSES).collect();
    Arc::new(InMemoryDataset::new(inputs, labels).expect("consistent dataset"))
}

/// Fails on every index at or past `fail_from`.
pub struct FaultyDataset {
    pub inner: Arc<dyn Dataset>,
    pub fail_from: usize,
}

impl Dataset for FaultyDataset {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn input_dim(&self) -> usize {
        self.inner.input_dim()
    }

    fn get(&self, index: usize) -> Result<Sample, MlError> {
        if index >= self.fail_from {
            return Err(MlError::dataset(format!("sample {index} is unreadable")));
        }
        self.inner.get(index)
    }
}

pub struct StubProvider {
    pub train: Arc<dyn Dataset>,
    pub test: Arc<dyn Dataset>,
    pub dataset_calls: Cell<usize>,
}

impl StubProvider {
    pub fn new(train: Arc<dyn Dataset>, test: Arc<dyn Dataset>) -> Self {
        Self {
            train,
            test,
            dataset_calls: Cell::new(0),
        }
    }

    /// 40 training and 100 validation/test samples, labels matching codes.
    pub fn standard() -> Self {
        Self::new(coded_dataset(40, 0), coded_dataset(100, 0))
    }
}

impl DatasetProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    fn dataset(&self, split: Split) -> Result<Arc<dyn Dataset>, MlError> {
        self.dataset_calls.set(self.dataset_calls.get() + 1);
        Ok(match split {
            Split::Train => self.train.clone(),
            Split::Test => self.test.clone(),
        })
    }

    fn pipeline(&self, augmentation: Augmentation) -> Pipeline {
        match augmentation {
            Augmentation::Train => Pipeline::identity("stub_train"),
            Augmentation::Eval => Pipeline::identity("stub_eval"),
        }
    }
}

pub fn recipe(epochs: usize) -> TrainingRecipe {
    TrainingRecipe {
        epochs,
        batch_size: 10,
        log_every_batches: 1,
        ..TrainingRecipe::default()
    }
}

/// Small, fast configuration with its checkpoint under `dir`.
pub fn config(dir: &Path, epochs: usize) -> BenchConfig {
    let mut config = BenchConfig::default();
    config.checkpoint.path = dir.join("checkpoints").join("best.json");
    config.recipe = recipe(epochs);
    config.evaluation.batch_size = 16;
    config.evaluation.subset_size = Some(40);
    config
}
