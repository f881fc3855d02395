use neurite_core::NeuriteResult;
use neurite_loss::Loss;
use neurite_optim::{Decay, DecaySchedule, Optimizer, UpdateParams};
use neurite_preprocessing::Preprocess;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hyperparameters of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParam {
    /// 0 draws a seed from the OS.
    pub seed: u64,
    /// 0 trains on the whole training set at once.
    pub batch_size: usize,
    pub learning_rate: f64,
    pub l1: f64,
    pub l2: f64,
    /// Upper bound on the number of epochs.
    pub epoch: usize,
    /// Epochs without improvement tolerated before stopping.
    pub patience: usize,
    pub dropout: f64,
    pub dropconnect: f64,
    pub validation_ratio: f64,
    pub test_ratio: f64,
    pub loss: Loss,
    pub decay_value: f64,
    pub decay_delay: usize,
    pub decay: Decay,
    /// Probability at which a class prediction counts as positive.
    pub class_validity: f64,
    pub threads: usize,
    pub optimizer: Optimizer,
    pub momentum: f64,
    pub window: f64,
    /// A validation loss improves on the best one only when below `best × plateau`.
    pub plateau: f64,
    pub preprocess_inputs: Vec<Preprocess>,
    pub preprocess_outputs: Vec<Preprocess>,
    pub optimizer_bias: f64,
    pub input_reduction_threshold: f64,
    pub output_reduction_threshold: f64,
    pub input_whitening_bias: f64,
    /// Stem of the `.out` / `.save` pair written after training, empty for none.
    pub name: String,
}

impl Default for NetworkParam {
    fn default() -> Self {
        NetworkParam {
            seed: 0,
            batch_size: 0,
            learning_rate: 0.001,
            l1: 0.0,
            l2: 0.0,
            epoch: 30,
            patience: 5,
            dropout: 0.0,
            dropconnect: 0.0,
            validation_ratio: 0.2,
            test_ratio: 0.2,
            loss: Loss::L2,
            decay_value: 0.05,
            decay_delay: 5,
            decay: Decay::None,
            class_validity: 0.9,
            threads: 1,
            optimizer: Optimizer::None,
            momentum: 0.9,
            window: 0.9,
            plateau: 0.99,
            preprocess_inputs: Vec::new(),
            preprocess_outputs: Vec::new(),
            optimizer_bias: 1e-4,
            input_reduction_threshold: 0.99,
            output_reduction_threshold: 0.99,
            input_whitening_bias: 1e-3,
            name: String::new(),
        }
    }
}

impl NetworkParam {
    /// Read from a JSON file; missing keys keep their defaults.
    pub fn from_json(path: &Path) -> NeuriteResult<Self> {
        neurite_io::load_json(path)
    }

    pub fn schedule(&self) -> DecaySchedule {
        DecaySchedule::new(self.decay, self.decay_value, self.decay_delay)
    }

    /// Update settings for one epoch at `learning_rate`.
    pub fn update_params(&self, learning_rate: f64) -> UpdateParams {
        UpdateParams {
            optimizer: self.optimizer,
            learning_rate,
            l1: self.l1,
            l2: self.l2,
            momentum: self.momentum,
            window: self.window,
            epsilon: self.optimizer_bias,
        }
    }
}
