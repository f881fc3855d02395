//! # Neurite
//!
//! Feed-forward neural network training in pure Rust.
//!
//! ## Modules
//!
//! - **core**: `Matrix` (dense row-major `f64`) and the shared error type
//! - **linalg**: Covariance and symmetric eigendecomposition (cyclic Jacobi)
//! - **preprocessing**: Center, normalize, standardize, decorrelate, whiten, reduce
//! - **nn**: Activations, aggregations, neurons and layers
//! - **optim**: Per-weight optimizers (momentum, Adam family…) and learning-rate decay
//! - **loss**: MAE, MSE, cross entropy, binary cross entropy
//! - **metrics**: Regression and classification test metrics
//! - **data**: `Data` records, train/validation/test split, batches
//! - **io**: `.out` / `.save` model files and JSON configuration
//! - **network**: Training loop with early stopping, inference, persistence
//!
//! ## Example
//!
//! ```no_run
//! use neurite::prelude::*;
//!
//! # fn main() -> neurite::core::NeuriteResult<()> {
//! let inputs = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]])?;
//! let outputs = Matrix::from_rows(&[vec![1.0], vec![1.0], vec![0.0], vec![0.0]])?;
//! let param = NetworkParam {
//!     preprocess_inputs: vec![Preprocess::Center],
//!     ..NetworkParam::default()
//! };
//! let mut net = Network::new(Data::new(inputs, outputs)?, param)?;
//! net.add_layer(LayerParam::with_size(8));
//! net.add_layer(LayerParam::default());
//! match net.learn()? {
//!     LearnOutcome::Completed { optimal_epoch } => println!("best epoch {}", optimal_epoch),
//!     LearnOutcome::Diverged { epoch } => println!("diverged at epoch {}", epoch),
//! }
//! # Ok(())
//! # }
//! ```

/// Matrix and errors.
pub use neurite_core as core;

/// Eigendecomposition.
pub use neurite_linalg as linalg;

/// Data preprocessing.
pub use neurite_preprocessing as preprocessing;

/// Neurons and layers.
pub use neurite_nn as nn;

/// Optimizers and decay.
pub use neurite_optim as optim;

/// Loss functions.
pub use neurite_loss as loss;

/// Evaluation metrics.
pub use neurite_metrics as metrics;

/// Training data.
pub use neurite_data as data;

/// Model files and configuration.
pub use neurite_io as io;

/// The training loop.
pub use neurite_network as network;

/// The types needed to build and train a network.
pub mod prelude {
    pub use neurite_core::{Matrix, NeuriteError, NeuriteResult};
    pub use neurite_data::Data;
    pub use neurite_loss::Loss;
    pub use neurite_network::{LearnOutcome, Network, NetworkParam};
    pub use neurite_nn::{ActivationKind, AggregationKind, Distrib, LayerParam};
    pub use neurite_optim::{Decay, Optimizer};
    pub use neurite_preprocessing::Preprocess;
}
