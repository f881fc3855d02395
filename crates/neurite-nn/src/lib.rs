//! Neurons and fully connected layers.
//!
//! A [`Neuron`] pairs an [`Aggregation`] with an [`Activation`]; a [`Layer`]
//! fans its neurons out over a rayon pool. All randomness comes from a
//! [`RandomContext`] owned by the caller.

pub mod activation;
pub mod aggregation;
pub mod context;
pub mod layer;
pub mod neuron;

pub use activation::{Activation, ActivationKind};
pub use aggregation::{Aggregation, AggregationKind};
pub use context::RandomContext;
pub use layer::{Layer, LayerParam};
pub use neuron::{Distrib, Neuron};
