use neurite_core::{NeuriteError, NeuriteResult};
use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded randomness for one training run: weight init, shuffles and the
/// dropout / dropconnect masks.
///
/// Only the controlling thread draws from it; masks are drawn up front and
/// handed to the parallel per-neuron work.
#[derive(Debug, Clone)]
pub struct RandomContext {
    seed: u64,
    rng: StdRng,
    dropout_probability: f64,
    dropconnect_probability: f64,
    dropout: Bernoulli,
    dropconnect: Bernoulli,
}

fn bernoulli(name: &str, p: f64) -> NeuriteResult<Bernoulli> {
    Bernoulli::new(p).map_err(|_| NeuriteError::config(format!("{} must be in [0, 1], got {}", name, p)))
}

impl RandomContext {
    /// A seed of 0 draws a fresh one from the OS.
    pub fn new(seed: u64, dropout: f64, dropconnect: f64) -> NeuriteResult<Self> {
        let seed = if seed == 0 { rand::thread_rng().gen_range(1..u64::MAX) } else { seed };
        Ok(RandomContext {
            seed,
            rng: StdRng::seed_from_u64(seed),
            dropout_probability: dropout,
            dropconnect_probability: dropconnect,
            dropout: bernoulli("dropout", dropout)?,
            dropconnect: bernoulli("dropconnect", dropconnect)?,
        })
    }

    /// The seed actually in use.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Probability that a layer output is dropped during training.
    pub fn dropout(&self) -> f64 {
        self.dropout_probability
    }

    /// Probability that a single connection is dropped during training.
    pub fn dropconnect(&self) -> f64 {
        self.dropconnect_probability
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// `n` draws, `true` meaning the output is dropped.
    pub fn dropout_mask(&mut self, n: usize) -> Vec<bool> {
        (0..n).map(|_| self.dropout.sample(&mut self.rng)).collect()
    }

    /// `n` draws, `true` meaning the connection is dropped.
    pub fn dropconnect_mask(&mut self, n: usize) -> Vec<bool> {
        (0..n).map(|_| self.dropconnect.sample(&mut self.rng)).collect()
    }
}
