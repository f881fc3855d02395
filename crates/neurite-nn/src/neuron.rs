use crate::activation::{Activation, ActivationKind};
use crate::aggregation::{Aggregation, AggregationKind};
use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use neurite_io::NeuronRecord;
use neurite_optim::{regularized, UpdateParams, WeightState};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// Weight initialization distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distrib {
    #[default]
    Normal,
    Uniform,
}

#[derive(Debug, Clone)]
struct Snapshot {
    weights: Matrix,
    bias: Vec<f64>,
    activation: Activation,
}

/// One unit: an aggregation over a set of weight rows followed by an activation.
///
/// Per-batch state (dropped-out inputs, aggregation results, gradients) is
/// overwritten by each `process_to_learn` / `compute_gradients` pair.
#[derive(Debug, Clone)]
pub struct Neuron {
    aggregation: Aggregation,
    activation: Activation,
    weights: Matrix,
    bias: Vec<f64>,

    weight_states: Vec<WeightState>,
    bias_states: Vec<WeightState>,
    iteration: usize,

    inputs: Matrix,
    /// Row-major `batch × inputs` factor applied by dropconnect, empty when off.
    connection_scale: Vec<f64>,
    aggreg_results: Vec<(f64, usize)>,
    act_gradients: Vec<f64>,
    gradients: Matrix,
    bias_gradients: Vec<f64>,
    coef_gradient: f64,
    gradients_per_feature: Matrix,

    saved: Option<Snapshot>,
}

impl Neuron {
    pub fn new(aggregation: AggregationKind, activation: ActivationKind) -> Self {
        Neuron::from_parts(Aggregation::new(aggregation), Activation::new(activation), Matrix::zeros(0, 0), Vec::new())
    }

    fn from_parts(aggregation: Aggregation, activation: Activation, weights: Matrix, bias: Vec<f64>) -> Self {
        let sets = weights.rows();
        let n = weights.data().len();
        Neuron {
            aggregation,
            activation,
            gradients: Matrix::zeros(sets, weights.cols()),
            weights,
            bias_states: vec![WeightState::default(); bias.len()],
            bias_gradients: vec![0.0; bias.len()],
            bias,
            weight_states: vec![WeightState::default(); n],
            iteration: 0,
            inputs: Matrix::zeros(0, 0),
            connection_scale: Vec::new(),
            aggreg_results: Vec::new(),
            act_gradients: Vec::new(),
            coef_gradient: 0.0,
            gradients_per_feature: Matrix::zeros(0, 0),
            saved: None,
        }
    }

    /// Allocate `weight_sets × nb_inputs` weights drawn from `distrib`,
    /// scaled by fan-in plus fan-out, and reset optimizer state.
    #[allow(clippy::too_many_arguments)]
    pub fn init<R: Rng + ?Sized>(
        &mut self,
        distrib: Distrib,
        mean_boundary: f64,
        deviation: f64,
        nb_inputs: usize,
        nb_outputs: usize,
        weight_sets: usize,
        rng: &mut R,
    ) -> NeuriteResult<()> {
        let fan = (nb_inputs + nb_outputs).max(1) as f64;
        let sets = self.aggregation.kind().weight_sets(weight_sets);
        let mut data = vec![0.0; sets * nb_inputs];
        match distrib {
            Distrib::Normal => {
                let normal = Normal::new(mean_boundary, (deviation / fan).sqrt())
                    .map_err(|e| NeuriteError::config(format!("normal initialization: {}", e)))?;
                data.iter_mut().for_each(|w| *w = normal.sample(rng));
            }
            Distrib::Uniform => {
                let boundary = (mean_boundary / fan).sqrt();
                if !boundary.is_finite() {
                    return Err(NeuriteError::config(format!(
                        "uniform initialization boundary must be non-negative, got {}",
                        mean_boundary
                    )));
                }
                let uniform = Uniform::new_inclusive(-boundary, boundary);
                data.iter_mut().for_each(|w| *w = uniform.sample(rng));
            }
        }
        let weights = Matrix::new(data, sets, nb_inputs)?;
        *self = Neuron::from_parts(self.aggregation.clone(), self.activation.clone(), weights, vec![0.0; sets]);
        Ok(())
    }

    pub fn nb_inputs(&self) -> usize {
        self.weights.cols()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Matrix {
        &mut self.weights
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }

    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    /// Forward pass over a batch (one row per feature), without touching state.
    pub fn process(&self, inputs: &Matrix) -> Vec<f64> {
        inputs
            .iter_rows()
            .map(|row| self.activation.activate(self.aggregation.aggregate(row, &self.weights, &self.bias).0))
            .collect()
    }

    /// Forward pass recording what the backward pass needs.
    ///
    /// `dropped` is a row-major `batch × inputs` mask; each dropped connection
    /// is zeroed and the survivors are scaled by `1 / (1 − dropconnect)`.
    pub fn process_to_learn(&mut self, inputs: &Matrix, dropped: Option<&[bool]>, dropconnect: f64) -> Vec<f64> {
        self.inputs = inputs.clone();
        self.connection_scale = match dropped {
            Some(mask) => {
                let keep_scale = 1.0 / (1.0 - dropconnect);
                mask.iter().map(|&drop| if drop { 0.0 } else { keep_scale }).collect()
            }
            None => Vec::new(),
        };
        if !self.connection_scale.is_empty() {
            for (v, s) in self.inputs.data_mut().iter_mut().zip(&self.connection_scale) {
                *v *= s;
            }
        }

        self.aggreg_results = self
            .inputs
            .iter_rows()
            .map(|row| self.aggregation.aggregate(row, &self.weights, &self.bias))
            .collect();
        self.aggreg_results
            .iter()
            .map(|&(value, _)| self.activation.activate(value))
            .collect()
    }

    /// Backward pass for the last `process_to_learn` batch.
    ///
    /// `upstream` holds ∂loss/∂output for each feature. Weight gradients are
    /// averaged over the features routed to each weight set.
    pub fn compute_gradients(&mut self, upstream: &[f64]) {
        let batch = self.aggreg_results.len();
        let nb_inputs = self.weights.cols();
        self.gradients = Matrix::zeros(self.weights.rows(), nb_inputs);
        self.gradients_per_feature = Matrix::zeros(batch, nb_inputs);
        self.bias_gradients = vec![0.0; self.weights.rows()];
        self.act_gradients = vec![0.0; batch];
        let mut set_count = vec![0usize; self.weights.rows()];
        let mut coef_gradient = 0.0;

        for feature in 0..batch {
            let (value, set) = self.aggreg_results[feature];
            let act_gradient = self.activation.prime(value) * upstream[feature];
            self.act_gradients[feature] = act_gradient;
            coef_gradient += upstream[feature] * self.activation.prime_coef(value);

            let input = self.inputs.row(feature);
            let weights = self.weights.row(set);
            let grad = self.aggregation.prime(input, weights);
            let grad_input = self.aggregation.prime_input(input, weights);

            for (g, d) in self.gradients.row_mut(set).iter_mut().zip(&grad) {
                *g += act_gradient * d;
            }
            for (g, d) in self.gradients_per_feature.row_mut(feature).iter_mut().zip(&grad_input) {
                *g = act_gradient * d;
            }
            if !self.connection_scale.is_empty() {
                let scale = &self.connection_scale[feature * nb_inputs..(feature + 1) * nb_inputs];
                for (g, s) in self.gradients_per_feature.row_mut(feature).iter_mut().zip(scale) {
                    *g *= s;
                }
            }
            self.bias_gradients[set] += act_gradient;
            set_count[set] += 1;
        }

        for (set, &count) in set_count.iter().enumerate() {
            if count > 0 {
                self.gradients.row_mut(set).iter_mut().for_each(|g| *g /= count as f64);
                self.bias_gradients[set] /= count as f64;
            }
        }
        self.coef_gradient = if batch > 0 { coef_gradient / batch as f64 } else { 0.0 };
    }

    /// ∂loss/∂input, one row per feature of the last batch.
    pub fn gradients_per_feature(&self) -> &Matrix {
        &self.gradients_per_feature
    }

    /// Apply the optimizer step to every weight and bias, let the activation
    /// learn its coefficient, then clip each weight set to `max_norm`.
    pub fn update_weights(&mut self, params: &UpdateParams, max_norm: f64) {
        self.iteration += 1;
        let optimizer = params.optimizer;

        for ((w, state), &g) in self
            .weights
            .data_mut()
            .iter_mut()
            .zip(self.weight_states.iter_mut())
            .zip(self.gradients.data())
        {
            let gradient = regularized(g, *w, params.l1, params.l2);
            *w += optimizer.step(state, gradient, params, self.iteration);
        }
        for ((b, state), &g) in self
            .bias
            .iter_mut()
            .zip(self.bias_states.iter_mut())
            .zip(&self.bias_gradients)
        {
            *b += optimizer.step(state, g, params, self.iteration);
        }

        self.activation
            .learn(self.coef_gradient, params.learning_rate, params.momentum);
        let mean_act_gradient = if self.act_gradients.is_empty() {
            0.0
        } else {
            self.act_gradients.iter().sum::<f64>() / self.act_gradients.len() as f64
        };
        self.aggregation
            .learn(mean_act_gradient, params.learning_rate, params.momentum);

        if max_norm > 0.0 {
            for set in 0..self.weights.rows() {
                let row = self.weights.row_mut(set);
                let norm = row.iter().map(|w| w * w).sum::<f64>().sqrt();
                if norm > max_norm {
                    row.iter_mut().for_each(|w| *w *= max_norm / norm);
                }
            }
        }
    }

    /// Remember the current parameters as the best so far.
    pub fn save(&mut self) {
        self.saved = Some(Snapshot {
            weights: self.weights.clone(),
            bias: self.bias.clone(),
            activation: self.activation.clone(),
        });
    }

    /// Restore the parameters remembered by [`Neuron::save`], if any.
    pub fn load_saved(&mut self) {
        if let Some(s) = &self.saved {
            self.weights = s.weights.clone();
            self.bias = s.bias.clone();
            self.activation = s.activation.clone();
        }
    }

    pub fn to_record(&self) -> NeuronRecord {
        NeuronRecord {
            aggregation: self.aggregation.kind().id(),
            aggregation_coefs: self.aggregation.coefs(),
            activation: self.activation.kind().id(),
            activation_coefs: self.activation.coefs(),
            bias: self.bias.clone(),
            weights: self.weights.data().to_vec(),
        }
    }

    pub fn from_record(record: &NeuronRecord) -> NeuriteResult<Self> {
        let agg_kind = AggregationKind::from_id(record.aggregation).ok_or_else(|| {
            NeuriteError::InvalidOperation(format!("unknown aggregation id {}", record.aggregation))
        })?;
        let act_kind = ActivationKind::from_id(record.activation).ok_or_else(|| {
            NeuriteError::InvalidOperation(format!("unknown activation id {}", record.activation))
        })?;
        let weights = Matrix::new(record.weights.clone(), record.weight_sets(), record.weights_per_set())?;
        Ok(Neuron::from_parts(
            Aggregation::with_coefs(agg_kind, &record.aggregation_coefs)?,
            Activation::with_coefs(act_kind, &record.activation_coefs)?,
            weights,
            record.bias.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use neurite_optim::Optimizer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn linear_neuron(weights: &[f64], bias: f64) -> Neuron {
        Neuron::from_parts(
            Aggregation::new(AggregationKind::Dot),
            Activation::new(ActivationKind::Linear),
            Matrix::from_row(weights),
            vec![bias],
        )
    }

    fn batch() -> Matrix {
        Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, -1.0]]).unwrap()
    }

    #[test]
    fn test_init_shapes_and_scale() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut n = Neuron::new(AggregationKind::Dot, ActivationKind::Relu);
        n.init(Distrib::Normal, 0.0, 2.0, 400, 400, 1, &mut rng).unwrap();
        assert_eq!(n.weights().shape(), (1, 400));
        assert_eq!(n.bias().len(), 1);
        let var = n.weights().data().iter().map(|w| w * w).sum::<f64>() / 400.0;
        assert!((var - 2.0 / 800.0).abs() < 1e-3);

        let mut m = Neuron::new(AggregationKind::Maxout, ActivationKind::Linear);
        m.init(Distrib::Uniform, 6.0, 2.0, 10, 5, 3, &mut rng).unwrap();
        assert_eq!(m.weights().shape(), (3, 10));
        let bound = (6.0f64 / 15.0).sqrt();
        assert!(m.weights().data().iter().all(|w| w.abs() <= bound));
    }

    #[test]
    fn test_process_to_learn_without_mask_matches_process() {
        let mut n = linear_neuron(&[0.5, -0.25], 0.1);
        let plain = n.process(&batch());
        let learned = n.process_to_learn(&batch(), None, 0.0);
        assert_eq!(plain, learned);
    }

    #[test]
    fn test_full_dropconnect_leaves_bias() {
        let mut n = linear_neuron(&[0.5, -0.25], 0.1);
        let mask = vec![true; 4];
        let out = n.process_to_learn(&batch(), Some(&mask), 1.0);
        assert_eq!(out, vec![0.1, 0.1]);

        n.compute_gradients(&[1.0, 1.0]);
        assert!(n.gradients_per_feature().data().iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_dropconnect_scales_input_gradients() {
        let mut n = linear_neuron(&[0.5, -0.25], 0.1);
        // first feature loses its second input, second feature keeps both
        let mask = [false, true, false, false];
        let out = n.process_to_learn(&batch(), Some(&mask), 0.5);
        assert_abs_diff_eq!(out[0], 0.5 * 2.0 + 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1], 0.5 * 6.0 - 0.25 * -2.0 + 0.1, epsilon = 1e-12);

        n.compute_gradients(&[1.0, 1.0]);
        assert_eq!(n.gradients_per_feature().row(0), &[1.0, 0.0]);
        assert_eq!(n.gradients_per_feature().row(1), &[1.0, -0.5]);
    }

    #[test]
    fn test_gradients_are_batch_means() {
        let mut n = linear_neuron(&[0.5, -0.25], 0.1);
        n.process_to_learn(&batch(), None, 0.0);
        n.compute_gradients(&[1.0, 2.0]);
        // mean of upstream · input over the batch
        assert_abs_diff_eq!(n.gradients[(0, 0)], (1.0 + 6.0) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(n.gradients[(0, 1)], (2.0 - 2.0) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(n.bias_gradients[0], 1.5, epsilon = 1e-12);
        // per-input gradient is upstream · weight
        assert_eq!(n.gradients_per_feature().row(1), &[1.0, -0.5]);

        // a second pass does not accumulate on top of the first
        n.process_to_learn(&batch(), None, 0.0);
        n.compute_gradients(&[1.0, 2.0]);
        assert_abs_diff_eq!(n.gradients[(0, 0)], 3.5, epsilon = 1e-12);
    }

    #[test]
    fn test_update_descends_and_clips() {
        let mut n = linear_neuron(&[0.5, -0.25], 0.1);
        n.process_to_learn(&batch(), None, 0.0);
        n.compute_gradients(&[1.0, 2.0]);
        let params = UpdateParams {
            optimizer: Optimizer::None,
            learning_rate: 0.1,
            ..UpdateParams::default()
        };
        n.update_weights(&params, 0.0);
        assert_abs_diff_eq!(n.weights()[(0, 0)], 0.5 - 0.35, epsilon = 1e-12);
        assert_abs_diff_eq!(n.bias()[0], 0.1 - 0.15, epsilon = 1e-12);

        let mut big = linear_neuron(&[3.0, 4.0], 0.0);
        big.process_to_learn(&batch(), None, 0.0);
        big.compute_gradients(&[0.0, 0.0]);
        big.update_weights(&params, 1.0);
        let norm = big.weights().data().iter().map(|w| w * w).sum::<f64>().sqrt();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_save_and_load_saved() {
        let mut n = linear_neuron(&[0.5, -0.25], 0.1);
        n.save();
        n.weights_mut()[(0, 0)] = 9.0;
        n.load_saved();
        assert_eq!(n.weights()[(0, 0)], 0.5);
    }

    #[test]
    fn test_record_round_trip() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut n = Neuron::new(AggregationKind::Maxout, ActivationKind::Elu);
        n.init(Distrib::Normal, 0.0, 2.0, 4, 2, 2, &mut rng).unwrap();
        let back = Neuron::from_record(&n.to_record()).unwrap();
        assert_eq!(back.weights(), n.weights());
        assert_eq!(back.process(&Matrix::full(2, 4, 0.3)), n.process(&Matrix::full(2, 4, 0.3)));
    }
}
