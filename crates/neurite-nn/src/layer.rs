use crate::activation::ActivationKind;
use crate::aggregation::AggregationKind;
use crate::context::RandomContext;
use crate::neuron::{Distrib, Neuron};
use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use neurite_io::LayerRecord;
use neurite_optim::UpdateParams;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

/// Construction settings for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerParam {
    pub size: usize,
    /// Per weight set Euclidean norm cap, 0 disables it.
    pub max_norm: f64,
    pub distrib: Distrib,
    /// Mean of the Normal init, or the squared boundary numerator of the Uniform one.
    pub mean_boundary: f64,
    pub deviation: f64,
    pub weight_sets: usize,
    pub aggregation: AggregationKind,
    pub activation: ActivationKind,
}

impl Default for LayerParam {
    fn default() -> Self {
        LayerParam {
            size: 8,
            max_norm: 0.0,
            distrib: Distrib::Normal,
            mean_boundary: 0.0,
            deviation: 2.0,
            weight_sets: 1,
            aggregation: AggregationKind::Dot,
            activation: ActivationKind::Relu,
        }
    }
}

impl LayerParam {
    /// Defaults for a uniformly initialized layer.
    pub fn uniform() -> Self {
        LayerParam {
            distrib: Distrib::Uniform,
            mean_boundary: 6.0,
            ..LayerParam::default()
        }
    }

    pub fn with_size(size: usize) -> Self {
        LayerParam {
            size,
            ..LayerParam::default()
        }
    }
}

/// A fully connected layer: every neuron sees the whole input row.
///
/// Forward, backward and update are fanned out over the neurons on the
/// given thread pool. Random masks are drawn beforehand on the calling thread.
#[derive(Debug, Clone)]
pub struct Layer {
    param: LayerParam,
    neurons: Vec<Neuron>,
    input_width: usize,
    dropout_mask: Vec<bool>,
    dropout_scale: f64,
}

impl Layer {
    pub fn new(param: LayerParam) -> Self {
        Layer {
            param,
            neurons: Vec::new(),
            input_width: 0,
            dropout_mask: Vec::new(),
            dropout_scale: 1.0,
        }
    }

    pub fn param(&self) -> &LayerParam {
        &self.param
    }

    /// Number of neurons (the width of this layer's output).
    pub fn size(&self) -> usize {
        self.param.size
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Change the declared output width. Only meaningful before [`Layer::init`].
    pub fn resize(&mut self, size: usize) {
        self.param.size = size;
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    pub fn neurons_mut(&mut self) -> &mut [Neuron] {
        &mut self.neurons
    }

    /// Every weight of every neuron, in neuron order.
    pub fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.neurons.iter().flat_map(|n| n.weights().data().iter().copied())
    }

    /// Build fresh neurons for `nb_inputs` inputs; `nb_outputs` is the next
    /// layer's size (0 for the last layer) and only scales the init.
    pub fn init(&mut self, nb_inputs: usize, nb_outputs: usize, ctx: &mut RandomContext) -> NeuriteResult<()> {
        if self.param.size == 0 {
            return Err(NeuriteError::config("a layer needs at least one neuron"));
        }
        let mut neurons = Vec::with_capacity(self.param.size);
        for _ in 0..self.param.size {
            let mut neuron = Neuron::new(self.param.aggregation, self.param.activation);
            neuron.init(
                self.param.distrib,
                self.param.mean_boundary,
                self.param.deviation,
                nb_inputs,
                nb_outputs,
                self.param.weight_sets,
                ctx.rng(),
            )?;
            neurons.push(neuron);
        }
        self.neurons = neurons;
        self.input_width = nb_inputs;
        self.dropout_mask.clear();
        log::debug!(
            "layer initialized: {} inputs -> {} neurons ({:?}/{:?})",
            nb_inputs,
            self.param.size,
            self.param.aggregation,
            self.param.activation
        );
        Ok(())
    }

    fn check_width(&self, inputs: &Matrix) -> NeuriteResult<()> {
        if inputs.cols() != self.input_width {
            return Err(NeuriteError::ShapeMismatch {
                expected: vec![inputs.rows(), self.input_width],
                got: vec![inputs.rows(), inputs.cols()],
            });
        }
        Ok(())
    }

    /// Inference: one output row per input row.
    pub fn process(&self, inputs: &Matrix, pool: &ThreadPool) -> NeuriteResult<Matrix> {
        self.check_width(inputs)?;
        let columns: Vec<Vec<f64>> = pool.install(|| self.neurons.par_iter().map(|n| n.process(inputs)).collect());
        Ok(from_columns(&columns, inputs.rows()))
    }

    /// Training forward pass with dropconnect on inputs and dropout on outputs.
    /// Both probabilities are the ones `ctx` samples its masks with.
    pub fn process_to_learn(&mut self, inputs: &Matrix, ctx: &mut RandomContext, pool: &ThreadPool) -> NeuriteResult<Matrix> {
        self.check_width(inputs)?;
        let dropout = ctx.dropout();
        let dropconnect = ctx.dropconnect();
        let masks: Vec<Option<Vec<bool>>> = (0..self.neurons.len())
            .map(|_| (dropconnect > 0.0).then(|| ctx.dropconnect_mask(inputs.rows() * inputs.cols())))
            .collect();

        let columns: Vec<Vec<f64>> = pool.install(|| {
            self.neurons
                .par_iter_mut()
                .zip(masks.par_iter())
                .map(|(n, mask)| n.process_to_learn(inputs, mask.as_deref(), dropconnect))
                .collect()
        });
        let mut outputs = from_columns(&columns, inputs.rows());

        if dropout > 0.0 {
            self.dropout_mask = ctx.dropout_mask(outputs.rows() * outputs.cols());
            self.dropout_scale = 1.0 / (1.0 - dropout);
            apply_mask(&mut outputs, &self.dropout_mask, self.dropout_scale);
        } else {
            self.dropout_mask.clear();
        }
        Ok(outputs)
    }

    /// Backward pass. `upstream` is ∂loss/∂output, one row per feature.
    pub fn compute_gradients(&mut self, upstream: &Matrix, pool: &ThreadPool) -> NeuriteResult<()> {
        if upstream.cols() != self.neurons.len() {
            return Err(NeuriteError::ShapeMismatch {
                expected: vec![upstream.rows(), self.neurons.len()],
                got: vec![upstream.rows(), upstream.cols()],
            });
        }
        let mut upstream = upstream.clone();
        if !self.dropout_mask.is_empty() {
            apply_mask(&mut upstream, &self.dropout_mask, self.dropout_scale);
        }
        let columns: Vec<Vec<f64>> = (0..upstream.cols()).map(|j| upstream.col(j)).collect();
        pool.install(|| {
            self.neurons
                .par_iter_mut()
                .zip(columns.par_iter())
                .for_each(|(n, col)| n.compute_gradients(col))
        });
        Ok(())
    }

    /// ∂loss/∂input summed over neurons, for the previous layer.
    pub fn input_gradients(&self) -> Matrix {
        let mut total: Option<Matrix> = None;
        for neuron in &self.neurons {
            let g = neuron.gradients_per_feature();
            total = Some(match total {
                None => g.clone(),
                Some(mut acc) => {
                    acc.data_mut().iter_mut().zip(g.data()).for_each(|(a, b)| *a += b);
                    acc
                }
            });
        }
        total.unwrap_or_default()
    }

    pub fn update_weights(&mut self, params: &UpdateParams, pool: &ThreadPool) {
        let max_norm = self.param.max_norm;
        pool.install(|| {
            self.neurons
                .par_iter_mut()
                .for_each(|n| n.update_weights(params, max_norm))
        });
    }

    pub fn save(&mut self) {
        self.neurons.iter_mut().for_each(Neuron::save);
    }

    pub fn load_saved(&mut self) {
        self.neurons.iter_mut().for_each(Neuron::load_saved);
    }

    pub fn to_record(&self) -> LayerRecord {
        LayerRecord {
            neurons: self.neurons.iter().map(Neuron::to_record).collect(),
        }
    }

    /// Rebuild a layer from its persisted neurons. The parameters are
    /// recovered from the first neuron.
    pub fn from_record(record: &LayerRecord) -> NeuriteResult<Self> {
        let neurons = record
            .neurons
            .iter()
            .map(Neuron::from_record)
            .collect::<NeuriteResult<Vec<_>>>()?;
        let first = neurons
            .first()
            .ok_or_else(|| NeuriteError::InvalidOperation("layer without neurons".to_string()))?;
        let input_width = first.nb_inputs();
        if let Some(bad) = neurons.iter().find(|n| n.nb_inputs() != input_width) {
            return Err(NeuriteError::DimensionMismatch(format!(
                "neurons of one layer take {} and {} inputs",
                input_width,
                bad.nb_inputs()
            )));
        }
        let param = LayerParam {
            size: neurons.len(),
            weight_sets: first.weights().rows(),
            aggregation: first.aggregation().kind(),
            activation: first.activation().kind(),
            ..LayerParam::default()
        };
        Ok(Layer {
            param,
            neurons,
            input_width,
            dropout_mask: Vec::new(),
            dropout_scale: 1.0,
        })
    }
}

fn from_columns(columns: &[Vec<f64>], rows: usize) -> Matrix {
    let mut out = Matrix::zeros(rows, columns.len());
    for (j, col) in columns.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            out[(i, j)] = v;
        }
    }
    out
}

fn apply_mask(m: &mut Matrix, dropped: &[bool], scale: f64) {
    for (v, &drop) in m.data_mut().iter_mut().zip(dropped) {
        if drop {
            *v = 0.0;
        } else {
            *v *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use neurite_optim::Optimizer;
    use rayon::ThreadPoolBuilder;

    fn pool() -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn inputs() -> Matrix {
        Matrix::from_rows(&[vec![0.5, -1.0, 2.0], vec![1.5, 0.0, -0.5], vec![-1.0, 1.0, 1.0]]).unwrap()
    }

    fn layer(activation: ActivationKind) -> (Layer, RandomContext) {
        layer_with(activation, 0.0, 0.0)
    }

    fn layer_with(activation: ActivationKind, dropout: f64, dropconnect: f64) -> (Layer, RandomContext) {
        let mut ctx = RandomContext::new(7, dropout, dropconnect).unwrap();
        let mut layer = Layer::new(LayerParam {
            size: 4,
            activation,
            ..LayerParam::default()
        });
        layer.init(3, 2, &mut ctx).unwrap();
        (layer, ctx)
    }

    #[test]
    fn test_process_shape_and_determinism() {
        let (l, _) = layer(ActivationKind::Tanh);
        let pool = pool();
        let out = l.process(&inputs(), &pool).unwrap();
        assert_eq!(out.shape(), (3, 4));
        assert_eq!(out, l.process(&inputs(), &pool).unwrap());
        assert!(l.process(&Matrix::zeros(2, 5), &pool).is_err());
    }

    #[test]
    fn test_no_dropconnect_matches_inference() {
        let (mut l, mut ctx) = layer(ActivationKind::Sigmoid);
        let pool = pool();
        let plain = l.process(&inputs(), &pool).unwrap();
        let learned = l.process_to_learn(&inputs(), &mut ctx, &pool).unwrap();
        assert_eq!(plain, learned);
    }

    #[test]
    fn test_full_dropconnect_keeps_only_bias() {
        let (mut l, mut ctx) = layer_with(ActivationKind::Linear, 0.0, 1.0);
        let pool = pool();
        let out = l.process_to_learn(&inputs(), &mut ctx, &pool).unwrap();
        for i in 0..out.rows() {
            for (j, n) in l.neurons().iter().enumerate() {
                assert_eq!(out[(i, j)], n.bias()[0]);
            }
        }

        l.compute_gradients(&Matrix::full(3, 4, 1.0), &pool).unwrap();
        let grads = l.input_gradients();
        assert_eq!(grads.shape(), (3, 3));
        assert!(grads.data().iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_partial_dropconnect_outputs_are_finite() {
        let (mut l, mut ctx) = layer_with(ActivationKind::Linear, 0.0, 0.5);
        let pool = pool();
        let out = l.process_to_learn(&inputs(), &mut ctx, &pool).unwrap();
        assert!(out.data().iter().all(|v| v.is_finite()));
        l.compute_gradients(&Matrix::full(3, 4, 1.0), &pool).unwrap();
        assert!(l.input_gradients().data().iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_dropout_zeroes_and_scales() {
        let (mut l, mut ctx) = layer_with(ActivationKind::Linear, 0.5, 0.0);
        let pool = pool();
        let plain = l.process(&inputs(), &pool).unwrap();
        let out = l.process_to_learn(&inputs(), &mut ctx, &pool).unwrap();
        for (o, p) in out.data().iter().zip(plain.data()) {
            assert!(*o == 0.0 || (o - 2.0 * p).abs() < 1e-12);
        }
    }

    #[test]
    fn test_input_gradients_for_linear_layer() {
        let (mut l, mut ctx) = layer(ActivationKind::Linear);
        let pool = pool();
        l.process_to_learn(&inputs(), &mut ctx, &pool).unwrap();
        let upstream = Matrix::full(3, 4, 1.0);
        l.compute_gradients(&upstream, &pool).unwrap();
        let grads = l.input_gradients();
        assert_eq!(grads.shape(), (3, 3));
        // all-ones upstream through linear neurons: the column sums of W
        for k in 0..3 {
            let expected: f64 = l.neurons().iter().map(|n| n.weights()[(0, k)]).sum();
            assert_abs_diff_eq!(grads[(0, k)], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_update_reduces_squared_output() {
        let (mut l, mut ctx) = layer(ActivationKind::Linear);
        let pool = pool();
        let params = UpdateParams {
            optimizer: Optimizer::None,
            learning_rate: 0.05,
            ..UpdateParams::default()
        };
        let energy = |m: &Matrix| m.data().iter().map(|v| v * v).sum::<f64>();
        let before = energy(&l.process(&inputs(), &pool).unwrap());
        for _ in 0..20 {
            let out = l.process_to_learn(&inputs(), &mut ctx, &pool).unwrap();
            l.compute_gradients(&out, &pool).unwrap();
            l.update_weights(&params, &pool);
        }
        let after = energy(&l.process(&inputs(), &pool).unwrap());
        assert!(after < before);
    }

    #[test]
    fn test_record_round_trip() {
        let (l, _) = layer(ActivationKind::Elu);
        let back = Layer::from_record(&l.to_record()).unwrap();
        assert_eq!(back.size(), 4);
        assert_eq!(back.input_width(), 3);
        assert_eq!(back.param().activation, ActivationKind::Elu);
        let pool = pool();
        assert_eq!(back.process(&inputs(), &pool).unwrap(), l.process(&inputs(), &pool).unwrap());
    }

    #[test]
    fn test_save_and_restore() {
        let (mut l, mut ctx) = layer(ActivationKind::Linear);
        let pool = pool();
        let snapshot = l.process(&inputs(), &pool).unwrap();
        l.save();
        let params = UpdateParams {
            learning_rate: 0.1,
            ..UpdateParams::default()
        };
        let out = l.process_to_learn(&inputs(), &mut ctx, &pool).unwrap();
        l.compute_gradients(&out, &pool).unwrap();
        l.update_weights(&params, &pool);
        assert_ne!(l.process(&inputs(), &pool).unwrap(), snapshot);
        l.load_saved();
        assert_eq!(l.process(&inputs(), &pool).unwrap(), snapshot);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let mut ctx = RandomContext::new(1, 0.0, 0.0).unwrap();
        let mut l = Layer::new(LayerParam::with_size(0));
        assert!(l.init(3, 0, &mut ctx).unwrap_err().is_configuration());
    }
}
