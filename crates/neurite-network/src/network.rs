use crate::param::NetworkParam;
use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use neurite_data::{shuffle_rows, Data, DatasetSplit, SplitPlan};
use neurite_io::{read_layers, write_layers, LabelPredictions, LayerRecord, ModelInfo};
use neurite_loss::{average_loss, regularization_penalty, softmax, Loss};
use neurite_metrics::{classification_metrics, regression_metrics};
use neurite_nn::{Layer, LayerParam, RandomContext};
use neurite_preprocessing::{Preprocessor, Side};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};

/// How a call to [`Network::learn`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    /// Training ran to the epoch limit or stopped early; the weights of
    /// `optimal_epoch` are restored.
    Completed { optimal_epoch: usize },
    /// A tracked statistic became NaN at `epoch`. The weights are left as
    /// they were when it happened.
    Diverged { epoch: usize },
}

impl LearnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, LearnOutcome::Completed { .. })
    }
}

/// Per-epoch statistics, index 0 being the untrained network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingTrace {
    pub train_losses: Vec<f64>,
    pub valid_losses: Vec<f64>,
    pub first_metrics: Vec<f64>,
    pub second_metrics: Vec<f64>,
}

impl TrainingTrace {
    fn push(&mut self, stats: &EpochStats) {
        self.train_losses.push(stats.train_loss);
        self.valid_losses.push(stats.valid_loss);
        self.first_metrics.push(stats.first_metric);
        self.second_metrics.push(stats.second_metric);
    }

    pub fn len(&self) -> usize {
        self.valid_losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid_losses.is_empty()
    }

    fn clear(&mut self) {
        *self = TrainingTrace::default();
    }
}

#[derive(Debug, Clone, Copy)]
struct EpochStats {
    train_loss: f64,
    valid_loss: f64,
    first_metric: f64,
    second_metric: f64,
}

impl EpochStats {
    fn diverged(&self) -> bool {
        self.train_loss.is_nan() || self.valid_loss.is_nan() || self.first_metric.is_nan()
    }
}

/// A feed-forward network together with its data, preprocessing and
/// training state.
///
/// The thread pool is private to one network. Layers are evaluated one after
/// the other and the neurons of a layer in parallel.
pub struct Network {
    param: NetworkParam,
    data: Data,
    test_data: Option<Data>,
    layers: Vec<Layer>,
    pool: ThreadPool,
    input_preprocessor: Preprocessor,
    output_preprocessor: Preprocessor,
    raw_test_inputs: Matrix,
    raw_test_outputs: Matrix,
    trace: TrainingTrace,
    optimal_epoch: usize,
    prepared: Option<(DatasetSplit, RandomContext)>,
}

fn build_pool(threads: usize) -> NeuriteResult<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| NeuriteError::ThreadPool(e.to_string()))
}

fn preprocessors(param: &NetworkParam) -> NeuriteResult<(Preprocessor, Preprocessor)> {
    let input = Preprocessor::new(
        Side::Input,
        param.preprocess_inputs.clone(),
        param.input_reduction_threshold,
        param.input_whitening_bias,
    )?;
    let output = Preprocessor::new(
        Side::Output,
        param.preprocess_outputs.clone(),
        param.output_reduction_threshold,
        0.0,
    )?;
    Ok((input, output))
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

impl Network {
    /// Check `data` and `param` and set up the worker pool. Preprocessing
    /// lists are validated here, before any training.
    pub fn new(data: Data, param: NetworkParam) -> NeuriteResult<Self> {
        data.check()?;
        let (input_preprocessor, output_preprocessor) = preprocessors(&param)?;
        let pool = build_pool(param.threads)?;
        Ok(Network {
            raw_test_inputs: Matrix::zeros(0, data.inputs.cols()),
            raw_test_outputs: Matrix::zeros(0, data.outputs.cols()),
            param,
            data,
            test_data: None,
            layers: Vec::new(),
            pool,
            input_preprocessor,
            output_preprocessor,
            trace: TrainingTrace::default(),
            optimal_epoch: 0,
            prepared: None,
        })
    }

    /// Append a layer. The size of the last one is replaced by the output
    /// width once output preprocessing is known.
    pub fn add_layer(&mut self, param: LayerParam) {
        self.layers.push(Layer::new(param));
    }

    /// Use `data` as the test set instead of carving one out of the training data.
    pub fn set_test_data(&mut self, data: Data) -> NeuriteResult<()> {
        data.check()?;
        if data.inputs.cols() != self.data.inputs.cols() || data.outputs.cols() != self.data.outputs.cols() {
            return Err(NeuriteError::config(format!(
                "test data has {} inputs and {} outputs, training data {} and {}",
                data.inputs.cols(),
                data.outputs.cols(),
                self.data.inputs.cols(),
                self.data.outputs.cols()
            )));
        }
        self.test_data = Some(data);
        Ok(())
    }

    pub fn param(&self) -> &NetworkParam {
        &self.param
    }

    pub fn trace(&self) -> &TrainingTrace {
        &self.trace
    }

    pub fn optimal_epoch(&self) -> usize {
        self.optimal_epoch
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Train from scratch: [`Network::prepare`] followed by [`Network::train`].
    ///
    /// Configuration problems are returned as errors before the first epoch.
    /// A NaN loss or metric ends training with [`LearnOutcome::Diverged`].
    pub fn learn(&mut self) -> NeuriteResult<LearnOutcome> {
        self.prepare()?;
        self.train()
    }

    /// Shuffle and split the data, fit the preprocessing, size the last
    /// layer to the preprocessed outputs and initialize every layer.
    pub fn prepare(&mut self) -> NeuriteResult<()> {
        if self.layers.is_empty() {
            return Err(NeuriteError::config("the network has no layer"));
        }
        let mut ctx = RandomContext::new(self.param.seed, self.param.dropout, self.param.dropconnect)?;
        log::debug!("training with seed {}", ctx.seed());

        let mut data = self.data.clone();
        shuffle_rows(&mut data.inputs, &mut data.outputs, ctx.rng());
        let plan = SplitPlan::new(
            data.rows(),
            self.param.batch_size,
            self.param.validation_ratio,
            self.param.test_ratio,
            self.test_data.is_some(),
        )?;
        let mut split = DatasetSplit::new(&data, plan, self.test_data.as_ref())?;
        self.raw_test_inputs = split.test_inputs.clone();
        self.raw_test_outputs = split.test_outputs.clone();

        self.preprocess(&mut split)?;
        log::info!(
            "inputs: {}/{}",
            split.train_inputs.cols(),
            self.raw_test_inputs.cols()
        );
        log::info!(
            "outputs: {}/{}",
            split.train_outputs.cols(),
            self.raw_test_outputs.cols()
        );
        self.init_layers(split.train_inputs.cols(), split.train_outputs.cols(), &mut ctx)?;
        self.prepared = Some((split, ctx));
        Ok(())
    }

    /// Run the epoch loop on a prepared network, then restore the best
    /// weights and write the file pair if a name is set.
    pub fn train(&mut self) -> NeuriteResult<LearnOutcome> {
        let (mut split, mut ctx) = self
            .prepared
            .take()
            .ok_or_else(|| NeuriteError::InvalidOperation("train called before prepare".to_string()))?;

        self.trace.clear();
        self.optimal_epoch = 0;
        let initial = self.compute_stats(&split)?;
        self.trace.push(&initial);
        let mut lowest_loss = initial.valid_loss;
        self.layers.iter_mut().for_each(Layer::save);

        let schedule = self.param.schedule();
        for epoch in 1..=self.param.epoch {
            let since_best = (epoch - 1).saturating_sub(self.optimal_epoch);
            let learning_rate = schedule.rate(self.param.learning_rate, epoch, since_best);
            self.perform_epoch(&split, &mut ctx, learning_rate)?;

            let stats = self.compute_stats(&split)?;
            self.trace.push(&stats);
            log::info!(
                "Epoch: {}   Valid_Loss: {}   Train_Loss: {}   First metric: {}   Second metric: {}   LR: {}   gap from opti: {}%   Remain. epochs: {}",
                epoch,
                stats.valid_loss,
                stats.train_loss,
                stats.first_metric,
                stats.second_metric,
                learning_rate,
                100.0 * stats.valid_loss / lowest_loss,
                (self.optimal_epoch + self.param.patience + 1).saturating_sub(epoch)
            );
            if stats.diverged() {
                log::warn!("NaN at epoch {}, training aborted", epoch);
                return Ok(LearnOutcome::Diverged { epoch });
            }

            if stats.valid_loss < lowest_loss * self.param.plateau {
                self.layers.iter_mut().for_each(Layer::save);
                lowest_loss = stats.valid_loss;
                self.optimal_epoch = epoch;
            }
            if epoch - self.optimal_epoch > self.param.patience {
                break;
            }
            split.shuffle_train(ctx.rng());
        }

        self.layers.iter_mut().for_each(Layer::load_saved);
        log::info!(
            "Optimal epoch: {}   First metric: {}   Second metric: {}",
            self.optimal_epoch,
            self.trace.first_metrics[self.optimal_epoch],
            self.trace.second_metrics[self.optimal_epoch]
        );

        if !self.param.name.is_empty() {
            let stem = PathBuf::from(&self.param.name);
            self.write_info(&with_suffix(&stem, ".out"))?;
            self.save_net(&with_suffix(&stem, ".save"))?;
        }
        Ok(LearnOutcome::Completed {
            optimal_epoch: self.optimal_epoch,
        })
    }

    fn preprocess(&mut self, split: &mut DatasetSplit) -> NeuriteResult<()> {
        let (mut input, mut output) = preprocessors(&self.param)?;
        input.fit_apply(
            &mut split.train_inputs,
            &mut [&mut split.validation_inputs, &mut split.test_inputs],
        )?;
        output.fit_apply(
            &mut split.train_outputs,
            &mut [&mut split.validation_outputs, &mut split.test_outputs],
        )?;
        self.input_preprocessor = input;
        self.output_preprocessor = output;
        Ok(())
    }

    fn init_layers(&mut self, input_width: usize, output_width: usize, ctx: &mut RandomContext) -> NeuriteResult<()> {
        if let Some(last) = self.layers.last_mut() {
            last.resize(output_width);
        }
        let sizes: Vec<usize> = self.layers.iter().map(Layer::size).collect();
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let nb_inputs = if i == 0 { input_width } else { sizes[i - 1] };
            let nb_outputs = sizes.get(i + 1).copied().unwrap_or(0);
            layer.init(nb_inputs, nb_outputs, ctx)?;
        }
        Ok(())
    }

    /// Forward, backward and update for every batch of the training set.
    fn perform_epoch(&mut self, split: &DatasetSplit, ctx: &mut RandomContext, learning_rate: f64) -> NeuriteResult<()> {
        let update = self.param.update_params(learning_rate);
        for batch in split.batches() {
            let (inputs, expected) = batch?;

            let mut outputs = inputs;
            for layer in self.layers.iter_mut() {
                outputs = layer.process_to_learn(&outputs, ctx, &self.pool)?;
            }
            if self.param.loss == Loss::CrossEntropy {
                outputs = softmax(&outputs);
            }

            let mut gradients = self.param.loss.gradient_matrix(&expected, &outputs)?;
            for (i, layer) in self.layers.iter_mut().enumerate().rev() {
                layer.compute_gradients(&gradients, &self.pool)?;
                if i > 0 {
                    gradients = layer.input_gradients();
                }
            }
            for layer in self.layers.iter_mut() {
                layer.update_weights(&update, &self.pool);
            }
        }
        Ok(())
    }

    /// Layers plus the final softmax, in preprocessed space.
    fn forward(&self, inputs: &Matrix) -> NeuriteResult<Matrix> {
        let mut outputs = inputs.clone();
        for layer in &self.layers {
            outputs = layer.process(&outputs, &self.pool)?;
        }
        if self.param.loss == Loss::CrossEntropy {
            outputs = softmax(&outputs);
        }
        Ok(outputs)
    }

    fn compute_stats(&self, split: &DatasetSplit) -> NeuriteResult<EpochStats> {
        let loss = self.param.loss;
        let penalty = regularization_penalty(
            self.layers.iter().flat_map(|l| l.weights()),
            self.param.l1,
            self.param.l2,
        );
        let train = self.forward(&split.train_inputs)?;
        let train_loss = average_loss(&loss.loss_matrix(&split.train_outputs, &train)?) + penalty;
        let valid = self.forward(&split.validation_inputs)?;
        let valid_loss = average_loss(&loss.loss_matrix(&split.validation_outputs, &valid)?) + penalty;

        let (first_metric, second_metric) = self.test_metrics()?;
        Ok(EpochStats {
            train_loss,
            valid_loss,
            first_metric,
            second_metric,
        })
    }

    fn test_metrics(&self) -> NeuriteResult<(f64, f64)> {
        let predicted = self.process(&self.raw_test_inputs)?;
        if self.param.loss.is_classification() {
            classification_metrics(&self.raw_test_outputs, &predicted, self.param.class_validity)
        } else {
            regression_metrics(&self.raw_test_outputs, &predicted)
        }
    }

    /// Inference on raw inputs, returning raw-scale outputs.
    pub fn process(&self, inputs: &Matrix) -> NeuriteResult<Matrix> {
        let mut x = inputs.clone();
        self.input_preprocessor.apply(&mut x)?;
        let mut outputs = self.forward(&x)?;
        self.output_preprocessor.invert(&mut outputs)?;
        Ok(outputs)
    }

    /// Write the `.out` report: labels, trace, preprocessing parameters and
    /// the test set predictions.
    pub fn write_info(&self, path: &Path) -> NeuriteResult<()> {
        let predicted = self.process(&self.raw_test_inputs)?;
        let predictions = self
            .data
            .output_labels
            .iter()
            .enumerate()
            .map(|(j, label)| LabelPredictions {
                label: label.clone(),
                expected: self.raw_test_outputs.col(j),
                predicted: predicted.col(j),
            })
            .collect();
        let info = ModelInfo {
            input_labels: self.data.input_labels.clone(),
            output_labels: self.data.output_labels.clone(),
            loss: self.param.loss,
            train_losses: self.trace.train_losses.clone(),
            valid_losses: self.trace.valid_losses.clone(),
            first_metrics: self.trace.first_metrics.clone(),
            second_metrics: self.trace.second_metrics.clone(),
            class_validity: self.param.loss.is_classification().then_some(self.param.class_validity),
            optimal_epoch: self.optimal_epoch,
            input: self.input_preprocessor.clone(),
            output: self.output_preprocessor.clone(),
            predictions,
        };
        info.write(path)
    }

    /// Write the `.save` weights file.
    pub fn save_net(&self, path: &Path) -> NeuriteResult<()> {
        let records: Vec<LayerRecord> = self.layers.iter().map(Layer::to_record).collect();
        write_layers(path, &records)
    }

    /// Rebuild a trained network from `<stem>.out` and `<stem>.save`.
    pub fn load(stem: impl AsRef<Path>, threads: usize) -> NeuriteResult<Self> {
        let stem = stem.as_ref();
        let info = ModelInfo::read(&with_suffix(stem, ".out"))?;
        let records = read_layers(&with_suffix(stem, ".save"))?;
        let layers = records
            .iter()
            .map(Layer::from_record)
            .collect::<NeuriteResult<Vec<_>>>()?;
        for pair in layers.windows(2) {
            if pair[1].input_width() != pair[0].size() {
                return Err(NeuriteError::DimensionMismatch(format!(
                    "a layer of {} neurons feeds a layer expecting {} inputs",
                    pair[0].size(),
                    pair[1].input_width()
                )));
            }
        }

        let defaults = NetworkParam::default();
        let param = NetworkParam {
            loss: info.loss,
            threads,
            class_validity: info.class_validity.unwrap_or(defaults.class_validity),
            preprocess_inputs: info.input.steps().to_vec(),
            preprocess_outputs: info.output.steps().to_vec(),
            input_reduction_threshold: info.input.reduction_threshold,
            output_reduction_threshold: info.output.reduction_threshold,
            input_whitening_bias: info.input.whitening_bias,
            name: stem.display().to_string(),
            ..defaults
        };
        let data = Data {
            inputs: Matrix::zeros(0, info.input_labels.len()),
            outputs: Matrix::zeros(0, info.output_labels.len()),
            input_labels: info.input_labels,
            output_labels: info.output_labels,
        };
        log::info!("loaded {} layer(s) from {}", layers.len(), stem.display());
        Ok(Network {
            raw_test_inputs: data.inputs.clone(),
            raw_test_outputs: data.outputs.clone(),
            param,
            data,
            test_data: None,
            layers,
            pool: build_pool(threads)?,
            input_preprocessor: info.input,
            output_preprocessor: info.output,
            trace: TrainingTrace {
                train_losses: info.train_losses,
                valid_losses: info.valid_losses,
                first_metrics: info.first_metrics,
                second_metrics: info.second_metrics,
            },
            optimal_epoch: info.optimal_epoch,
            prepared: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_data() -> Data {
        let inputs = Matrix::new((0..40).map(|v| v as f64 / 40.0).collect(), 20, 2).unwrap();
        let outputs = Matrix::new((0..20).map(|v| v as f64 / 20.0).collect(), 20, 1).unwrap();
        Data::new(inputs, outputs).unwrap()
    }

    #[test]
    fn test_no_layer_is_configuration_error() {
        let mut net = Network::new(tiny_data(), NetworkParam::default()).unwrap();
        assert!(net.learn().unwrap_err().is_configuration());
    }

    #[test]
    fn test_output_whitening_rejected_at_construction() {
        use neurite_preprocessing::Preprocess;
        let param = NetworkParam {
            preprocess_outputs: vec![Preprocess::Decorrelate, Preprocess::Whiten],
            ..NetworkParam::default()
        };
        assert!(Network::new(tiny_data(), param).err().unwrap().is_configuration());
    }

    #[test]
    fn test_mismatched_test_data_rejected() {
        let mut net = Network::new(tiny_data(), NetworkParam::default()).unwrap();
        let other = Data::new(Matrix::zeros(3, 5), Matrix::zeros(3, 1)).unwrap();
        assert!(net.set_test_data(other).is_err());
    }

    #[test]
    fn test_train_needs_prepare() {
        let mut net = Network::new(tiny_data(), NetworkParam::default()).unwrap();
        net.add_layer(LayerParam::default());
        assert!(matches!(net.train(), Err(NeuriteError::InvalidOperation(_))));
    }

    #[test]
    fn test_suffix_keeps_dots_in_stem() {
        assert_eq!(with_suffix(Path::new("runs/model.v1"), ".out"), PathBuf::from("runs/model.v1.out"));
    }

    #[test]
    fn test_last_layer_is_resized_to_outputs() {
        let param = NetworkParam {
            seed: 3,
            epoch: 2,
            ..NetworkParam::default()
        };
        let mut net = Network::new(tiny_data(), param).unwrap();
        net.add_layer(LayerParam::with_size(4));
        net.add_layer(LayerParam::with_size(7));
        assert!(net.learn().unwrap().is_completed());
        assert_eq!(net.layers()[1].size(), 1);
        assert_eq!(net.layers()[1].input_width(), 4);
        assert_eq!(net.trace().len(), 3);
    }
}
