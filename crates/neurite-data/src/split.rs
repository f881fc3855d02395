use crate::dataset::{shuffle_rows, Data};
use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use rand::Rng;

/// How many rows go to training, validation and test, and how the training
/// rows are cut into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    /// 0 means full-batch training.
    pub batch_size: usize,
    pub batches: usize,
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl SplitPlan {
    /// Plan the split of `rows` shuffled rows.
    ///
    /// With a batch size, the batch count is the non-held-out row count over
    /// the batch size, rounded up once the trailing partial batch reaches half
    /// a batch. Training then gets exactly `batches × batch_size` rows and the
    /// rest is shared between validation and test in `validation_ratio :
    /// test_ratio` proportion.
    pub fn new(
        rows: usize,
        batch_size: usize,
        validation_ratio: f64,
        test_ratio: f64,
        test_supplied: bool,
    ) -> NeuriteResult<Self> {
        for (name, ratio) in [("validation ratio", validation_ratio), ("test ratio", test_ratio)] {
            if !(0.0..1.0).contains(&ratio) {
                return Err(NeuriteError::config(format!("{} must be in [0, 1), got {}", name, ratio)));
            }
        }
        if test_supplied && test_ratio.abs() > f64::EPSILON {
            return Err(NeuriteError::config(
                "test ratio must be 0 when a test set is supplied",
            ));
        }
        if validation_ratio == 0.0 {
            return Err(NeuriteError::config("validation ratio must be positive"));
        }
        if validation_ratio + test_ratio >= 1.0 {
            return Err(NeuriteError::config(format!(
                "validation ratio + test ratio must stay below 1, got {}",
                validation_ratio + test_ratio
            )));
        }

        let n = rows as f64;
        let plan = if batch_size == 0 {
            let validation = (n * validation_ratio).round() as usize;
            let test = (n * test_ratio).round() as usize;
            SplitPlan {
                batch_size,
                batches: 1,
                train: rows.saturating_sub(validation + test),
                validation,
                test,
            }
        } else {
            let batches = (n - n * validation_ratio - n * test_ratio).trunc() / batch_size as f64;
            let batches = if batches.fract() >= 0.5 {
                batches.trunc() as usize + 1
            } else {
                batches.trunc() as usize
            };
            let train = batches * batch_size;
            if train > rows {
                return Err(NeuriteError::config(format!(
                    "{} batches of {} rows need more than the {} rows available",
                    batches, batch_size, rows
                )));
            }
            let held_out = rows - train;
            let validation =
                (held_out as f64 * validation_ratio / (validation_ratio + test_ratio)).round() as usize;
            SplitPlan {
                batch_size,
                batches,
                train,
                validation,
                test: held_out - validation,
            }
        };

        if plan.train == 0 || plan.batches == 0 {
            return Err(NeuriteError::config(format!(
                "splitting {} rows leaves no training batch",
                rows
            )));
        }
        if plan.validation == 0 {
            return Err(NeuriteError::config(format!(
                "splitting {} rows leaves no validation row",
                rows
            )));
        }
        log::debug!(
            "split plan: {} batch(es) of {} train rows, {} validation, {} test",
            plan.batches,
            plan.train,
            plan.validation,
            plan.test
        );
        Ok(plan)
    }

    /// Rows per batch once the plan is applied.
    pub fn rows_per_batch(&self) -> usize {
        if self.batch_size == 0 {
            self.train
        } else {
            self.batch_size
        }
    }
}

/// The three row sets a training run works on.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub train_inputs: Matrix,
    pub train_outputs: Matrix,
    pub validation_inputs: Matrix,
    pub validation_outputs: Matrix,
    pub test_inputs: Matrix,
    pub test_outputs: Matrix,
    pub plan: SplitPlan,
}

impl DatasetSplit {
    /// Carve validation rows from the end of `data`, then test rows just
    /// before them, unless `test` supplies the test set.
    pub fn new(data: &Data, plan: SplitPlan, test: Option<&Data>) -> NeuriteResult<Self> {
        let rows = data.rows();
        let held_out = plan.validation + if test.is_some() { 0 } else { plan.test };
        if held_out + plan.train > rows {
            return Err(NeuriteError::DimensionMismatch(format!(
                "split plan needs {} rows, data has {}",
                held_out + plan.train,
                rows
            )));
        }
        let validation: Vec<usize> = (0..plan.validation).map(|i| rows - 1 - i).collect();
        let (test_inputs, test_outputs) = match test {
            Some(t) => {
                if t.inputs.cols() != data.inputs.cols() || t.outputs.cols() != data.outputs.cols() {
                    return Err(NeuriteError::config(format!(
                        "test set has {}/{} columns, training data {}/{}",
                        t.inputs.cols(),
                        t.outputs.cols(),
                        data.inputs.cols(),
                        data.outputs.cols()
                    )));
                }
                (t.inputs.clone(), t.outputs.clone())
            }
            None => {
                let idx: Vec<usize> = (0..plan.test).map(|i| rows - 1 - plan.validation - i).collect();
                (data.inputs.select_rows(&idx), data.outputs.select_rows(&idx))
            }
        };

        Ok(DatasetSplit {
            train_inputs: data.inputs.slice_rows(0, plan.train)?,
            train_outputs: data.outputs.slice_rows(0, plan.train)?,
            validation_inputs: data.inputs.select_rows(&validation),
            validation_outputs: data.outputs.select_rows(&validation),
            test_inputs,
            test_outputs,
            plan,
        })
    }

    /// Inputs and outputs of batch `index`.
    pub fn batch(&self, index: usize) -> NeuriteResult<(Matrix, Matrix)> {
        let size = self.plan.rows_per_batch();
        let start = index * size;
        Ok((
            self.train_inputs.slice_rows(start, start + size)?,
            self.train_outputs.slice_rows(start, start + size)?,
        ))
    }

    pub fn batches(&self) -> impl Iterator<Item = NeuriteResult<(Matrix, Matrix)>> + '_ {
        (0..self.plan.batches).map(move |b| self.batch(b))
    }

    pub fn shuffle_train<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        shuffle_rows(&mut self.train_inputs, &mut self.train_outputs, rng);
    }
}
