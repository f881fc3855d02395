use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use rand::seq::SliceRandom;
use rand::Rng;

/// Row-aligned input and output matrices with their column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data {
    pub inputs: Matrix,
    pub outputs: Matrix,
    pub input_labels: Vec<String>,
    pub output_labels: Vec<String>,
}

impl Data {
    /// Unlabelled data; labels default to `x0, x1, …` and `y0, y1, …`.
    pub fn new(inputs: Matrix, outputs: Matrix) -> NeuriteResult<Self> {
        let input_labels = (0..inputs.cols()).map(|i| format!("x{}", i)).collect();
        let output_labels = (0..outputs.cols()).map(|i| format!("y{}", i)).collect();
        Data::with_labels(inputs, outputs, input_labels, output_labels)
    }

    pub fn with_labels(
        inputs: Matrix,
        outputs: Matrix,
        input_labels: Vec<String>,
        output_labels: Vec<String>,
    ) -> NeuriteResult<Self> {
        let data = Data {
            inputs,
            outputs,
            input_labels,
            output_labels,
        };
        data.check()?;
        Ok(data)
    }

    pub fn rows(&self) -> usize {
        self.inputs.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.rows() == 0
    }

    /// Row counts must agree and every column must carry a label.
    pub fn check(&self) -> NeuriteResult<()> {
        if self.inputs.rows() != self.outputs.rows() {
            return Err(NeuriteError::config(format!(
                "{} input rows but {} output rows",
                self.inputs.rows(),
                self.outputs.rows()
            )));
        }
        if self.input_labels.len() != self.inputs.cols() || self.output_labels.len() != self.outputs.cols() {
            return Err(NeuriteError::config(format!(
                "{} input and {} output labels for {} and {} columns",
                self.input_labels.len(),
                self.output_labels.len(),
                self.inputs.cols(),
                self.outputs.cols()
            )));
        }
        Ok(())
    }
}

/// Shuffle the rows of two matrices with one shared permutation.
pub fn shuffle_rows<R: Rng + ?Sized>(inputs: &mut Matrix, outputs: &mut Matrix, rng: &mut R) {
    let mut indices: Vec<usize> = (0..inputs.rows()).collect();
    indices.shuffle(rng);
    *inputs = inputs.select_rows(&indices);
    *outputs = outputs.select_rows(&indices);
}
