use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use serde::{Deserialize, Serialize};

/// Floor applied to probabilities before taking a logarithm.
pub const PROBABILITY_FLOOR: f64 = 1e-15;

/// Training objective. Cross entropy expects softmax scores, binary cross
/// entropy expects probabilities in (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loss {
    L1,
    #[default]
    L2,
    CrossEntropy,
    BinaryCrossEntropy,
}

impl Loss {
    /// Name written in model files.
    pub fn name(&self) -> &'static str {
        match self {
            Loss::L1 => "mae",
            Loss::L2 => "mse",
            Loss::BinaryCrossEntropy => "binary cross entropy",
            Loss::CrossEntropy => "cross entropy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "mae" => Some(Loss::L1),
            "mse" => Some(Loss::L2),
            "binary cross entropy" => Some(Loss::BinaryCrossEntropy),
            "cross entropy" => Some(Loss::CrossEntropy),
            _ => None,
        }
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, Loss::CrossEntropy | Loss::BinaryCrossEntropy)
    }

    fn element(&self, expected: f64, predicted: f64) -> f64 {
        match self {
            Loss::L1 => (predicted - expected).abs(),
            Loss::L2 => 0.5 * (predicted - expected).powi(2),
            Loss::CrossEntropy => -expected * predicted.max(PROBABILITY_FLOOR).ln(),
            Loss::BinaryCrossEntropy => {
                let p = clamp_probability(predicted);
                -(expected * p.ln() + (1.0 - expected) * (1.0 - p).ln())
            }
        }
    }

    fn element_gradient(&self, expected: f64, predicted: f64) -> f64 {
        match self {
            Loss::L1 => {
                let d = predicted - expected;
                if d > 0.0 {
                    1.0
                } else if d < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            // cross entropy gradient is taken before the softmax
            Loss::L2 | Loss::CrossEntropy => predicted - expected,
            Loss::BinaryCrossEntropy => {
                let p = clamp_probability(predicted);
                (p - expected) / (p * (1.0 - p))
            }
        }
    }

    /// Element-wise loss of `predicted` against `expected`.
    pub fn loss_matrix(&self, expected: &Matrix, predicted: &Matrix) -> NeuriteResult<Matrix> {
        self.zip(expected, predicted, |e, p| self.element(e, p))
    }

    /// Element-wise ∂loss/∂output; the weight update subtracts it.
    pub fn gradient_matrix(&self, expected: &Matrix, predicted: &Matrix) -> NeuriteResult<Matrix> {
        self.zip(expected, predicted, |e, p| self.element_gradient(e, p))
    }

    fn zip<F: Fn(f64, f64) -> f64>(&self, expected: &Matrix, predicted: &Matrix, f: F) -> NeuriteResult<Matrix> {
        if expected.shape() != predicted.shape() {
            return Err(NeuriteError::ShapeMismatch {
                expected: vec![expected.rows(), expected.cols()],
                got: vec![predicted.rows(), predicted.cols()],
            });
        }
        let data = expected
            .data()
            .iter()
            .zip(predicted.data())
            .map(|(&e, &p)| f(e, p))
            .collect();
        Matrix::new(data, expected.rows(), expected.cols())
    }
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR)
}

/// Row-wise softmax, shifted by the row max for stability.
pub fn softmax(x: &Matrix) -> Matrix {
    let mut out = x.clone();
    for i in 0..out.rows() {
        let row = out.row_mut(i);
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    out
}

/// Mean over rows of each row's summed loss. An empty matrix averages to 0.
pub fn average_loss(losses: &Matrix) -> f64 {
    if losses.rows() == 0 {
        return 0.0;
    }
    losses.iter_rows().map(|r| r.iter().sum::<f64>()).sum::<f64>() / losses.rows() as f64
}

/// `l1 · Σ|w| + ½ · l2 · Σw²`
pub fn regularization_penalty<I>(weights: I, l1: f64, l2: f64) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (abs, sq) = weights
        .into_iter()
        .fold((0.0, 0.0), |(a, s), w| (a + w.abs(), s + w * w));
    l1 * abs + 0.5 * l2 * sq
}
