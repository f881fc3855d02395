use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use serde::{Deserialize, Serialize};

/// Aggregation variants. The numeric id is what model files store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    #[default]
    Dot,
    Distance,
    Maxout,
}

impl AggregationKind {
    pub fn id(&self) -> usize {
        match self {
            AggregationKind::Dot => 0,
            AggregationKind::Distance => 1,
            AggregationKind::Maxout => 2,
        }
    }

    pub fn from_id(id: usize) -> Option<Self> {
        Some(match id {
            0 => AggregationKind::Dot,
            1 => AggregationKind::Distance,
            2 => AggregationKind::Maxout,
            _ => return None,
        })
    }

    /// Number of weight sets a neuron of this kind allocates.
    pub fn weight_sets(&self, requested: usize) -> usize {
        match self {
            AggregationKind::Maxout => requested.max(2),
            _ => 1,
        }
    }
}

/// Combines a neuron's inputs with one of its weight sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    kind: AggregationKind,
    order: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl Aggregation {
    pub fn new(kind: AggregationKind) -> Self {
        Aggregation { kind, order: 2.0 }
    }

    pub fn with_coefs(kind: AggregationKind, coefs: &[f64]) -> NeuriteResult<Self> {
        match (kind, coefs) {
            (AggregationKind::Distance, [order]) if *order >= 1.0 => Ok(Aggregation { kind, order: *order }),
            (AggregationKind::Dot | AggregationKind::Maxout, []) => Ok(Aggregation::new(kind)),
            _ => Err(NeuriteError::InvalidOperation(format!(
                "aggregation {:?} does not take coefficients {:?}",
                kind, coefs
            ))),
        }
    }

    pub fn kind(&self) -> AggregationKind {
        self.kind
    }

    pub fn coefs(&self) -> Vec<f64> {
        match self.kind {
            AggregationKind::Distance => vec![self.order],
            _ => Vec::new(),
        }
    }

    /// Aggregated value and the index of the weight set that produced it.
    pub fn aggregate(&self, input: &[f64], weights: &Matrix, bias: &[f64]) -> (f64, usize) {
        match self.kind {
            AggregationKind::Dot => (dot(input, weights.row(0)) + bias[0], 0),
            AggregationKind::Distance => (self.distance(input, weights.row(0)) + bias[0], 0),
            AggregationKind::Maxout => {
                let mut best = (f64::NEG_INFINITY, 0);
                for k in 0..weights.rows() {
                    let v = dot(input, weights.row(k)) + bias[k];
                    if v > best.0 {
                        best = (v, k);
                    }
                }
                best
            }
        }
    }

    fn distance(&self, input: &[f64], weights: &[f64]) -> f64 {
        input
            .iter()
            .zip(weights)
            .map(|(x, w)| (x - w).abs().powf(self.order))
            .sum::<f64>()
            .powf(1.0 / self.order)
    }

    /// ∂aggregate/∂x for the x − w difference of the Distance kind.
    fn distance_prime(&self, input: &[f64], weights: &[f64]) -> Vec<f64> {
        let d = self.distance(input, weights);
        if d == 0.0 {
            return vec![0.0; input.len()];
        }
        input
            .iter()
            .zip(weights)
            .map(|(x, w)| {
                let diff = x - w;
                diff.signum() * diff.abs().powf(self.order - 1.0) / d.powf(self.order - 1.0)
            })
            .collect()
    }

    /// ∂aggregate/∂w for the selected weight set.
    pub fn prime(&self, input: &[f64], weights: &[f64]) -> Vec<f64> {
        match self.kind {
            AggregationKind::Dot | AggregationKind::Maxout => input.to_vec(),
            AggregationKind::Distance => self
                .distance_prime(input, weights)
                .into_iter()
                .map(|g| -g)
                .collect(),
        }
    }

    /// ∂aggregate/∂x for the selected weight set.
    pub fn prime_input(&self, input: &[f64], weights: &[f64]) -> Vec<f64> {
        match self.kind {
            AggregationKind::Dot | AggregationKind::Maxout => weights.to_vec(),
            AggregationKind::Distance => self.distance_prime(input, weights),
        }
    }

    /// No aggregation variant has a learnable coefficient yet; the order of
    /// the Distance kind is a fixed hyperparameter.
    pub fn learn(&mut self, _gradient: f64, _learning_rate: f64, _momentum: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn weights() -> Matrix {
        Matrix::from_rows(&[vec![1.0, -1.0], vec![0.5, 2.0]]).unwrap()
    }

    #[test]
    fn test_dot() {
        let agg = Aggregation::new(AggregationKind::Dot);
        let (v, k) = agg.aggregate(&[2.0, 3.0], &weights(), &[0.5, 0.0]);
        assert_abs_diff_eq!(v, -0.5, epsilon = 1e-12);
        assert_eq!(k, 0);
        assert_eq!(agg.prime_input(&[2.0, 3.0], weights().row(0)), vec![1.0, -1.0]);
    }

    #[test]
    fn test_maxout_selects_best_set() {
        let agg = Aggregation::new(AggregationKind::Maxout);
        let (v, k) = agg.aggregate(&[2.0, 3.0], &weights(), &[0.5, 0.0]);
        assert_abs_diff_eq!(v, 7.0, epsilon = 1e-12);
        assert_eq!(k, 1);
        assert_eq!(AggregationKind::Maxout.weight_sets(1), 2);
        assert_eq!(AggregationKind::Dot.weight_sets(4), 1);
    }

    #[test]
    fn test_distance_and_gradients() {
        let agg = Aggregation::new(AggregationKind::Distance);
        let w = Matrix::from_rows(&[vec![0.0, 0.0]]).unwrap();
        let (v, _) = agg.aggregate(&[3.0, 4.0], &w, &[1.0]);
        assert_abs_diff_eq!(v, 6.0, epsilon = 1e-12);

        let h = 1e-6;
        let input = [0.7, -1.2];
        let wrow = [0.2, 0.4];
        let grad_w = agg.prime(&input, &wrow);
        let grad_x = agg.prime_input(&input, &wrow);
        for i in 0..2 {
            let mut up = wrow;
            let mut down = wrow;
            up[i] += h;
            down[i] -= h;
            let numeric = (agg.distance(&input, &up) - agg.distance(&input, &down)) / (2.0 * h);
            assert_abs_diff_eq!(grad_w[i], numeric, epsilon = 1e-5);
            assert_abs_diff_eq!(grad_x[i], -numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_coefs_round_trip() {
        let agg = Aggregation::with_coefs(AggregationKind::Distance, &[3.0]).unwrap();
        assert_eq!(agg.coefs(), vec![3.0]);
        assert!(Aggregation::with_coefs(AggregationKind::Dot, &[1.0]).is_err());
        for id in 0..3 {
            assert_eq!(AggregationKind::from_id(id).map(|k| k.id()), Some(id));
        }
    }
}
