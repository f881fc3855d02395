use neurite_core::{NeuriteError, NeuriteResult};
use serde::{Deserialize, Serialize};

/// Activation variants. The numeric id is what model files store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    Linear,
    Sigmoid,
    Tanh,
    Softplus,
    #[default]
    Relu,
    Prelu,
    Elu,
}

impl ActivationKind {
    pub fn id(&self) -> usize {
        match self {
            ActivationKind::Linear => 0,
            ActivationKind::Sigmoid => 1,
            ActivationKind::Tanh => 2,
            ActivationKind::Softplus => 3,
            ActivationKind::Relu => 4,
            ActivationKind::Prelu => 5,
            ActivationKind::Elu => 6,
        }
    }

    pub fn from_id(id: usize) -> Option<Self> {
        Some(match id {
            0 => ActivationKind::Linear,
            1 => ActivationKind::Sigmoid,
            2 => ActivationKind::Tanh,
            3 => ActivationKind::Softplus,
            4 => ActivationKind::Relu,
            5 => ActivationKind::Prelu,
            6 => ActivationKind::Elu,
            _ => return None,
        })
    }

    fn default_coef(&self) -> Option<f64> {
        match self {
            ActivationKind::Relu | ActivationKind::Prelu => Some(0.01),
            ActivationKind::Elu => Some(1.0),
            _ => None,
        }
    }
}

/// A neuron's pointwise nonlinearity, with its coefficient when it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    kind: ActivationKind,
    coef: f64,
    velocity: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Activation {
    pub fn new(kind: ActivationKind) -> Self {
        Activation {
            kind,
            coef: kind.default_coef().unwrap_or(0.0),
            velocity: 0.0,
        }
    }

    /// Rebuild from stored coefficients; the count must match the kind.
    pub fn with_coefs(kind: ActivationKind, coefs: &[f64]) -> NeuriteResult<Self> {
        let mut act = Activation::new(kind);
        match (kind.default_coef(), coefs) {
            (None, []) => {}
            (Some(_), [c]) => act.coef = *c,
            _ => {
                return Err(NeuriteError::InvalidOperation(format!(
                    "activation {:?} does not take {} coefficient(s)",
                    kind,
                    coefs.len()
                )))
            }
        }
        Ok(act)
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }

    pub fn coefs(&self) -> Vec<f64> {
        match self.kind.default_coef() {
            Some(_) => vec![self.coef],
            None => Vec::new(),
        }
    }

    pub fn activate(&self, x: f64) -> f64 {
        match self.kind {
            ActivationKind::Linear => x,
            ActivationKind::Sigmoid => sigmoid(x),
            ActivationKind::Tanh => x.tanh(),
            ActivationKind::Softplus => x.max(0.0) + (-x.abs()).exp().ln_1p(),
            ActivationKind::Relu | ActivationKind::Prelu => {
                if x > 0.0 {
                    x
                } else {
                    self.coef * x
                }
            }
            ActivationKind::Elu => {
                if x > 0.0 {
                    x
                } else {
                    self.coef * x.exp_m1()
                }
            }
        }
    }

    /// Derivative at the pre-activation value `x`.
    pub fn prime(&self, x: f64) -> f64 {
        match self.kind {
            ActivationKind::Linear => 1.0,
            ActivationKind::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            ActivationKind::Tanh => 1.0 - x.tanh().powi(2),
            ActivationKind::Softplus => sigmoid(x),
            ActivationKind::Relu | ActivationKind::Prelu => {
                if x > 0.0 {
                    1.0
                } else {
                    self.coef
                }
            }
            ActivationKind::Elu => {
                if x > 0.0 {
                    1.0
                } else {
                    self.coef * x.exp()
                }
            }
        }
    }

    /// Derivative with respect to the learnable coefficient (0 when fixed).
    pub fn prime_coef(&self, x: f64) -> f64 {
        match self.kind {
            ActivationKind::Prelu if x <= 0.0 => x,
            _ => 0.0,
        }
    }

    /// Momentum step on the learnable coefficient.
    pub fn learn(&mut self, gradient: f64, learning_rate: f64, momentum: f64) {
        if self.kind == ActivationKind::Prelu {
            self.velocity = momentum * self.velocity - learning_rate * gradient;
            self.coef += self.velocity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ALL: [ActivationKind; 7] = [
        ActivationKind::Linear,
        ActivationKind::Sigmoid,
        ActivationKind::Tanh,
        ActivationKind::Softplus,
        ActivationKind::Relu,
        ActivationKind::Prelu,
        ActivationKind::Elu,
    ];

    #[test]
    fn test_ids_are_stable() {
        for (i, kind) in ALL.iter().enumerate() {
            assert_eq!(kind.id(), i);
            assert_eq!(ActivationKind::from_id(i), Some(*kind));
        }
        assert_eq!(ActivationKind::from_id(7), None);
    }

    #[test]
    fn test_prime_matches_finite_difference() {
        let h = 1e-6;
        for kind in ALL {
            let act = Activation::new(kind);
            for &x in &[-2.0, -0.3, 0.4, 1.7] {
                let numeric = (act.activate(x + h) - act.activate(x - h)) / (2.0 * h);
                assert_abs_diff_eq!(act.prime(x), numeric, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_relu_leak() {
        let relu = Activation::new(ActivationKind::Relu);
        assert_eq!(relu.activate(3.0), 3.0);
        assert_abs_diff_eq!(relu.activate(-2.0), -0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_prelu_learns_its_coefficient() {
        let mut prelu = Activation::new(ActivationKind::Prelu);
        let before = prelu.coefs()[0];
        prelu.learn(1.0, 0.1, 0.9);
        assert_abs_diff_eq!(prelu.coefs()[0], before - 0.1, epsilon = 1e-12);

        let mut relu = Activation::new(ActivationKind::Relu);
        relu.learn(1.0, 0.1, 0.9);
        assert_eq!(relu.coefs(), vec![0.01]);
    }

    #[test]
    fn test_with_coefs_validates_count() {
        assert!(Activation::with_coefs(ActivationKind::Linear, &[1.0]).is_err());
        assert!(Activation::with_coefs(ActivationKind::Elu, &[]).is_err());
        let elu = Activation::with_coefs(ActivationKind::Elu, &[0.5]).unwrap();
        assert_eq!(elu.coefs(), vec![0.5]);
    }
}
