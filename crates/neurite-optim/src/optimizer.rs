use serde::{Deserialize, Serialize};

/// Update rule applied to every weight, bias and learnable coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Optimizer {
    /// Plain gradient step.
    #[default]
    None,
    Momentum,
    Nesterov,
    Adagrad,
    Rmsprop,
    Adam,
    Adamax,
    Nadam,
    Amsgrad,
}

/// Hyperparameters shared by one weight-update sweep.
///
/// `momentum` doubles as β1 and `window` as β2 for the Adam family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    pub optimizer: Optimizer,
    pub learning_rate: f64,
    pub l1: f64,
    pub l2: f64,
    pub momentum: f64,
    pub window: f64,
    pub epsilon: f64,
}

impl Default for UpdateParams {
    fn default() -> Self {
        UpdateParams {
            optimizer: Optimizer::None,
            learning_rate: 0.001,
            l1: 0.0,
            l2: 0.0,
            momentum: 0.9,
            window: 0.9,
            epsilon: 1e-4,
        }
    }
}

/// Running moments of a single parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightState {
    pub first_moment: f64,
    pub second_moment: f64,
    pub max_second_moment: f64,
    pub previous_velocity: f64,
}

/// Gradient with the L2 (proportional) and L1 (signed constant) penalties added.
pub fn regularized(gradient: f64, weight: f64, l1: f64, l2: f64) -> f64 {
    let sign = if weight > 0.0 {
        1.0
    } else if weight < 0.0 {
        -1.0
    } else {
        0.0
    };
    gradient + l2 * weight + l1 * sign
}

impl Optimizer {
    /// Consume `gradient` (∂loss/∂param) and return the delta to add to the
    /// parameter. `iteration` counts updates starting at 1.
    pub fn step(&self, state: &mut WeightState, gradient: f64, params: &UpdateParams, iteration: usize) -> f64 {
        let lr = params.learning_rate;
        let beta1 = params.momentum;
        let beta2 = params.window;
        let eps = params.epsilon;
        let t = iteration.max(1) as i32;

        match self {
            Optimizer::None => -lr * gradient,
            Optimizer::Momentum => {
                state.previous_velocity = beta1 * state.previous_velocity - lr * gradient;
                state.previous_velocity
            }
            Optimizer::Nesterov => {
                let before = state.previous_velocity;
                state.previous_velocity = beta1 * before - lr * gradient;
                -beta1 * before + (1.0 + beta1) * state.previous_velocity
            }
            Optimizer::Adagrad => {
                state.second_moment += gradient * gradient;
                -lr * gradient / (state.second_moment.sqrt() + eps)
            }
            Optimizer::Rmsprop => {
                state.second_moment = beta2 * state.second_moment + (1.0 - beta2) * gradient * gradient;
                -lr * gradient / (state.second_moment.sqrt() + eps)
            }
            Optimizer::Adam => {
                update_moments(state, gradient, beta1, beta2);
                let m_hat = state.first_moment / (1.0 - beta1.powi(t));
                let v_hat = state.second_moment / (1.0 - beta2.powi(t));
                -lr * m_hat / (v_hat.sqrt() + eps)
            }
            Optimizer::Adamax => {
                state.first_moment = beta1 * state.first_moment + (1.0 - beta1) * gradient;
                state.second_moment = (beta2 * state.second_moment).max(gradient.abs());
                let m_hat = state.first_moment / (1.0 - beta1.powi(t));
                -lr * m_hat / (state.second_moment + eps)
            }
            Optimizer::Nadam => {
                update_moments(state, gradient, beta1, beta2);
                let m_hat = beta1 * state.first_moment / (1.0 - beta1.powi(t + 1))
                    + (1.0 - beta1) * gradient / (1.0 - beta1.powi(t));
                let v_hat = state.second_moment / (1.0 - beta2.powi(t));
                -lr * m_hat / (v_hat.sqrt() + eps)
            }
            Optimizer::Amsgrad => {
                update_moments(state, gradient, beta1, beta2);
                state.max_second_moment = state.max_second_moment.max(state.second_moment);
                -lr * state.first_moment / (state.max_second_moment.sqrt() + eps)
            }
        }
    }
}

fn update_moments(state: &mut WeightState, gradient: f64, beta1: f64, beta2: f64) {
    state.first_moment = beta1 * state.first_moment + (1.0 - beta1) * gradient;
    state.second_moment = beta2 * state.second_moment + (1.0 - beta2) * gradient * gradient;
}
