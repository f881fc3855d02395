//! Learning-rate decay schedules.
//!
//! Every schedule is a pure function of the base rate, the current epoch and
//! the number of epochs since the best validation loss.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decay {
    #[default]
    None,
    /// lr = base / (1 + value · epoch)
    Inverse,
    /// lr = base · exp(−value · epoch)
    Exp,
    /// lr = base / value^⌊epoch / delay⌋
    Step,
    /// lr = base / value^(epochs_since_best − delay), once past the delay
    Plateau,
}

/// A decay kind with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecaySchedule {
    pub decay: Decay,
    pub value: f64,
    pub delay: usize,
}

impl DecaySchedule {
    pub fn new(decay: Decay, value: f64, delay: usize) -> Self {
        DecaySchedule { decay, value, delay }
    }

    pub fn rate(&self, base: f64, epoch: usize, epochs_since_best: usize) -> f64 {
        match self.decay {
            Decay::None => base,
            Decay::Inverse => base / (1.0 + self.value * epoch as f64),
            Decay::Exp => base * (-self.value * epoch as f64).exp(),
            Decay::Step => {
                let drops = epoch / self.delay.max(1);
                base / self.value.powi(drops as i32)
            }
            Decay::Plateau => {
                let drops = epochs_since_best.saturating_sub(self.delay);
                base / self.value.powi(drops as i32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_no_decay() {
        let s = DecaySchedule::new(Decay::None, 0.5, 2);
        assert_eq!(s.rate(0.1, 40, 40), 0.1);
    }

    #[test]
    fn test_inverse_and_exp() {
        let inv = DecaySchedule::new(Decay::Inverse, 0.5, 0);
        assert_abs_diff_eq!(inv.rate(1.0, 2, 0), 0.5, epsilon = 1e-12);

        let exp = DecaySchedule::new(Decay::Exp, 0.1, 0);
        assert_abs_diff_eq!(exp.rate(1.0, 10, 0), (-1.0f64).exp(), epsilon = 1e-12);
        assert!(exp.rate(1.0, 11, 0) < exp.rate(1.0, 10, 0));
    }

    #[test]
    fn test_step_is_piecewise_constant() {
        let s = DecaySchedule::new(Decay::Step, 2.0, 5);
        assert_eq!(s.rate(1.0, 4, 0), 1.0);
        assert_eq!(s.rate(1.0, 5, 0), 0.5);
        assert_eq!(s.rate(1.0, 9, 0), 0.5);
        assert_eq!(s.rate(1.0, 10, 0), 0.25);
    }

    #[test]
    fn test_plateau_waits_for_delay() {
        let s = DecaySchedule::new(Decay::Plateau, 2.0, 3);
        assert_eq!(s.rate(1.0, 20, 3), 1.0);
        assert_eq!(s.rate(1.0, 20, 4), 0.5);
        assert_eq!(s.rate(1.0, 20, 6), 0.125);
        // an improvement resets the count
        assert_eq!(s.rate(1.0, 21, 0), 1.0);
    }
}
