use crate::decorrelation::Decorrelation;
use crate::scaler::{Centering, Normalization, Standardization};
use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A preprocessing step, in the order the user lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preprocess {
    Center,
    Normalize,
    Standardize,
    Decorrelate,
    Whiten,
    Reduce,
}

impl Preprocess {
    pub fn name(&self) -> &'static str {
        match self {
            Preprocess::Center => "center",
            Preprocess::Normalize => "normalize",
            Preprocess::Standardize => "standardize",
            Preprocess::Decorrelate => "decorrelate",
            Preprocess::Whiten => "whiten",
            Preprocess::Reduce => "reduce",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "center" => Some(Preprocess::Center),
            "normalize" => Some(Preprocess::Normalize),
            "standardize" => Some(Preprocess::Standardize),
            "decorrelate" => Some(Preprocess::Decorrelate),
            "whiten" => Some(Preprocess::Whiten),
            "reduce" => Some(Preprocess::Reduce),
            _ => None,
        }
    }

    fn past_participle(&self) -> &'static str {
        match self {
            Preprocess::Center => "centered",
            Preprocess::Normalize => "normalized",
            Preprocess::Standardize => "standardized",
            Preprocess::Decorrelate => "decorrelated",
            Preprocess::Whiten => "whitened",
            Preprocess::Reduce => "reduced",
        }
    }
}

impl fmt::Display for Preprocess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which matrix a pipeline transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Input,
    Output,
}

impl Side {
    fn plural(&self) -> &'static str {
        match self {
            Side::Input => "Inputs",
            Side::Output => "Outputs",
        }
    }

    pub fn allows(&self, step: Preprocess) -> bool {
        match self {
            Side::Input => true,
            Side::Output => !matches!(step, Preprocess::Whiten | Preprocess::Standardize),
        }
    }
}

/// Ordered preprocessing pipeline for one side of the data.
///
/// Parameters are fitted once on the training matrix by [`Preprocessor::fit_apply`]
/// and then only applied to other matrices.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    side: Side,
    steps: Vec<Preprocess>,
    pub reduction_threshold: f64,
    pub whitening_bias: f64,
    pub center: Option<Centering>,
    pub normalization: Option<Normalization>,
    pub standardization: Option<Standardization>,
    pub decorrelation: Option<Decorrelation>,
}

impl Preprocessor {
    /// Build an unfitted pipeline, rejecting impossible step lists.
    pub fn new(
        side: Side,
        steps: Vec<Preprocess>,
        reduction_threshold: f64,
        whitening_bias: f64,
    ) -> NeuriteResult<Self> {
        Self::validate(side, &steps)?;
        if steps.contains(&Preprocess::Reduce) && !(reduction_threshold > 0.0 && reduction_threshold <= 1.0) {
            return Err(NeuriteError::config(format!(
                "reduction threshold must be in (0, 1], got {}",
                reduction_threshold
            )));
        }
        Ok(Preprocessor {
            side,
            steps,
            reduction_threshold,
            whitening_bias,
            center: None,
            normalization: None,
            standardization: None,
            decorrelation: None,
        })
    }

    /// Each step at most once, output side restrictions, and whiten/reduce
    /// only after decorrelate.
    pub fn validate(side: Side, steps: &[Preprocess]) -> NeuriteResult<()> {
        let mut seen: Vec<Preprocess> = Vec::with_capacity(steps.len());
        for &step in steps {
            if !side.allows(step) {
                return Err(NeuriteError::config(format!(
                    "{} can't be {}.",
                    side.plural(),
                    step.past_participle()
                )));
            }
            if seen.contains(&step) {
                return Err(NeuriteError::config(format!(
                    "{} are {} multiple times.",
                    side.plural(),
                    step.past_participle()
                )));
            }
            if matches!(step, Preprocess::Whiten | Preprocess::Reduce)
                && !seen.contains(&Preprocess::Decorrelate)
            {
                return Err(NeuriteError::config(format!(
                    "{} must be decorrelated before being {}.",
                    side.plural(),
                    step.past_participle()
                )));
            }
            seen.push(step);
        }
        Ok(())
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn steps(&self) -> &[Preprocess] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Fit every step on `train` (transforming it in place), then apply the
    /// fitted parameters to each matrix of `others`.
    pub fn fit_apply(&mut self, train: &mut Matrix, others: &mut [&mut Matrix]) -> NeuriteResult<()> {
        let steps = self.steps.clone();
        for step in steps {
            match step {
                Preprocess::Center => self.center = Some(Centering::fit(train)?),
                Preprocess::Normalize => self.normalization = Some(Normalization::fit(train)?),
                Preprocess::Standardize => {
                    self.standardization = Some(Standardization::fit(train)?)
                }
                Preprocess::Decorrelate => self.decorrelation = Some(Decorrelation::fit(train)?),
                Preprocess::Whiten | Preprocess::Reduce => {}
            }
            self.apply_step(step, train)?;
            for other in others.iter_mut() {
                self.apply_step(step, other)?;
            }
            if step == Preprocess::Reduce {
                log::debug!(
                    "{:?} reduce keeps {} of {} components",
                    self.side,
                    train.cols(),
                    self.decorrelation.as_ref().map_or(0, |d| d.dim())
                );
            }
        }
        Ok(())
    }

    /// Apply the fitted steps in order.
    pub fn apply(&self, x: &mut Matrix) -> NeuriteResult<()> {
        for &step in &self.steps {
            self.apply_step(step, x)?;
        }
        Ok(())
    }

    /// Undo the fitted steps in reverse order.
    pub fn invert(&self, x: &mut Matrix) -> NeuriteResult<()> {
        for &step in self.steps.iter().rev() {
            self.invert_step(step, x)?;
        }
        Ok(())
    }

    fn unfitted(step: Preprocess) -> NeuriteError {
        NeuriteError::InvalidOperation(format!("{} used before being fitted", step))
    }

    fn decorrelation_for(&self, step: Preprocess) -> NeuriteResult<&Decorrelation> {
        self.decorrelation.as_ref().ok_or_else(|| Self::unfitted(step))
    }

    fn apply_step(&self, step: Preprocess, x: &mut Matrix) -> NeuriteResult<()> {
        if x.rows() == 0 {
            return self.reshape_empty(step, x);
        }
        match step {
            Preprocess::Center => self.center.as_ref().ok_or_else(|| Self::unfitted(step))?.apply(x),
            Preprocess::Normalize => self
                .normalization
                .as_ref()
                .ok_or_else(|| Self::unfitted(step))?
                .apply(x),
            Preprocess::Standardize => self
                .standardization
                .as_ref()
                .ok_or_else(|| Self::unfitted(step))?
                .apply(x),
            Preprocess::Decorrelate => {
                *x = self.decorrelation_for(step)?.decorrelate(x)?;
                Ok(())
            }
            Preprocess::Whiten => self.decorrelation_for(step)?.whiten(x, self.whitening_bias),
            Preprocess::Reduce => {
                *x = self
                    .decorrelation_for(step)?
                    .reduce(x, self.reduction_threshold)?;
                Ok(())
            }
        }
    }

    fn invert_step(&self, step: Preprocess, x: &mut Matrix) -> NeuriteResult<()> {
        match step {
            Preprocess::Center => self.center.as_ref().ok_or_else(|| Self::unfitted(step))?.invert(x),
            Preprocess::Normalize => self
                .normalization
                .as_ref()
                .ok_or_else(|| Self::unfitted(step))?
                .invert(x),
            Preprocess::Standardize => self
                .standardization
                .as_ref()
                .ok_or_else(|| Self::unfitted(step))?
                .invert(x),
            Preprocess::Decorrelate => {
                *x = self.decorrelation_for(step)?.recorrelate(x)?;
                Ok(())
            }
            Preprocess::Whiten => self.decorrelation_for(step)?.unwhiten(x, self.whitening_bias),
            Preprocess::Reduce => {
                *x = self.decorrelation_for(step)?.restore(x)?;
                Ok(())
            }
        }
    }

    // Empty matrices (no validation or test rows) only need their width tracked.
    fn reshape_empty(&self, step: Preprocess, x: &mut Matrix) -> NeuriteResult<()> {
        if step == Preprocess::Reduce {
            let d = self.decorrelation_for(step)?;
            let keep = d.retained_components(self.reduction_threshold).min(x.cols());
            *x = Matrix::zeros(0, keep);
        }
        Ok(())
    }
}
