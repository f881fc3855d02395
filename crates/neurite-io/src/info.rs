//! `.out` files: the human-readable half of a trained model.
//!
//! Sections, in order: labels, loss and its traces, metrics, optional
//! classification threshold, optimal epoch, input preprocessing parameters,
//! output preprocessing parameters, then expected and predicted test values.
//! An absent parameter block is written as a lone `0`.

use crate::lines::{join, Lines};
use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use neurite_loss::Loss;
use neurite_preprocessing::{
    Centering, Decorrelation, Normalization, Preprocess, Preprocessor, Side, Standardization,
};
use std::fs;
use std::path::Path;

/// Expected and predicted raw test values for one output column.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPredictions {
    pub label: String,
    pub expected: Vec<f64>,
    pub predicted: Vec<f64>,
}

/// Parsed content of a `.out` file.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub input_labels: Vec<String>,
    pub output_labels: Vec<String>,
    pub loss: Loss,
    pub train_losses: Vec<f64>,
    pub valid_losses: Vec<f64>,
    pub first_metrics: Vec<f64>,
    pub second_metrics: Vec<f64>,
    pub class_validity: Option<f64>,
    pub optimal_epoch: usize,
    pub input: Preprocessor,
    pub output: Preprocessor,
    pub predictions: Vec<LabelPredictions>,
}

impl ModelInfo {
    /// Write to `path`, creating or truncating it.
    pub fn write(&self, path: &Path) -> NeuriteResult<()> {
        let mut out = String::new();
        out.push_str("input labels:\n");
        out.push_str(&self.input_labels.iter().map(|l| format!("{},", l)).collect::<String>());
        out.push_str("\noutput labels:\n");
        out.push_str(&self.output_labels.iter().map(|l| format!("{},", l)).collect::<String>());
        out.push_str(&format!("\nloss:\n{}\n", self.loss.name()));
        out.push_str(&format!("{}\n{}\n", join(&self.train_losses), join(&self.valid_losses)));
        out.push_str(&format!(
            "metric:\n{}\n{}\n",
            join(&self.first_metrics),
            join(&self.second_metrics)
        ));
        if let Some(threshold) = self.class_validity {
            out.push_str(&format!("classification threshold:\n{}\n", threshold));
        }
        out.push_str(&format!("optimal epoch:\n{}\n", self.optimal_epoch));
        write_side(&mut out, "input", &self.input);
        write_side(&mut out, "output", &self.output);
        out.push_str("expected and predicted values:\n");
        for p in &self.predictions {
            out.push_str(&format!("label: {}\n{}\n{}\n", p.label, join(&p.expected), join(&p.predicted)));
        }

        fs::write(path, out).map_err(|e| NeuriteError::io(path.display().to_string(), e))?;
        log::info!("wrote {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> NeuriteResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| NeuriteError::io(path.display().to_string(), e))?;
        let mut c = Lines::new(path, &text);

        c.expect("input labels:")?;
        let input_labels = c.strings()?;
        c.expect("output labels:")?;
        let output_labels = c.strings()?;
        c.expect("loss:")?;
        let name = c.next()?;
        let loss = Loss::from_name(name).ok_or_else(|| c.error(format!("unknown loss `{}`", name)))?;
        let train_losses = c.list()?;
        let valid_losses = c.list()?;
        c.expect("metric:")?;
        let first_metrics = c.list()?;
        let second_metrics = c.list()?;
        let class_validity = if c.peek() == Some("classification threshold:") {
            c.next()?;
            let line = c.next()?;
            Some(c.number(line)?)
        } else {
            None
        };
        c.expect("optimal epoch:")?;
        let line = c.next()?;
        let optimal_epoch = c.number(line)?;
        let input = read_side(&mut c, Side::Input)?;
        let output = read_side(&mut c, Side::Output)?;

        c.expect("expected and predicted values:")?;
        let mut predictions = Vec::new();
        while let Some(line) = c.peek() {
            if line.trim().is_empty() {
                c.next()?;
                continue;
            }
            let label = line
                .strip_prefix("label: ")
                .ok_or_else(|| c.error(format!("expected `label: <name>`, found `{}`", line)))?
                .to_string();
            c.next()?;
            let expected = c.list()?;
            let predicted = c.list()?;
            predictions.push(LabelPredictions {
                label,
                expected,
                predicted,
            });
        }

        Ok(ModelInfo {
            input_labels,
            output_labels,
            loss,
            train_losses,
            valid_losses,
            first_metrics,
            second_metrics,
            class_validity,
            optimal_epoch,
            input,
            output,
            predictions,
        })
    }
}

fn write_side(out: &mut String, side: &str, p: &Preprocessor) {
    out.push_str(&format!("{} preprocess:\n", side));
    out.push_str(&p.steps().iter().map(|s| format!("{},", s)).collect::<String>());
    out.push('\n');

    out.push_str(&format!("{} eigenvalues:\n", side));
    match &p.decorrelation {
        None => out.push_str("0\n"),
        Some(d) => {
            out.push_str(&format!("{}\n{}\n", join(&d.eigenvalues), p.reduction_threshold));
            if p.side() == Side::Input {
                out.push_str(&format!("{}\n", p.whitening_bias));
            }
        }
    }
    out.push_str(&format!("{} eigenvectors:\n", side));
    match &p.decorrelation {
        None => out.push_str("0\n"),
        Some(d) => {
            // one eigenvector per line
            let vectors = d.eigenvectors.transpose();
            for row in vectors.iter_rows() {
                out.push_str(&format!("{}\n", join(row)));
            }
        }
    }

    out.push_str(&format!("{} center:\n", side));
    match &p.center {
        None => out.push_str("0\n"),
        Some(c) => out.push_str(&format!("{}\n", join(&c.mean))),
    }
    out.push_str(&format!("{} normalization:\n", side));
    match &p.normalization {
        None => out.push_str("0\n"),
        Some(n) => out.push_str(&format!("{}\n{}\n", join(&n.min), join(&n.max))),
    }
    if p.side() == Side::Input {
        out.push_str(&format!("{} standardization:\n", side));
        match &p.standardization {
            None => out.push_str("0\n"),
            Some(s) => out.push_str(&format!("{}\n{}\n", join(&s.mean), join(&s.deviation))),
        }
    }
}

fn read_side(c: &mut Lines<'_>, side: Side) -> NeuriteResult<Preprocessor> {
    let name = match side {
        Side::Input => "input",
        Side::Output => "output",
    };

    c.expect(&format!("{} preprocess:", name))?;
    let line = c.next()?;
    let steps = line
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| Preprocess::from_name(t).ok_or_else(|| c.error(format!("unknown preprocess `{}`", t))))
        .collect::<NeuriteResult<Vec<_>>>()?;

    c.expect(&format!("{} eigenvalues:", name))?;
    let mut reduction_threshold = 1.0;
    let mut whitening_bias = 0.0;
    let eigenvalues = if c.absent() {
        None
    } else {
        let values = c.list()?;
        let line = c.next()?;
        reduction_threshold = c.number(line)?;
        if side == Side::Input {
            let line = c.next()?;
            whitening_bias = c.number(line)?;
        }
        Some(values)
    };

    c.expect(&format!("{} eigenvectors:", name))?;
    let decorrelation = match eigenvalues {
        None => {
            c.absent();
            None
        }
        Some(values) => {
            if c.absent() {
                return Err(c.error("eigenvalues without eigenvectors"));
            }
            let n = values.len();
            let mut data = Vec::with_capacity(n * n);
            for _ in 0..n {
                let row = c.list()?;
                if row.len() != n {
                    return Err(c.error(format!("eigenvector of length {} for {} components", row.len(), n)));
                }
                data.extend(row);
            }
            Some(Decorrelation {
                eigenvalues: values,
                eigenvectors: Matrix::new(data, n, n)?.transpose(),
            })
        }
    };

    c.expect(&format!("{} center:", name))?;
    let center = if c.absent() {
        None
    } else {
        Some(Centering { mean: c.list()? })
    };
    c.expect(&format!("{} normalization:", name))?;
    let normalization = if c.absent() {
        None
    } else {
        Some(Normalization {
            min: c.list()?,
            max: c.list()?,
        })
    };
    let standardization = if side == Side::Input {
        c.expect(&format!("{} standardization:", name))?;
        if c.absent() {
            None
        } else {
            Some(Standardization {
                mean: c.list()?,
                deviation: c.list()?,
            })
        }
    } else {
        None
    };

    let mut p = Preprocessor::new(side, steps, reduction_threshold, whitening_bias)
        .map_err(|e| c.error(e.to_string()))?;
    p.center = center;
    p.normalization = normalization;
    p.standardization = standardization;
    p.decorrelation = decorrelation;
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted(side: Side, steps: Vec<Preprocess>) -> Preprocessor {
        let mut p = Preprocessor::new(side, steps, 0.95, 1e-3).unwrap();
        let mut x = Matrix::from_rows(&[
            vec![1.0, 2.0, 0.3],
            vec![2.0, 4.5, 0.1],
            vec![3.0, 5.5, 0.9],
            vec![4.0, 8.0, 0.2],
        ])
        .unwrap();
        p.fit_apply(&mut x, &mut []).unwrap();
        p
    }

    fn info() -> ModelInfo {
        ModelInfo {
            input_labels: vec!["a".into(), "b".into(), "c".into()],
            output_labels: vec!["x".into(), "y".into(), "z".into()],
            loss: Loss::CrossEntropy,
            train_losses: vec![1.5, 1.0, 0.75],
            valid_losses: vec![1.6, 1.1, 0.8],
            first_metrics: vec![10.0, 50.0, 75.0],
            second_metrics: vec![5.0, 2.0, 1.0],
            class_validity: Some(0.9),
            optimal_epoch: 2,
            input: fitted(
                Side::Input,
                vec![
                    Preprocess::Standardize,
                    Preprocess::Center,
                    Preprocess::Decorrelate,
                    Preprocess::Whiten,
                ],
            ),
            output: fitted(Side::Output, vec![Preprocess::Normalize]),
            predictions: vec![LabelPredictions {
                label: "x".into(),
                expected: vec![1.0, 0.0],
                predicted: vec![0.93, 0.12],
            }],
        }
    }

    #[test]
    fn test_info_round_trip() {
        let original = info();
        let path = std::env::temp_dir().join("neurite_io_info_round_trip.out");
        original.write(&path).unwrap();
        let back = ModelInfo::read(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back.input_labels, original.input_labels);
        assert_eq!(back.loss, Loss::CrossEntropy);
        assert_eq!(back.train_losses, original.train_losses);
        assert_eq!(back.second_metrics, original.second_metrics);
        assert_eq!(back.class_validity, Some(0.9));
        assert_eq!(back.optimal_epoch, 2);
        assert_eq!(back.input.steps(), original.input.steps());
        assert_eq!(back.input.decorrelation, original.input.decorrelation);
        assert_eq!(back.input.standardization, original.input.standardization);
        assert_eq!(back.input.center, original.input.center);
        assert_eq!(back.input.whitening_bias, 1e-3);
        assert_eq!(back.output.normalization, original.output.normalization);
        assert!(back.output.decorrelation.is_none());
        assert_eq!(back.predictions, original.predictions);
    }

    #[test]
    fn test_regression_file_has_no_threshold() {
        let mut original = info();
        original.loss = Loss::L2;
        original.class_validity = None;
        let path = std::env::temp_dir().join("neurite_io_info_regression.out");
        original.write(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("classification threshold:"));
        assert!(text.contains("loss:\nmse\n"));
        let back = ModelInfo::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back.class_validity, None);
    }

    #[test]
    fn test_unknown_loss_is_parse_error() {
        let path = std::env::temp_dir().join("neurite_io_info_bad_loss.out");
        std::fs::write(&path, "input labels:\na,\noutput labels:\nb,\nloss:\nhinge\n").unwrap();
        let err = ModelInfo::read(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, NeuriteError::Parse { line: 6, .. }));
    }
}
