use neurite_core::{Matrix, NeuriteError, NeuriteResult};

/// Classification scores against a validity threshold, as percentages of
/// the positive (expected == 1) elements:
/// - first: positives predicted at or above `threshold`
/// - second: negatives (expected == 0) predicted at or above `threshold`
pub fn classification_metrics(y_true: &Matrix, y_pred: &Matrix, threshold: f64) -> NeuriteResult<(f64, f64)> {
    if y_true.shape() != y_pred.shape() {
        return Err(NeuriteError::ShapeMismatch {
            expected: vec![y_true.rows(), y_true.cols()],
            got: vec![y_pred.rows(), y_pred.cols()],
        });
    }

    let mut positives = 0usize;
    let mut validated = 0usize;
    let mut false_predictions = 0usize;
    for (&t, &p) in y_true.data().iter().zip(y_pred.data()) {
        if (t - 1.0).abs() < f64::EPSILON {
            positives += 1;
            if p >= threshold {
                validated += 1;
            }
        } else if t.abs() < f64::EPSILON && p >= threshold {
            false_predictions += 1;
        }
    }

    if positives == 0 {
        return Ok((0.0, 0.0));
    }
    let n = positives as f64;
    Ok((100.0 * validated as f64 / n, 100.0 * false_predictions as f64 / n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn one_hot() -> Matrix {
        Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap()
    }

    #[test]
    fn test_classification_metrics() {
        let pred = Matrix::from_rows(&[
            vec![0.95, 0.05],
            vec![0.2, 0.8],
            vec![0.92, 0.08],
            vec![0.91, 0.09],
        ])
        .unwrap();
        let (validated, wrong) = classification_metrics(&one_hot(), &pred, 0.9).unwrap();
        // positives: 4; at or above 0.9: rows 0 and 2 → 50%
        assert_abs_diff_eq!(validated, 50.0, epsilon = 1e-12);
        // row 3 column 0 is a negative predicted positive → 25%
        assert_abs_diff_eq!(wrong, 25.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_positive_gives_zero() {
        let t = Matrix::zeros(3, 2);
        let p = Matrix::full(3, 2, 0.99);
        assert_eq!(classification_metrics(&t, &p, 0.9).unwrap(), (0.0, 0.0));
    }
}
