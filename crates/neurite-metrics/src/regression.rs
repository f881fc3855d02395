use neurite_core::{Matrix, NeuriteError, NeuriteResult};

fn check_shapes(y_true: &Matrix, y_pred: &Matrix) -> NeuriteResult<()> {
    if y_true.shape() != y_pred.shape() {
        return Err(NeuriteError::ShapeMismatch {
            expected: vec![y_true.rows(), y_true.cols()],
            got: vec![y_pred.rows(), y_pred.cols()],
        });
    }
    Ok(())
}

/// Mean Absolute Error over every element.
pub fn mae(y_true: &Matrix, y_pred: &Matrix) -> NeuriteResult<f64> {
    check_shapes(y_true, y_pred)?;
    let n = y_true.data().len();
    if n == 0 {
        return Ok(0.0);
    }
    let sum: f64 = y_true
        .data()
        .iter()
        .zip(y_pred.data())
        .map(|(t, p)| (t - p).abs())
        .sum();
    Ok(sum / n as f64)
}

/// Mean Squared Error over every element.
pub fn mse(y_true: &Matrix, y_pred: &Matrix) -> NeuriteResult<f64> {
    check_shapes(y_true, y_pred)?;
    let n = y_true.data().len();
    if n == 0 {
        return Ok(0.0);
    }
    let sum: f64 = y_true
        .data()
        .iter()
        .zip(y_pred.data())
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    Ok(sum / n as f64)
}

/// `(mae, mse)` after min/max-normalizing both matrices with the bounds of
/// `y_true`, so the figures are comparable across output scales.
pub fn regression_metrics(y_true: &Matrix, y_pred: &Matrix) -> NeuriteResult<(f64, f64)> {
    check_shapes(y_true, y_pred)?;
    if y_true.rows() == 0 {
        return Ok((0.0, 0.0));
    }
    let bounds = y_true.column_bounds()?;
    let scale = |m: &Matrix| {
        let mut out = m.clone();
        for i in 0..out.rows() {
            for (j, v) in out.row_mut(i).iter_mut().enumerate() {
                let (lo, hi) = bounds[j];
                *v = if hi - lo == 0.0 { *v - lo } else { (*v - lo) / (hi - lo) };
            }
        }
        out
    };
    let t = scale(y_true);
    let p = scale(y_pred);
    Ok((mae(&t, &p)?, mse(&t, &p)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mae_mse() {
        let t = Matrix::from_rows(&[vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        let p = Matrix::from_rows(&[vec![1.5], vec![2.0], vec![2.0]]).unwrap();
        assert_abs_diff_eq!(mae(&t, &p).unwrap(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(mse(&t, &p).unwrap(), 1.25 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_regression_metrics_are_scale_free() {
        let t = Matrix::from_rows(&[vec![0.0, 0.0], vec![10.0, 1000.0]]).unwrap();
        let p = Matrix::from_rows(&[vec![1.0, 100.0], vec![10.0, 1000.0]]).unwrap();
        let (first, second) = regression_metrics(&t, &p).unwrap();
        assert_abs_diff_eq!(first, 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(second, 0.005, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_test_set() {
        let empty = Matrix::zeros(0, 2);
        assert_eq!(regression_metrics(&empty, &empty).unwrap(), (0.0, 0.0));
    }
}
