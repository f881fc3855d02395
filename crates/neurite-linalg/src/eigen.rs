use neurite_core::{Matrix, NeuriteError, NeuriteResult};

/// Eigendecomposition of a symmetric matrix: A = E · diag(λ) · Eᵀ
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues, sorted descending.
    pub values: Vec<f64>,
    /// Eigenvectors as columns, in the same order as `values`.
    pub vectors: Matrix,
}

const MAX_SWEEPS: usize = 100;
const OFF_DIAGONAL_TOL: f64 = 1e-12;

/// Sample covariance XᵀX / (n − 1) of already centered data.
///
/// With a single row the divisor falls back to 1.
pub fn covariance(centered: &Matrix) -> NeuriteResult<Matrix> {
    if centered.rows() == 0 {
        return Err(NeuriteError::EmptyMatrix);
    }
    let denom = (centered.rows().saturating_sub(1)).max(1) as f64;
    let mut cov = centered.transpose().matmul(centered)?;
    cov.apply_mut(|v| v / denom);
    Ok(cov)
}

/// Symmetric eigendecomposition using cyclic Jacobi rotations.
pub fn symmetric_eigen(a: &Matrix) -> NeuriteResult<EigenDecomposition> {
    let n = a.rows();
    if n != a.cols() {
        return Err(NeuriteError::InvalidOperation(
            "eigendecomposition requires a square matrix".into(),
        ));
    }
    if a.has_nan() {
        return Err(NeuriteError::InvalidOperation(
            "eigendecomposition of a matrix containing NaN".into(),
        ));
    }

    let mut m = a.data().to_vec();
    let mut vecs = Matrix::eye(n).into_data();

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .map(|(i, j)| m[i * n + j] * m[i * n + j])
            .sum();
        if off.sqrt() < OFF_DIAGONAL_TOL {
            break;
        }

        for p in 0..n {
            for q in p + 1..n {
                let apq = m[p * n + q];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let app = m[p * n + p];
                let aqq = m[q * n + q];

                // Rotation angle zeroing m[p][q]
                let tau = (aqq - app) / (2.0 * apq);
                let t = tau.signum() / (tau.abs() + (1.0 + tau * tau).sqrt());
                let t = if tau == 0.0 { 1.0 } else { t };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                for k in 0..n {
                    let mkp = m[k * n + p];
                    let mkq = m[k * n + q];
                    m[k * n + p] = c * mkp - s * mkq;
                    m[k * n + q] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[p * n + k];
                    let mqk = m[q * n + k];
                    m[p * n + k] = c * mpk - s * mqk;
                    m[q * n + k] = s * mpk + c * mqk;
                }

                // Accumulate eigenvectors
                for k in 0..n {
                    let vkp = vecs[k * n + p];
                    let vkq = vecs[k * n + q];
                    vecs[k * n + p] = c * vkp - s * vkq;
                    vecs[k * n + q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[j * n + j].total_cmp(&m[i * n + i]));

    let values: Vec<f64> = order.iter().map(|&i| m[i * n + i]).collect();
    let mut sorted = Vec::with_capacity(n * n);
    for row in 0..n {
        for &idx in &order {
            sorted.push(vecs[row * n + idx]);
        }
    }

    Ok(EigenDecomposition {
        values,
        vectors: Matrix::new(sorted, n, n)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_eigen_diagonal() {
        let a = Matrix::from_rows(&[vec![3.0, 0.0], vec![0.0, 4.0]]).unwrap();
        let eig = symmetric_eigen(&a).unwrap();
        assert_abs_diff_eq!(eig.values[0], 4.0, epsilon = 1e-10);
        assert_abs_diff_eq!(eig.values[1], 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(eig.vectors[(1, 0)].abs(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_eigen_reconstructs() {
        let a = Matrix::from_rows(&[
            vec![4.0, 1.0, 0.5],
            vec![1.0, 3.0, 0.2],
            vec![0.5, 0.2, 2.0],
        ])
        .unwrap();
        let eig = symmetric_eigen(&a).unwrap();
        assert!(eig.values.windows(2).all(|w| w[0] >= w[1]));

        // E · diag(λ) · Eᵀ == A
        let mut scaled = eig.vectors.clone();
        for i in 0..3 {
            for j in 0..3 {
                scaled[(i, j)] *= eig.values[j];
            }
        }
        let back = scaled.matmul(&eig.vectors.transpose()).unwrap();
        for (x, y) in back.data().iter().zip(a.data()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
        }

        // Columns are orthonormal
        let gram = eig.vectors.transpose().matmul(&eig.vectors).unwrap();
        for (x, y) in gram.data().iter().zip(Matrix::eye(3).data()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_covariance() {
        let x = Matrix::from_rows(&[vec![-1.0, -2.0], vec![0.0, 0.0], vec![1.0, 2.0]]).unwrap();
        let cov = covariance(&x).unwrap();
        assert_abs_diff_eq!(cov[(0, 0)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[(0, 1)], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[(1, 1)], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_square_rejected() {
        assert!(symmetric_eigen(&Matrix::zeros(2, 3)).is_err());
        assert!(covariance(&Matrix::zeros(0, 3)).is_err());
    }
}
