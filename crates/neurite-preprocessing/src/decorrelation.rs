use neurite_core::{Matrix, NeuriteError, NeuriteResult};
use neurite_linalg::{covariance, symmetric_eigen};

/// Eigenbasis of the training covariance, shared by decorrelate, whiten and reduce.
///
/// `eigenvectors` holds one eigenvector per column, ordered by descending
/// eigenvalue. A projected row is `row · E`.
#[derive(Debug, Clone, PartialEq)]
pub struct Decorrelation {
    pub eigenvalues: Vec<f64>,
    pub eigenvectors: Matrix,
}

impl Decorrelation {
    /// Fit on training data (usually centered beforehand).
    pub fn fit(x: &Matrix) -> NeuriteResult<Self> {
        let cov = covariance(x)?;
        let eig = symmetric_eigen(&cov)?;
        Ok(Decorrelation {
            eigenvalues: eig.values,
            eigenvectors: eig.vectors,
        })
    }

    pub fn dim(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Rotate into the eigenbasis.
    pub fn decorrelate(&self, x: &Matrix) -> NeuriteResult<Matrix> {
        x.matmul(&self.eigenvectors)
    }

    /// Rotate back: `row · Eᵀ`. Narrower input is zero padded first.
    pub fn recorrelate(&self, x: &Matrix) -> NeuriteResult<Matrix> {
        let full = self.restore(x)?;
        full.matmul(&self.eigenvectors.transpose())
    }

    fn whitening_scale(&self, j: usize, bias: f64) -> f64 {
        self.eigenvalues[j].max(0.0).sqrt() + bias
    }

    /// Divide each projected component by `sqrt(λ) + bias`.
    pub fn whiten(&self, x: &mut Matrix, bias: f64) -> NeuriteResult<()> {
        self.check_projected(x)?;
        for i in 0..x.rows() {
            for (j, v) in x.row_mut(i).iter_mut().enumerate() {
                *v /= self.whitening_scale(j, bias);
            }
        }
        Ok(())
    }

    pub fn unwhiten(&self, x: &mut Matrix, bias: f64) -> NeuriteResult<()> {
        self.check_projected(x)?;
        for i in 0..x.rows() {
            for (j, v) in x.row_mut(i).iter_mut().enumerate() {
                *v *= self.whitening_scale(j, bias);
            }
        }
        Ok(())
    }

    /// Smallest leading component count whose cumulative eigenvalue share
    /// reaches `threshold`.
    pub fn retained_components(&self, threshold: f64) -> usize {
        let total: f64 = self.eigenvalues.iter().map(|v| v.max(0.0)).sum();
        if total <= 0.0 {
            return self.dim();
        }
        let mut cumulative = 0.0;
        for (k, v) in self.eigenvalues.iter().enumerate() {
            cumulative += v.max(0.0);
            if cumulative / total >= threshold {
                return k + 1;
            }
        }
        self.dim()
    }

    /// Keep the leading components reaching `threshold` of the variance.
    pub fn reduce(&self, x: &Matrix, threshold: f64) -> NeuriteResult<Matrix> {
        self.check_projected(x)?;
        let keep = self.retained_components(threshold).min(x.cols());
        x.left_cols(keep)
    }

    /// Zero-pad reduced data back to the full eigenbasis width.
    pub fn restore(&self, x: &Matrix) -> NeuriteResult<Matrix> {
        self.check_projected(x)?;
        x.pad_cols(self.dim())
    }

    fn check_projected(&self, x: &Matrix) -> NeuriteResult<()> {
        if x.cols() > self.dim() {
            return Err(NeuriteError::DimensionMismatch(format!(
                "eigenbasis has {} components, got {} columns",
                self.dim(),
                x.cols()
            )));
        }
        Ok(())
    }
}
