use neurite_core::{Matrix, NeuriteError, NeuriteResult};

fn check_width(m: &Matrix, expected: usize) -> NeuriteResult<()> {
    if m.cols() != expected {
        return Err(NeuriteError::DimensionMismatch(format!(
            "fitted on {} columns, got {}",
            expected,
            m.cols()
        )));
    }
    Ok(())
}

/// Subtract the per-column training mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Centering {
    pub mean: Vec<f64>,
}

impl Centering {
    pub fn fit(x: &Matrix) -> NeuriteResult<Self> {
        Ok(Centering {
            mean: x.column_means()?,
        })
    }

    pub fn apply(&self, x: &mut Matrix) -> NeuriteResult<()> {
        check_width(x, self.mean.len())?;
        for i in 0..x.rows() {
            for (v, m) in x.row_mut(i).iter_mut().zip(&self.mean) {
                *v -= m;
            }
        }
        Ok(())
    }

    pub fn invert(&self, x: &mut Matrix) -> NeuriteResult<()> {
        check_width(x, self.mean.len())?;
        for i in 0..x.rows() {
            for (v, m) in x.row_mut(i).iter_mut().zip(&self.mean) {
                *v += m;
            }
        }
        Ok(())
    }
}

/// Scale each column into [0, 1] with the training (min, max).
///
/// A column with zero range maps to 0 and inverts back to its min.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Normalization {
    pub fn fit(x: &Matrix) -> NeuriteResult<Self> {
        let bounds = x.column_bounds()?;
        let (min, max): (Vec<f64>, Vec<f64>) = bounds.into_iter().unzip();
        let flat = min.iter().zip(&max).filter(|&(lo, hi)| *hi - *lo == 0.0).count();
        if flat > 0 {
            log::warn!("normalization: {} column(s) with zero range", flat);
        }
        Ok(Normalization { min, max })
    }

    pub fn apply(&self, x: &mut Matrix) -> NeuriteResult<()> {
        check_width(x, self.min.len())?;
        for i in 0..x.rows() {
            for (j, v) in x.row_mut(i).iter_mut().enumerate() {
                let range = self.max[j] - self.min[j];
                *v = if range == 0.0 {
                    0.0
                } else {
                    (*v - self.min[j]) / range
                };
            }
        }
        Ok(())
    }

    pub fn invert(&self, x: &mut Matrix) -> NeuriteResult<()> {
        check_width(x, self.min.len())?;
        for i in 0..x.rows() {
            for (j, v) in x.row_mut(i).iter_mut().enumerate() {
                *v = *v * (self.max[j] - self.min[j]) + self.min[j];
            }
        }
        Ok(())
    }
}

/// Remove the mean and divide by the population standard deviation.
///
/// A column with zero deviation is only centered.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardization {
    pub mean: Vec<f64>,
    pub deviation: Vec<f64>,
}

impl Standardization {
    pub fn fit(x: &Matrix) -> NeuriteResult<Self> {
        let mean = x.column_means()?;
        let mut deviation = vec![0.0; x.cols()];
        for row in x.iter_rows() {
            for (j, &v) in row.iter().enumerate() {
                deviation[j] += (v - mean[j]).powi(2);
            }
        }
        let n = x.rows() as f64;
        deviation.iter_mut().for_each(|d| *d = (*d / n).sqrt());
        Ok(Standardization { mean, deviation })
    }

    fn safe_deviation(&self, j: usize) -> f64 {
        if self.deviation[j] == 0.0 {
            1.0
        } else {
            self.deviation[j]
        }
    }

    pub fn apply(&self, x: &mut Matrix) -> NeuriteResult<()> {
        check_width(x, self.mean.len())?;
        for i in 0..x.rows() {
            for (j, v) in x.row_mut(i).iter_mut().enumerate() {
                *v = (*v - self.mean[j]) / self.safe_deviation(j);
            }
        }
        Ok(())
    }

    pub fn invert(&self, x: &mut Matrix) -> NeuriteResult<()> {
        check_width(x, self.mean.len())?;
        for i in 0..x.rows() {
            for (j, v) in x.row_mut(i).iter_mut().enumerate() {
                *v = *v * self.safe_deviation(j) + self.mean[j];
            }
        }
        Ok(())
    }
}
