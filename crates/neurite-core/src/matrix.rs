use crate::error::{NeuriteError, NeuriteResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Dense 2-D matrix of `f64`, the data structure every neurite crate shares.
///
/// Stores data in a flat contiguous `Vec<f64>` with row-major (C-order) layout.
/// Rows are samples ("features" of a batch), columns are variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

// ─── Construction ───────────────────────────────────────────────────────────

impl Matrix {
    /// Create a matrix from raw row-major data.
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> NeuriteResult<Self> {
        if data.len() != rows * cols {
            return Err(NeuriteError::ShapeMismatch {
                expected: vec![rows, cols],
                got: vec![data.len()],
            });
        }
        Ok(Matrix { data, rows, cols })
    }

    /// Create a matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Create a matrix filled with a constant value.
    pub fn full(rows: usize, cols: usize, value: f64) -> Self {
        Matrix {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    /// Identity matrix of size n×n.
    pub fn eye(n: usize) -> Self {
        let mut m = Matrix::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    /// Create a matrix from a list of equally sized rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> NeuriteResult<Self> {
        if rows.is_empty() {
            return Ok(Matrix::zeros(0, 0));
        }
        let cols = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(NeuriteError::ShapeMismatch {
                expected: vec![cols],
                got: vec![bad.len()],
            });
        }
        let data: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Matrix::new(data, rows.len(), cols)
    }

    /// A single-row matrix.
    pub fn from_row(row: &[f64]) -> Self {
        Matrix {
            data: row.to_vec(),
            rows: 1,
            cols: row.len(),
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Checked element access.
    pub fn get(&self, i: usize, j: usize) -> NeuriteResult<f64> {
        self.check_index(i, j)?;
        Ok(self.data[i * self.cols + j])
    }

    /// Checked element write.
    pub fn set(&mut self, i: usize, j: usize, value: f64) -> NeuriteResult<()> {
        self.check_index(i, j)?;
        self.data[i * self.cols + j] = value;
        Ok(())
    }

    fn check_index(&self, i: usize, j: usize) -> NeuriteResult<()> {
        if i >= self.rows {
            return Err(NeuriteError::IndexOutOfBounds {
                index: i,
                axis: 0,
                size: self.rows,
            });
        }
        if j >= self.cols {
            return Err(NeuriteError::IndexOutOfBounds {
                index: j,
                axis: 1,
                size: self.cols,
            });
        }
        Ok(())
    }

    /// Borrow row `i`. Panics if `i` is out of range, like slice indexing.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        let cols = self.cols;
        &mut self.data[i * cols..(i + 1) * cols]
    }

    /// Copy column `j` out.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self.data[i * self.cols + j]).collect()
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    // ─── Shape Manipulation ─────────────────────────────────────────────────

    pub fn transpose(&self) -> Matrix {
        let mut data = vec![0.0; self.data.len()];
        for i in 0..self.rows {
            for j in 0..self.cols {
                data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        Matrix {
            data,
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Gather rows in the given order (indices may repeat).
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            data,
            rows: indices.len(),
            cols: self.cols,
        }
    }

    /// Rows `start..end`; an empty range yields a `0 × cols` matrix.
    pub fn slice_rows(&self, start: usize, end: usize) -> NeuriteResult<Matrix> {
        if start > end || end > self.rows {
            return Err(NeuriteError::IndexOutOfBounds {
                index: end,
                axis: 0,
                size: self.rows,
            });
        }
        Ok(Matrix {
            data: self.data[start * self.cols..end * self.cols].to_vec(),
            rows: end - start,
            cols: self.cols,
        })
    }

    /// Keep the `n` leftmost columns.
    pub fn left_cols(&self, n: usize) -> NeuriteResult<Matrix> {
        if n > self.cols {
            return Err(NeuriteError::IndexOutOfBounds {
                index: n,
                axis: 1,
                size: self.cols,
            });
        }
        let mut data = Vec::with_capacity(self.rows * n);
        for row in self.iter_rows() {
            data.extend_from_slice(&row[..n]);
        }
        Ok(Matrix {
            data,
            rows: self.rows,
            cols: n,
        })
    }

    /// Widen to `n` columns, filling the new columns with zeros.
    pub fn pad_cols(&self, n: usize) -> NeuriteResult<Matrix> {
        if n < self.cols {
            return Err(NeuriteError::DimensionMismatch(format!(
                "cannot pad {} columns down to {}",
                self.cols, n
            )));
        }
        let mut out = Matrix::zeros(self.rows, n);
        for i in 0..self.rows {
            out.row_mut(i)[..self.cols].copy_from_slice(self.row(i));
        }
        Ok(out)
    }

    // ─── Arithmetic ─────────────────────────────────────────────────────────

    /// Matrix product `self · other`.
    pub fn matmul(&self, other: &Matrix) -> NeuriteResult<Matrix> {
        if self.cols != other.rows {
            return Err(NeuriteError::ShapeMismatch {
                expected: vec![self.cols, other.cols],
                got: vec![other.rows, other.cols],
            });
        }
        let (m, k, n) = (self.rows, self.cols, other.cols);
        let mut data = vec![0.0; m * n];
        for i in 0..m {
            for p in 0..k {
                let a = self.data[i * k + p];
                if a == 0.0 {
                    continue;
                }
                for j in 0..n {
                    data[i * n + j] += a * other.data[p * n + j];
                }
            }
        }
        Ok(Matrix { data, rows: m, cols: n })
    }

    pub fn apply_mut<F: Fn(f64) -> f64>(&mut self, f: F) {
        for v in self.data.iter_mut() {
            *v = f(*v);
        }
    }

    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Matrix {
        Matrix {
            data: self.data.iter().map(|&v| f(v)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Element-wise `self + other`, shapes must agree.
    pub fn add(&self, other: &Matrix) -> NeuriteResult<Matrix> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise `self - other`, shapes must agree.
    pub fn sub(&self, other: &Matrix) -> NeuriteResult<Matrix> {
        self.zip_with(other, |a, b| a - b)
    }

    fn zip_with<F: Fn(f64, f64) -> f64>(&self, other: &Matrix, f: F) -> NeuriteResult<Matrix> {
        if self.shape() != other.shape() {
            return Err(NeuriteError::ShapeMismatch {
                expected: vec![self.rows, self.cols],
                got: vec![other.rows, other.cols],
            });
        }
        Ok(Matrix {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            rows: self.rows,
            cols: self.cols,
        })
    }

    // ─── Reductions ─────────────────────────────────────────────────────────

    pub fn sum_all(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Per-column mean; `EmptyMatrix` when there are no rows.
    pub fn column_means(&self) -> NeuriteResult<Vec<f64>> {
        if self.rows == 0 {
            return Err(NeuriteError::EmptyMatrix);
        }
        let mut means = vec![0.0; self.cols];
        for row in self.iter_rows() {
            for (m, &v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        let n = self.rows as f64;
        means.iter_mut().for_each(|m| *m /= n);
        Ok(means)
    }

    /// Per-column `(min, max)`.
    pub fn column_bounds(&self) -> NeuriteResult<Vec<(f64, f64)>> {
        if self.rows == 0 {
            return Err(NeuriteError::EmptyMatrix);
        }
        let mut bounds = vec![(f64::INFINITY, f64::NEG_INFINITY); self.cols];
        for row in self.iter_rows() {
            for (b, &v) in bounds.iter_mut().zip(row) {
                b.0 = b.0.min(v);
                b.1 = b.1.max(v);
            }
        }
        Ok(bounds)
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;
    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        &mut self.data[i * self.cols + j]
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::zeros(0, 0)
    }
}

// ─── Display ────────────────────────────────────────────────────────────────

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "matrix([")?;
        for i in 0..self.rows.min(8) {
            write!(f, "  [")?;
            for j in 0..self.cols.min(8) {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:.4}", self[(i, j)])?;
            }
            if self.cols > 8 {
                write!(f, ", ...")?;
            }
            writeln!(f, "],")?;
        }
        if self.rows > 8 {
            writeln!(f, "  ...")?;
        }
        write!(f, "], shape=({}, {}))", self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_creation() {
        let m = Matrix::zeros(3, 4);
        assert_eq!(m.shape(), (3, 4));
        assert_eq!(m.data().len(), 12);

        let m = Matrix::eye(3);
        assert_eq!(m.sum_all(), 3.0);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 1)], 0.0);

        assert!(Matrix::new(vec![1.0, 2.0, 3.0], 2, 2).is_err());
    }

    #[test]
    fn test_from_rows() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.get(1, 2).unwrap(), 6.0);
        assert_eq!(m.col(1), vec![2.0, 5.0]);
        assert!(Matrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(m.get(2, 0).is_err());
    }

    #[test]
    fn test_matmul_and_transpose() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(&[vec![5.0, 6.0], vec![7.0, 8.0]]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.data(), &[19.0, 22.0, 43.0, 50.0]);

        let t = Matrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap().transpose();
        assert_eq!(t.shape(), (3, 1));
        assert_eq!(t.col(0), vec![1.0, 2.0, 3.0]);

        assert!(a.matmul(&t).is_err());
    }

    #[test]
    fn test_row_selection() {
        let m = Matrix::from_rows(&[vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]]).unwrap();
        let s = m.select_rows(&[2, 0]);
        assert_eq!(s.row(0), &[3.0, 3.0]);
        assert_eq!(s.row(1), &[1.0, 1.0]);

        let top = m.slice_rows(0, 2).unwrap();
        assert_eq!(top.rows(), 2);
        let none = m.slice_rows(3, 3).unwrap();
        assert_eq!(none.shape(), (0, 2));
        assert!(m.slice_rows(2, 4).is_err());
    }

    #[test]
    fn test_column_truncate_and_pad() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let left = m.left_cols(2).unwrap();
        assert_eq!(left.data(), &[1.0, 2.0, 4.0, 5.0]);
        let padded = left.pad_cols(4).unwrap();
        assert_eq!(padded.row(1), &[4.0, 5.0, 0.0, 0.0]);
        assert!(m.left_cols(4).is_err());
        assert!(m.pad_cols(1).is_err());
    }

    #[test]
    fn test_column_statistics() {
        let m = Matrix::from_rows(&[vec![1.0, 10.0], vec![3.0, 30.0], vec![5.0, 20.0]]).unwrap();
        let means = m.column_means().unwrap();
        assert_abs_diff_eq!(means[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(means[1], 20.0, epsilon = 1e-12);

        let bounds = m.column_bounds().unwrap();
        assert_eq!(bounds, vec![(1.0, 5.0), (10.0, 30.0)]);

        assert!(Matrix::zeros(0, 2).column_means().is_err());
    }

    #[test]
    fn test_nan_detection() {
        let mut m = Matrix::zeros(2, 2);
        assert!(!m.has_nan());
        m[(1, 0)] = f64::NAN;
        assert!(m.has_nan());
    }
}
