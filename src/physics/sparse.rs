//! Row-compressed sparse matrix for constraint Jacobians

use crate::physics::math::{Scalar, VecN};

/// Sparse matrix stored as consecutive rows of `(column, value)` entries
///
/// Rows are appended in order and may repeat a column; repeated entries are
/// summed by the products. Storage is reused across `clear` calls.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    columns: usize,
    row_starts: Vec<usize>,
    entries: Vec<(usize, Scalar)>,
}

impl Default for SparseMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SparseMatrix {
    pub fn new(columns: usize) -> Self {
        Self {
            columns,
            row_starts: vec![0],
            entries: Vec::new(),
        }
    }

    /// Drop all rows and set a new column count
    pub fn clear(&mut self, columns: usize) {
        self.columns = columns;
        self.row_starts.clear();
        self.row_starts.push(0);
        self.entries.clear();
    }

    /// Append a row scattered into the given columns
    pub fn push_row(&mut self, columns: &[usize], values: &[Scalar]) {
        debug_assert_eq!(columns.len(), values.len());
        for (&column, &value) in columns.iter().zip(values) {
            debug_assert!(column < self.columns);
            if value != 0.0 {
                self.entries.push((column, value));
            }
        }
        self.row_starts.push(self.entries.len());
    }

    pub fn rows(&self) -> usize {
        self.row_starts.len().saturating_sub(1)
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Stored non-zero entries
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    fn row(&self, row: usize) -> &[(usize, Scalar)] {
        &self.entries[self.row_starts[row]..self.row_starts[row + 1]]
    }

    /// `A x`
    pub fn mul(&self, x: &[Scalar]) -> VecN {
        let mut out = VecN::zeros(self.rows());
        self.mul_into(x, &mut out);
        out
    }

    /// `out = A x`
    pub fn mul_into(&self, x: &[Scalar], out: &mut [Scalar]) {
        debug_assert_eq!(x.len(), self.columns);
        debug_assert_eq!(out.len(), self.rows());
        for (row, out) in out.iter_mut().enumerate() {
            *out = self
                .row(row)
                .iter()
                .map(|&(column, value)| value * x[column])
                .sum();
        }
    }

    /// `Aᵀ y`
    pub fn mul_transpose(&self, y: &[Scalar]) -> VecN {
        let mut out = VecN::zeros(self.columns);
        self.mul_transpose_into(y, &mut out);
        out
    }

    /// `out = Aᵀ y`
    pub fn mul_transpose_into(&self, y: &[Scalar], out: &mut [Scalar]) {
        debug_assert_eq!(y.len(), self.rows());
        debug_assert_eq!(out.len(), self.columns);
        out.fill(0.0);
        for (row, &factor) in y.iter().enumerate() {
            for &(column, value) in self.row(row) {
                out[column] += value * factor;
            }
        }
    }
}
