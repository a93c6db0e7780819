//! Row-compressed Jacobian storage.

use nalgebra::{DMatrix, DVector};
use rigba_core::Real;

/// Jacobian in compressed sparse row form. Only structurally non-zero entries
/// are stored; column indices within a row are ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseJacobian {
    n_cols: usize,
    row_offsets: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<Real>,
}

impl SparseJacobian {
    pub fn new(n_cols: usize) -> Self {
        Self::with_capacity(n_cols, 0, 0)
    }

    pub fn with_capacity(n_cols: usize, n_rows: usize, nnz: usize) -> Self {
        let mut row_offsets = Vec::with_capacity(n_rows + 1);
        row_offsets.push(0);
        Self {
            n_cols,
            row_offsets,
            cols: Vec::with_capacity(nnz),
            values: Vec::with_capacity(nnz),
        }
    }

    /// Append a row. Columns must be ascending and below `ncols()`.
    pub fn push_row<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (usize, Real)>,
    {
        for (col, value) in entries {
            debug_assert!(col < self.n_cols, "column {col} out of range");
            debug_assert!(
                self.cols.len() == self.row_start() || self.cols.last() < Some(&col),
                "columns must be ascending within a row"
            );
            self.cols.push(col);
            self.values.push(value);
        }
        self.row_offsets.push(self.cols.len());
    }

    fn row_start(&self) -> usize {
        self.row_offsets.last().copied().unwrap_or(0)
    }

    /// Copy of a dense matrix keeping every non-zero entry.
    pub fn from_dense(m: &DMatrix<Real>) -> Self {
        let mut j = Self::with_capacity(m.ncols(), m.nrows(), 0);
        for row in m.row_iter() {
            j.push_row(
                row.iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(c, v)| (c, *v)),
            );
        }
        j
    }

    pub fn nrows(&self) -> usize {
        self.row_offsets.len() - 1
    }

    pub fn ncols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of `row`.
    pub fn row(&self, row: usize) -> (&[usize], &[Real]) {
        let span = self.row_offsets[row]..self.row_offsets[row + 1];
        (&self.cols[span.clone()], &self.values[span])
    }

    pub fn get(&self, row: usize, col: usize) -> Real {
        let (cols, values) = self.row(row);
        cols.binary_search(&col).map_or(0.0, |k| values[k])
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Multiply every row by its scale.
    pub fn scale_rows(&mut self, scales: &DVector<Real>) {
        debug_assert_eq!(scales.len(), self.nrows());
        for (row, s) in scales.iter().enumerate() {
            if *s == 1.0 {
                continue;
            }
            let span = self.row_offsets[row]..self.row_offsets[row + 1];
            for v in &mut self.values[span] {
                *v *= s;
            }
        }
    }

    /// Zero the stored entries of every column flagged in `mask`.
    pub fn zero_columns(&mut self, mask: &[bool]) {
        debug_assert_eq!(mask.len(), self.n_cols);
        for (col, v) in self.cols.iter().zip(self.values.iter_mut()) {
            if mask[*col] {
                *v = 0.0;
            }
        }
    }

    /// `Jᵀ r`.
    pub fn tr_mul(&self, r: &DVector<Real>) -> DVector<Real> {
        debug_assert_eq!(r.len(), self.nrows());
        let mut out = DVector::zeros(self.n_cols);
        for (row, ri) in r.iter().enumerate() {
            let (cols, values) = self.row(row);
            for (c, v) in cols.iter().zip(values) {
                out[*c] += v * ri;
            }
        }
        out
    }

    pub fn to_dense(&self) -> DMatrix<Real> {
        let mut m = DMatrix::zeros(self.nrows(), self.n_cols);
        for row in 0..self.nrows() {
            let (cols, values) = self.row(row);
            for (c, v) in cols.iter().zip(values) {
                m[(row, *c)] = *v;
            }
        }
        m
    }
}
