//! Compressed-sparse-row matrices with named row and symmetric-entry access.
//!
//! Storage is an [`nalgebra_sparse::CsrMatrix`]; this wrapper exposes rows,
//! storage positions and transposed-entry lookup as named operations.

use crate::mesh_error::{MeshDdmError, check_len};
use nalgebra_sparse::{CooMatrix, CsrMatrix as NaCsr};

/// Square or rectangular CSR matrix with sorted, unique column indices per row.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    inner: NaCsr<f64>,
}

impl CsrMatrix {
    /// Assemble from `(row, col, value)` triplets. Duplicates are summed;
    /// explicit zeros are kept as structural entries.
    pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> Result<Self, MeshDdmError>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let (mut rows, mut cols, mut vals) = (Vec::new(), Vec::new(), Vec::new());
        for (row, col, v) in triplets {
            if row >= nrows || col >= ncols {
                return Err(MeshDdmError::SparseIndexOutOfRange {
                    row,
                    col,
                    nrows,
                    ncols,
                });
            }
            rows.push(row);
            cols.push(col);
            vals.push(v);
        }
        let coo = CooMatrix::try_from_triplets(nrows, ncols, rows, cols, vals)
            .map_err(|e| MeshDdmError::SparseFormat(e.to_string()))?;
        Ok(Self {
            inner: NaCsr::from(&coo),
        })
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Storage positions of row `i`.
    pub fn row_range(&self, i: usize) -> std::ops::Range<usize> {
        let offsets = self.inner.row_offsets();
        offsets[i]..offsets[i + 1]
    }

    pub fn row_cols(&self, i: usize) -> &[usize] {
        &self.inner.col_indices()[self.row_range(i)]
    }

    pub fn row_values(&self, i: usize) -> &[f64] {
        &self.inner.values()[self.row_range(i)]
    }

    /// `(col, value)` pairs of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.row_cols(i)
            .iter()
            .copied()
            .zip(self.row_values(i).iter().copied())
    }

    /// Column of the entry stored at position `k`.
    pub fn col_at(&self, k: usize) -> usize {
        self.inner.col_indices()[k]
    }

    pub fn values(&self) -> &[f64] {
        self.inner.values()
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        self.inner.values_mut()
    }

    /// Storage position of entry `(i, j)`, if structurally present.
    pub fn offset_of(&self, i: usize, j: usize) -> Option<usize> {
        if i >= self.nrows() {
            return None;
        }
        let start = self.row_range(i).start;
        self.row_cols(i).binary_search(&j).ok().map(|p| start + p)
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.offset_of(i, j).map(|k| self.values()[k])
    }

    /// For each stored entry `(i, j)`, the storage position of `(j, i)`.
    pub fn symmetric_map(&self) -> Result<Vec<usize>, MeshDdmError> {
        let mut smap = vec![0usize; self.nnz()];
        for row in 0..self.nrows() {
            for k in self.row_range(row) {
                let col = self.col_at(k);
                smap[k] = self
                    .offset_of(col, row)
                    .ok_or(MeshDdmError::MissingSymmetricEntry { row, col })?;
            }
        }
        Ok(smap)
    }

    /// Matrix with the same sparsity and the given values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self, MeshDdmError> {
        check_len("CsrMatrix::with_values", self.nnz(), values.len())?;
        let inner = NaCsr::try_from_pattern_and_values(self.inner.pattern().clone(), values)
            .map_err(|e| MeshDdmError::SparseFormat(e.to_string()))?;
        Ok(Self { inner })
    }

    /// `y = A x`.
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) -> Result<(), MeshDdmError> {
        y.fill(0.0);
        self.mul_add_vec(x, y)
    }

    /// `y += A x`.
    pub fn mul_add_vec(&self, x: &[f64], y: &mut [f64]) -> Result<(), MeshDdmError> {
        check_len("CsrMatrix operand", self.ncols(), x.len())?;
        check_len("CsrMatrix result", self.nrows(), y.len())?;
        for (i, yi) in y.iter_mut().enumerate() {
            *yi += self.row(i).map(|(j, a)| a * x[j]).sum::<f64>();
        }
        Ok(())
    }

    /// Row sums (the lumped diagonal of a mass matrix).
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.row_values(i).iter().sum()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CsrMatrix {
        CsrMatrix::from_triplets(
            3,
            3,
            [
                (0, 0, 2.0),
                (0, 1, -1.0),
                (1, 0, -1.0),
                (1, 1, 2.0),
                (1, 2, 0.0),
                (2, 1, -1.0),
                (2, 2, 1.0),
                (2, 2, 1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn duplicates_sum_and_zeros_stay() {
        let a = sample();
        assert_eq!(a.nnz(), 7);
        assert_eq!(a.get(2, 2), Some(2.0));
        assert_eq!(a.get(1, 2), Some(0.0));
        assert_eq!(a.get(0, 2), None);
        assert_eq!(a.row_cols(1), &[0, 1, 2]);
    }

    #[test]
    fn symmetric_map_points_at_transpose() {
        let a = sample();
        let smap = a.symmetric_map().unwrap();
        for i in 0..3 {
            for k in a.row_range(i) {
                let j = a.col_at(k);
                assert_eq!(a.offset_of(j, i), Some(smap[k]));
            }
        }
        let lopsided = CsrMatrix::from_triplets(2, 2, [(0, 1, 1.0)]).unwrap();
        assert!(matches!(
            lopsided.symmetric_map(),
            Err(MeshDdmError::MissingSymmetricEntry { row: 0, col: 1 })
        ));
    }

    #[test]
    fn products_and_row_sums() {
        let a = sample();
        let mut y = vec![0.0; 3];
        a.mul_vec(&[1.0, 1.0, 1.0], &mut y).unwrap();
        assert_eq!(y, vec![1.0, 1.0, 1.0]);
        a.mul_add_vec(&[1.0, 0.0, 0.0], &mut y).unwrap();
        assert_eq!(y, vec![3.0, 0.0, 1.0]);
        assert_eq!(a.row_sums(), vec![1.0, 1.0, 1.0]);
        assert!(a.mul_vec(&[1.0], &mut y).is_err());
    }

    #[test]
    fn out_of_range_triplet() {
        assert!(matches!(
            CsrMatrix::from_triplets(2, 2, [(2, 0, 1.0)]),
            Err(MeshDdmError::SparseIndexOutOfRange { .. })
        ));
    }
}
