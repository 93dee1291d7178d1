//! Compressed sparse row storage for rating rows
//!
//! Most titles share few raters, so the dense title-by-user matrix is mostly
//! zeros. Rows keep only their non-zero cells, sorted by column.

use book_recommender_core::{RecommenderError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    /// Row `i` occupies `indices[indptr[i]..indptr[i + 1]]`
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f32>,
    ncols: usize,
}

/// Borrowed sparse row
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    pub indices: &'a [usize],
    pub values: &'a [f32],
}

impl CsrMatrix {
    /// Compress a dense matrix, dropping zero cells
    pub fn from_dense(dense: ArrayView2<'_, f32>) -> Self {
        let mut indptr = Vec::with_capacity(dense.nrows() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);

        for row in dense.rows() {
            for (col, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    indices.push(col);
                    data.push(value);
                }
            }
            indptr.push(indices.len());
        }

        Self {
            indptr,
            indices,
            data,
            ncols: dense.ncols(),
        }
    }

    /// Compress row vectors, rejecting ragged input
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let ncols = rows.first().map(Vec::len).unwrap_or(0);

        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);

        for (i, row) in rows.iter().enumerate() {
            if row.len() != ncols {
                return Err(RecommenderError::invalid_matrix(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    ncols
                )));
            }
            for (col, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    indices.push(col);
                    data.push(value);
                }
            }
            indptr.push(indices.len());
        }

        Ok(Self {
            indptr,
            indices,
            data,
            ncols,
        })
    }

    pub fn nrows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored (non-zero) cells
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn row(&self, i: usize) -> SparseRow<'_> {
        let range = self.indptr[i]..self.indptr[i + 1];
        SparseRow {
            indices: &self.indices[range.clone()],
            values: &self.data[range],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = SparseRow<'_>> {
        (0..self.nrows()).map(move |i| self.row(i))
    }

    /// Check structural invariants; used after deserialization
    pub fn check(&self) -> Result<()> {
        if self.indptr.first() != Some(&0) {
            return Err(RecommenderError::invalid_matrix("row pointer must start at 0"));
        }
        if self.indices.len() != self.data.len()
            || self.indptr.last() != Some(&self.indices.len())
        {
            return Err(RecommenderError::invalid_matrix(
                "row pointer does not match stored cells",
            ));
        }
        for i in 0..self.nrows() {
            if self.indptr[i] > self.indptr[i + 1] {
                return Err(RecommenderError::invalid_matrix(format!(
                    "row pointer decreases at row {}",
                    i
                )));
            }
            let row = self.row(i);
            if row.indices.windows(2).any(|w| w[0] >= w[1])
                || row.indices.last().is_some_and(|&c| c >= self.ncols)
            {
                return Err(RecommenderError::invalid_matrix(format!(
                    "row {} has unsorted or out-of-range columns",
                    i
                )));
            }
        }
        Ok(())
    }
}

impl<'a> SparseRow<'a> {
    /// Visit every column where either row is non-zero, in column order
    pub fn merge_with(&self, other: &SparseRow<'_>, mut visit: impl FnMut(f32, f32)) {
        let (mut i, mut j) = (0, 0);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => {
                    visit(self.values[i], 0.0);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    visit(0.0, other.values[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    visit(self.values[i], other.values[j]);
                    i += 1;
                    j += 1;
                }
            }
        }
        for &value in &self.values[i..] {
            visit(value, 0.0);
        }
        for &value in &other.values[j..] {
            visit(0.0, value);
        }
    }

    pub fn dot(&self, other: &SparseRow<'_>) -> f32 {
        let mut sum = 0.0;
        self.merge_with(other, |a, b| sum += a * b);
        sum
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_dense_drops_zeros() {
        let dense = array![[1.0, 0.0, 2.0], [0.0, 0.0, 0.0], [0.0, 3.0, 0.0]];
        let csr = CsrMatrix::from_dense(dense.view());

        assert_eq!(csr.nrows(), 3);
        assert_eq!(csr.ncols(), 3);
        assert_eq!(csr.nnz(), 3);
        assert_eq!(csr.row(0).indices, &[0, 2]);
        assert_eq!(csr.row(0).values, &[1.0, 2.0]);
        assert!(csr.row(1).indices.is_empty());
        assert_eq!(csr.row(2).indices, &[1]);
        assert!(csr.check().is_ok());
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let err = CsrMatrix::from_rows(&rows).unwrap_err();
        assert!(matches!(err, RecommenderError::InvalidMatrix { .. }));
    }

    #[test]
    fn test_merge_visits_union_of_columns() {
        let csr = CsrMatrix::from_rows(&[vec![1.0, 0.0, 2.0, 0.0], vec![0.0, 4.0, 5.0, 0.0]])
            .unwrap();
        let (a, b) = (csr.row(0), csr.row(1));

        let mut pairs = Vec::new();
        a.merge_with(&b, |x, y| pairs.push((x, y)));

        assert_eq!(pairs, vec![(1.0, 0.0), (0.0, 4.0), (2.0, 5.0)]);
        assert_eq!(a.dot(&b), 10.0);
        assert!((a.norm() - 5.0_f32.sqrt()).abs() < 1e-6);
    }
}
