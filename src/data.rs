//! Dense and sparse containers for training features and labels.
//!
//! Sparse storage is purely a memory optimization: every consumer densifies
//! one row at a time before doing numeric work, so results are identical to
//! the dense path for the same logical content.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimal CSR row matrix.
///
/// Rows are samples. Only the layout needed by this crate is implemented:
/// construction, per-row densification, and full densification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseRows {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseRows {
    /// Build from raw CSR parts.
    ///
    /// `indptr` must have `nrows + 1` entries, be non-decreasing, and end at
    /// `indices.len()`; every column index must be `< ncols`.
    pub fn new(
        nrows: usize,
        ncols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if indptr.len() != nrows + 1 || indptr.first() != Some(&0) {
            return Err(Error::Validation(format!(
                "sparse indptr must have {} entries starting at 0, got {}",
                nrows + 1,
                indptr.len()
            )));
        }
        if indptr.windows(2).any(|w| w[0] > w[1]) || *indptr.last().unwrap() != indices.len() {
            return Err(Error::Validation(
                "sparse indptr must be non-decreasing and end at the nnz count".to_string(),
            ));
        }
        if indices.len() != values.len() {
            return Err(Error::Validation(
                "sparse indices and values must have equal length".to_string(),
            ));
        }
        if indices.iter().any(|&c| c >= ncols) {
            return Err(Error::Validation(format!(
                "sparse column index out of bounds for {} columns",
                ncols
            )));
        }
        Ok(SparseRows {
            nrows,
            ncols,
            indptr,
            indices,
            values,
        })
    }

    /// Build from a dense matrix, keeping only non-zero entries.
    pub fn from_dense(dense: &Array2<f64>) -> Self {
        let (nrows, ncols) = dense.dim();
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);
        for row in dense.rows() {
            for (c, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    indices.push(c);
                    values.push(v);
                }
            }
            indptr.push(indices.len());
        }
        SparseRows {
            nrows,
            ncols,
            indptr,
            indices,
            values,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Densify a single row.
    pub fn row_dense(&self, row: usize) -> Array1<f64> {
        let mut out = Array1::zeros(self.ncols);
        for k in self.indptr[row]..self.indptr[row + 1] {
            out[self.indices[k]] = self.values[k];
        }
        out
    }

    /// Densify the whole matrix.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.nrows, self.ncols));
        for row in 0..self.nrows {
            for k in self.indptr[row]..self.indptr[row + 1] {
                out[(row, self.indices[k])] = self.values[k];
            }
        }
        out
    }
}

/// Feature matrix accepted by `fit`, `predict` and `score`.
#[derive(Debug, Clone)]
pub enum Features {
    Dense(Array2<f64>),
    Sparse(SparseRows),
}

impl Features {
    pub fn nrows(&self) -> usize {
        match self {
            Features::Dense(x) => x.nrows(),
            Features::Sparse(x) => x.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            Features::Dense(x) => x.ncols(),
            Features::Sparse(x) => x.ncols(),
        }
    }

    /// One sample as an owned dense vector.
    pub fn row(&self, i: usize) -> Array1<f64> {
        match self {
            Features::Dense(x) => x.row(i).to_owned(),
            Features::Sparse(x) => x.row_dense(i),
        }
    }
}

impl From<Array2<f64>> for Features {
    fn from(x: Array2<f64>) -> Self {
        Features::Dense(x)
    }
}

/// A single sample becomes a one-row matrix.
impl From<Array1<f64>> for Features {
    fn from(x: Array1<f64>) -> Self {
        let n = x.len();
        Features::Dense(x.into_shape((1, n)).expect("1-D reshape cannot fail"))
    }
}

impl From<SparseRows> for Features {
    fn from(x: SparseRows) -> Self {
        Features::Sparse(x)
    }
}

/// Raw labels accepted by `fit` and `score`, in any of the source
/// representations the encoder understands.
#[derive(Debug, Clone)]
pub enum Labels {
    /// Rank-1 numeric labels, one scalar per sample.
    Numeric(Array1<f64>),
    /// Categorical string labels, one per sample.
    Text(Vec<String>),
    /// Rank-2 labels, candidate pre-encoded one-hot rows.
    OneHot(Array2<f64>),
    /// Sparse rank-2 labels, densified row-wise before inspection.
    SparseOneHot(SparseRows),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Numeric(y) => y.len(),
            Labels::Text(y) => y.len(),
            Labels::OneHot(y) => y.nrows(),
            Labels::SparseOneHot(y) => y.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Array1<f64>> for Labels {
    fn from(y: Array1<f64>) -> Self {
        Labels::Numeric(y)
    }
}

impl From<Vec<f64>> for Labels {
    fn from(y: Vec<f64>) -> Self {
        Labels::Numeric(Array1::from_vec(y))
    }
}

impl From<Vec<String>> for Labels {
    fn from(y: Vec<String>) -> Self {
        Labels::Text(y)
    }
}

impl From<Vec<&str>> for Labels {
    fn from(y: Vec<&str>) -> Self {
        Labels::Text(y.into_iter().map(str::to_owned).collect())
    }
}

impl From<Array2<f64>> for Labels {
    fn from(y: Array2<f64>) -> Self {
        Labels::OneHot(y)
    }
}

impl From<SparseRows> for Labels {
    fn from(y: SparseRows) -> Self {
        Labels::SparseOneHot(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn sparse_round_trips_through_dense() {
        let dense = array![[0.0, 1.0, 0.0], [2.0, 0.0, 3.0]];
        let sparse = SparseRows::from_dense(&dense);
        assert_eq!(sparse.nrows(), 2);
        assert_eq!(sparse.ncols(), 3);
        assert_eq!(sparse.row_dense(1), array![2.0, 0.0, 3.0]);
        assert_eq!(sparse.to_dense(), dense);
    }

    #[test]
    fn sparse_rejects_bad_indptr() {
        let err = SparseRows::new(2, 2, vec![0, 1], vec![0], vec![1.0]);
        assert!(err.is_err());
    }

    #[test]
    fn single_sample_features_become_one_row() {
        let f = Features::from(array![0.5, 0.25]);
        assert_eq!(f.nrows(), 1);
        assert_eq!(f.row(0), array![0.5, 0.25]);
    }
}
