//! Dense and sparse feature matrices.

use derive_more::From;
use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{CascadeError, CascadeResult};

/// Dense matrix backed by a two-dimensional array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
pub struct DenseMatrix(Array2<f64>);

impl DenseMatrix {
    /// Creates a matrix from row-major data.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> CascadeResult<Self> {
        let len = data.len();
        Array2::from_shape_vec((rows, cols), data)
            .map(Self)
            .map_err(|_| {
                CascadeError::MatrixShape(format!(
                    "{rows}x{cols} matrix needs {} values, got {len}",
                    rows * cols
                ))
            })
    }

    /// Creates a matrix from equally long rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> CascadeResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (index, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(CascadeError::MatrixShape(format!(
                    "row {index} has {} columns, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), cols, data)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.0.nrows()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.0.ncols()
    }

    /// Value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.0.get((row, col)).copied()
    }

    /// Borrows one row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.0.row(row)
    }

    /// Borrows the underlying array.
    pub fn as_array(&self) -> &Array2<f64> {
        &self.0
    }

    /// Copies the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> CascadeResult<Self> {
        if let Some(&row) = rows.iter().find(|&&row| row >= self.n_rows()) {
            return Err(out_of_range("row", row, self.n_rows()));
        }
        Ok(Self(self.0.select(Axis(0), rows)))
    }

    /// Permutes the values of one column in place.
    pub fn shuffle_column<R: Rng + ?Sized>(&mut self, col: usize, rng: &mut R) -> CascadeResult<()> {
        if col >= self.n_cols() {
            return Err(out_of_range("column", col, self.n_cols()));
        }
        let mut column = self.0.column_mut(col);
        let mut values = column.to_vec();
        values.shuffle(rng);
        for (slot, value) in column.iter_mut().zip(values) {
            *slot = value;
        }
        Ok(())
    }
}

/// Compressed sparse row matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {
    /// Creates a matrix from its compressed parts.
    pub fn new(
        rows: usize,
        cols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    ) -> CascadeResult<Self> {
        if indptr.len() != rows + 1 || indptr.first() != Some(&0) {
            return Err(CascadeError::MatrixShape(format!(
                "row pointer of a {rows}-row matrix must start at 0 and have {} entries",
                rows + 1
            )));
        }
        if indptr.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(CascadeError::MatrixShape(
                "row pointer must be non-decreasing".into(),
            ));
        }
        if indptr[rows] != indices.len() || indices.len() != data.len() {
            return Err(CascadeError::MatrixShape(format!(
                "row pointer ends at {}, but there are {} indices and {} values",
                indptr[rows],
                indices.len(),
                data.len()
            )));
        }
        if let Some(&col) = indices.iter().find(|&&col| col >= cols) {
            return Err(out_of_range("column", col, cols));
        }
        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
            data,
        })
    }

    /// Compresses a dense matrix, dropping zeros.
    pub fn from_dense(dense: &DenseMatrix) -> Self {
        let mut indptr = Vec::with_capacity(dense.n_rows() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in dense.0.rows() {
            for (col, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    indices.push(col);
                    data.push(value);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            rows: dense.n_rows(),
            cols: dense.n_cols(),
            indptr,
            indices,
            data,
        }
    }

    /// Expands to a dense matrix.
    pub fn to_dense(&self) -> DenseMatrix {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for row in 0..self.rows {
            for entry in self.indptr[row]..self.indptr[row + 1] {
                dense[[row, self.indices[entry]]] = self.data[entry];
            }
        }
        DenseMatrix(dense)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.cols
    }

    /// Number of stored values.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Copies the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> CascadeResult<Self> {
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for &row in rows {
            if row >= self.rows {
                return Err(out_of_range("row", row, self.rows));
            }
            let span = self.indptr[row]..self.indptr[row + 1];
            indices.extend_from_slice(&self.indices[span.clone()]);
            data.extend_from_slice(&self.data[span]);
            indptr.push(indices.len());
        }
        Ok(Self {
            rows: rows.len(),
            cols: self.cols,
            indptr,
            indices,
            data,
        })
    }
}

/// Feature matrix handed to a trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum FeatureMatrix {
    /// Dense two-dimensional array.
    Dense(DenseMatrix),
    /// Compressed sparse rows.
    Sparse(CsrMatrix),
}

impl FeatureMatrix {
    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        match self {
            Self::Dense(matrix) => matrix.n_rows(),
            Self::Sparse(matrix) => matrix.n_rows(),
        }
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        match self {
            Self::Dense(matrix) => matrix.n_cols(),
            Self::Sparse(matrix) => matrix.n_cols(),
        }
    }

    /// Whether the matrix is stored sparsely.
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Dense copy of the matrix.
    pub fn to_dense(&self) -> DenseMatrix {
        match self {
            Self::Dense(matrix) => matrix.clone(),
            Self::Sparse(matrix) => matrix.to_dense(),
        }
    }

    /// Copies the given rows, keeping the layout.
    pub fn select_rows(&self, rows: &[usize]) -> CascadeResult<Self> {
        Ok(match self {
            Self::Dense(matrix) => Self::Dense(matrix.select_rows(rows)?),
            Self::Sparse(matrix) => Self::Sparse(matrix.select_rows(rows)?),
        })
    }
}

fn out_of_range(what: &str, index: usize, len: usize) -> CascadeError {
    CascadeError::MatrixShape(format!("{what} {index} out of range for {len} {what}s"))
}
