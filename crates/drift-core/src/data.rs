//! Helpers for the row-major instance matrices every detector consumes
//!
//! Rows are instances, columns are features.

use crate::{Error, Result};
use nalgebra::DMatrix;

/// Build a matrix from a slice of rows
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != n_cols {
            return Err(Error::size_mismatch(
                n_cols,
                row.len(),
                &format!("row {i}"),
            ));
        }
    }
    Ok(DMatrix::from_fn(rows.len(), n_cols, |i, j| rows[i][j]))
}

/// Build a single-feature matrix from a slice of values
pub fn column_matrix(values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_column_slice(values.len(), 1, values)
}

/// Stack `a` on top of `b`
pub fn vstack(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if a.nrows() > 0 && b.nrows() > 0 && a.ncols() != b.ncols() {
        return Err(Error::size_mismatch(a.ncols(), b.ncols(), "column count"));
    }
    let n_cols = if a.nrows() > 0 { a.ncols() } else { b.ncols() };
    let n_a = a.nrows();
    Ok(DMatrix::from_fn(n_a + b.nrows(), n_cols, |i, j| {
        if i < n_a {
            a[(i, j)]
        } else {
            b[(i - n_a, j)]
        }
    }))
}

/// Place `b` to the right of `a`
pub fn hstack(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if a.nrows() != b.nrows() {
        return Err(Error::size_mismatch(a.nrows(), b.nrows(), "row count"));
    }
    let n_a = a.ncols();
    Ok(DMatrix::from_fn(a.nrows(), n_a + b.ncols(), |i, j| {
        if j < n_a {
            a[(i, j)]
        } else {
            b[(i, j - n_a)]
        }
    }))
}

/// Gather the given rows in order
pub fn select_rows(x: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), x.ncols(), |i, j| x[(rows[i], j)])
}

/// Submatrix on the given rows and columns
pub fn select_block(x: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols.len(), |i, j| x[(rows[i], cols[j])])
}

/// Extract a column as an owned vector
pub fn column_values(x: &DMatrix<f64>, col: usize) -> Vec<f64> {
    x.column(col).iter().copied().collect()
}

/// Reject matrices holding NaN or infinite values
pub fn ensure_finite(x: &DMatrix<f64>, context: &str) -> Result<()> {
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::non_finite(context));
    }
    Ok(())
}

/// Require at least `expected` rows
pub fn ensure_rows(x: &DMatrix<f64>, expected: usize) -> Result<()> {
    if x.nrows() < expected {
        return Err(Error::InsufficientData {
            expected,
            actual: x.nrows(),
        });
    }
    Ok(())
}

/// Convert a matrix into nested rows, the layout used in serialized results
pub fn to_rows(x: &DMatrix<f64>) -> Vec<Vec<f64>> {
    x.row_iter().map(|r| r.iter().copied().collect()).collect()
}
