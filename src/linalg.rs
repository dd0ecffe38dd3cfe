//! Dense linear-algebra helpers on top of `nalgebra`.
//!
//! The rest of the crate keeps its data in `ndarray` arrays; the eigen
//! solver, Cholesky solve and pseudo-inverse come from `nalgebra`. These
//! functions convert at the boundary and fix the ordering conventions the
//! CSP fit relies on.
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::error::{BciError, BciResult};

/// Eigen-decomposition of a symmetric matrix, eigenvalues in descending order.
#[derive(Debug, Clone)]
pub struct SortedEigen {
    /// Eigenvalues, largest first.
    pub values: Vec<f64>,
    /// Eigenvectors as columns, `vectors.column(i)` belongs to `values[i]`.
    pub vectors: Array2<f64>,
}

impl SortedEigen {
    pub fn largest(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn smallest(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }
}

pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (r, c) = a.dim();
    DMatrix::from_fn(r, c, |i, j| a[[i, j]])
}

pub fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Symmetric eigen-decomposition sorted by eigenvalue, descending.
///
/// The input is symmetrised as `(A + Aᵗ) / 2` first. The sort is stable, so
/// equal eigenvalues keep the solver's original order and identical input
/// always produces identical output.
pub fn symmetric_eigen_desc(a: &Array2<f64>) -> SortedEigen {
    let m = to_dmatrix(a);
    let sym = (&m + m.transpose()) * 0.5;
    let eig = sym.symmetric_eigen();

    let n = eig.eigenvalues.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[j].total_cmp(&eig.eigenvalues[i]));

    let values = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    let vectors = Array2::from_shape_fn((eig.eigenvectors.nrows(), n), |(r, c)| {
        eig.eigenvectors[(r, order[c])]
    });
    SortedEigen { values, vectors }
}

/// Solve `A x = b` for symmetric positive-definite `A` via Cholesky.
pub fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> BciResult<Array1<f64>> {
    let chol = to_dmatrix(a).cholesky().ok_or_else(|| BciError::DegenerateCovariance {
        reason: "matrix is not positive definite".into(),
    })?;
    let x = chol.solve(&DVector::from_iterator(b.len(), b.iter().copied()));
    Ok(Array1::from_iter(x.iter().copied()))
}

/// Moore–Penrose pseudo-inverse.
pub fn pinv(a: &Array2<f64>) -> BciResult<Array2<f64>> {
    let m = to_dmatrix(a);
    let inv = m
        .pseudo_inverse(1e-12)
        .map_err(|e| BciError::DegenerateCovariance { reason: e.to_string() })?;
    Ok(from_dmatrix(&inv))
}

pub fn trace(a: &Array2<f64>) -> f64 {
    a.diag().sum()
}
