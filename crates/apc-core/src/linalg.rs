// =============================================================================
// Dense Linear Algebra
// =============================================================================
//
// Storage throughout the crate is ndarray; factorizations come from nalgebra.
// This module is the only place the two meet:
//
//   - conversions ndarray ↔ nalgebra
//   - the weighted normal equations X'WX β = X'Wz solved by Cholesky
//   - the column rank of a design matrix from its singular values
//
// No pseudo-inverses: a design that is not of full column rank is an error
// for the caller to report, never something to paper over.
//
// =============================================================================

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::constants::RANK_TOLERANCE;

// =============================================================================
// Conversions
// =============================================================================

/// ndarray matrix → nalgebra matrix (copies, any memory layout).
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = a.dim();
    DMatrix::from_fn(nrows, ncols, |i, j| a[[i, j]])
}

pub fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    let (nrows, ncols) = m.shape();
    Array2::from_shape_fn((nrows, ncols), |(i, j)| m[(i, j)])
}

pub fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    v.iter().copied().collect()
}

// =============================================================================
// Weighted least squares
// =============================================================================

/// X'WX and X'Wz for diagonal W = diag(w).
///
/// Rows are scaled by √wᵢ first, so the products are plain Gram matrices.
pub fn weighted_normal_equations(
    x: &Array2<f64>,
    z: &Array1<f64>,
    w: &Array1<f64>,
) -> (DMatrix<f64>, DVector<f64>) {
    let (n, p) = x.dim();
    let sqrt_w = w.mapv(f64::sqrt);

    let x_w = DMatrix::from_fn(n, p, |i, j| x[[i, j]] * sqrt_w[i]);
    let z_w = to_dvector(&(z * &sqrt_w));

    let x_w_t = x_w.transpose();
    (&x_w_t * &x_w, &x_w_t * z_w)
}

/// Weighted Gram matrix X'WX alone (for the covariance at the converged μ).
pub fn weighted_gram(x: &Array2<f64>, w: &Array1<f64>) -> DMatrix<f64> {
    let (n, p) = x.dim();
    let x_w = DMatrix::from_fn(n, p, |i, j| x[[i, j]] * w[i].sqrt());
    x_w.transpose() * &x_w
}

/// Solve the symmetric positive-definite system A β = b and return (β, A⁻¹).
///
/// `None` when the Cholesky factorization fails, i.e. A is not positive
/// definite to working precision.
pub fn cholesky_solve_and_invert(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
) -> Option<(Array1<f64>, Array2<f64>)> {
    let chol = a.clone().cholesky()?;
    let beta = chol.solve(b);
    let inverse = chol.inverse();
    if beta.iter().chain(inverse.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    Some((to_array1(&beta), to_array2(&inverse)))
}

/// Inverse of a symmetric positive-definite matrix via Cholesky.
pub fn cholesky_inverse(a: &DMatrix<f64>) -> Option<Array2<f64>> {
    let inverse = a.clone().cholesky()?.inverse();
    inverse
        .iter()
        .all(|v| v.is_finite())
        .then(|| to_array2(&inverse))
}

// =============================================================================
// Rank
// =============================================================================

/// Column rank of `x`: singular values above `RANK_TOLERANCE · σ_max`.
pub fn column_rank(x: &Array2<f64>) -> usize {
    if x.is_empty() {
        return 0;
    }
    let singular_values = to_dmatrix(x).singular_values();
    let s_max = singular_values.iter().copied().fold(0.0_f64, f64::max);
    if s_max <= 0.0 {
        return 0;
    }
    singular_values
        .iter()
        .filter(|&&s| s > RANK_TOLERANCE * s_max)
        .count()
}

// =============================================================================
// Tests
// =============================================================================
