//! Dense linear-algebra bridge between `ndarray` and `nalgebra`.
//!
//! Purpose
//! -------
//! The scheduling engine stores every matrix as an `ndarray::Array2<f64>`
//! but leans on `nalgebra` for the two operations `ndarray` does not ship
//! without a LAPACK backend: dense inversion and the matrix exponential.
//! This module owns the copies in both directions and the post-condition
//! checks that turn a silent numerical failure into a
//! [`ScheduleError::NumericalInstability`].
//!
//! Conventions
//! -----------
//! - Conversions copy element-wise; `nalgebra` is column-major, so loops
//!   walk columns in the outer position.
//! - Every checked routine verifies finiteness of its output. The inverse is
//!   additionally verified through the residual `‖A·A⁻¹ − I‖_max`.
use crate::scheduling::errors::{ScheduleError, ScheduleResult, Stage};
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

/// Largest accepted entry of `A·A⁻¹ − I` after a dense inversion.
pub const INVERSE_RESIDUAL_TOL: f64 = 1e-8;

/// Copy an `ndarray` matrix into a freshly allocated `DMatrix`.
pub fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    let mut out = DMatrix::<f64>::zeros(rows, cols);
    for j in 0..cols {
        for i in 0..rows {
            out[(i, j)] = a[[i, j]];
        }
    }
    out
}

/// Copy a `DMatrix` back into a row-major `ndarray` matrix.
pub fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Invert a square matrix densely and verify the result.
///
/// # Errors
/// `NumericalInstability { stage: Invert, .. }` when the matrix is not
/// square, when `nalgebra` reports it singular, when the inverse holds a
/// non-finite entry, or when the residual exceeds
/// [`INVERSE_RESIDUAL_TOL`].
pub fn checked_inverse(a: ArrayView2<f64>) -> ScheduleResult<Array2<f64>> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(ScheduleError::unstable(
            Stage::Invert,
            format!("cannot invert a non-square {rows}x{cols} matrix"),
        ));
    }
    let dense = to_dmatrix(a);
    let inverse = dense
        .clone()
        .try_inverse()
        .ok_or_else(|| ScheduleError::unstable(Stage::Invert, "matrix is singular"))?;
    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(ScheduleError::unstable(Stage::Invert, "inverse has non-finite entries"));
    }

    let residual = &dense * &inverse - DMatrix::<f64>::identity(rows, cols);
    let worst = residual.amax();
    if !(worst <= INVERSE_RESIDUAL_TOL) {
        return Err(ScheduleError::unstable(
            Stage::Invert,
            format!("inverse residual {worst:e} exceeds {INVERSE_RESIDUAL_TOL:e}"),
        ));
    }
    Ok(from_dmatrix(&inverse))
}

/// Matrix exponential `exp(A·t)` with a finiteness check.
///
/// # Errors
/// `NumericalInstability { stage: Evaluate, .. }` if `t` is not finite or
/// the exponential overflows.
pub fn checked_expm(a: ArrayView2<f64>, t: f64) -> ScheduleResult<Array2<f64>> {
    if !t.is_finite() {
        return Err(ScheduleError::unstable(
            Stage::Evaluate,
            format!("matrix exponential requested at non-finite time {t}"),
        ));
    }
    let scaled = to_dmatrix(a) * t;
    let exp = scaled.exp();
    if exp.iter().any(|v| !v.is_finite()) {
        return Err(ScheduleError::unstable(
            Stage::Evaluate,
            format!("matrix exponential overflowed at t = {t}"),
        ));
    }
    Ok(from_dmatrix(&exp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // Round-tripping through `DMatrix` must not transpose or perturb entries.
    fn conversions_preserve_layout() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let d = to_dmatrix(a.view());
        assert_eq!(d[(0, 2)], 3.0);
        assert_eq!(d[(1, 0)], 4.0);
        assert_eq!(from_dmatrix(&d), a);
    }

    #[test]
    fn inverse_of_upper_triangular_generator_is_exact() {
        // Arrange
        let a = array![[-2.0, 2.0], [0.0, -2.0]];

        // Act
        let inv = checked_inverse(a.view()).unwrap();

        // Assert
        let expected = array![[-0.5, -0.5], [0.0, -0.5]];
        for (x, y) in inv.iter().zip(expected.iter()) {
            assert!((x - y).abs() < 1e-14);
        }
    }

    #[test]
    fn singular_matrix_is_reported_at_invert_stage() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let err = checked_inverse(a.view()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Invert));
    }

    #[test]
    fn expm_matches_scalar_exponential_on_diagonal() {
        let a = array![[-1.0, 0.0], [0.0, -3.0]];
        let e = checked_expm(a.view(), 0.5).unwrap();
        assert!((e[[0, 0]] - (-0.5f64).exp()).abs() < 1e-12);
        assert!((e[[1, 1]] - (-1.5f64).exp()).abs() < 1e-12);
        assert!(e[[0, 1]].abs() < 1e-15);
    }

    #[test]
    fn expm_rejects_non_finite_time() {
        let a = array![[-1.0]];
        assert!(matches!(
            checked_expm(a.view(), f64::INFINITY),
            Err(ScheduleError::NumericalInstability { stage: Stage::Evaluate, .. })
        ));
    }
}
