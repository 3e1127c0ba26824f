//! Moment matrix of the linear IV model.
//!
//! For coefficients β the moment function of observation i is
//!
//! ```text
//! gᵢ(β) = (yᵢ - xᵢᵀβ) · zᵢ
//! ```
//!
//! and row i of the n × r moment matrix `Gee` holds gᵢ(β)ᵀ.

use crate::error::{ElivError, ElivResult};
use nalgebra::DMatrix;

/// Build `Gee = diag(y - xβ) · z`.
///
/// Pure: identical inputs give bit-identical output.
pub fn build_moment_matrix(
    beta: &[f64],
    y: &[f64],
    x: &DMatrix<f64>,
    z: &DMatrix<f64>,
) -> ElivResult<DMatrix<f64>> {
    let n = y.len();
    if x.nrows() != n {
        return Err(ElivError::dims("rows of x", n, x.nrows()));
    }
    if z.nrows() != n {
        return Err(ElivError::dims("rows of z", n, z.nrows()));
    }
    if beta.len() != x.ncols() {
        return Err(ElivError::dims("beta", x.ncols(), beta.len()));
    }

    let mut resid = y.to_vec();
    for (j, col) in x.column_iter().enumerate() {
        let bj = beta[j];
        if bj == 0.0 {
            continue;
        }
        for (ri, &xij) in resid.iter_mut().zip(col.iter()) {
            *ri -= xij * bj;
        }
    }

    let mut gee = z.clone();
    for mut col in gee.column_iter_mut() {
        for (g, &ri) in col.iter_mut().zip(&resid) {
            *g *= ri;
        }
    }
    Ok(gee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_scaled_by_residual() {
        // n = 3, p = 1, r = 2
        let y = [1.0, 2.0, -1.0];
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 0.5, 2.0]);
        let z = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, -1.0, 0.0, 3.0, 1.0]);
        let gee = build_moment_matrix(&[2.0], &y, &x, &z).unwrap();

        // residuals: 1 - 2 = -1, 2 - 1 = 1, -1 - 4 = -5
        let expected = DMatrix::from_row_slice(3, 2, &[-1.0, -2.0, -1.0, 0.0, -15.0, -5.0]);
        assert_eq!(gee, expected);
    }

    #[test]
    fn test_bit_identical_on_repeat() {
        let y: Vec<f64> = (0..20).map(|i| (i as f64 * 0.37).sin()).collect();
        let x = DMatrix::from_fn(20, 2, |i, j| ((i + 3 * j) as f64 * 0.11).cos());
        let z = DMatrix::from_fn(20, 3, |i, j| ((2 * i + j) as f64 * 0.07).sin());
        let beta = [0.3, -1.7];

        let a = build_moment_matrix(&beta, &y, &x, &z).unwrap();
        let b = build_moment_matrix(&beta, &y, &x, &z).unwrap();
        assert!(a.iter().zip(b.iter()).all(|(u, v)| u.to_bits() == v.to_bits()));
    }

    #[test]
    fn test_dimension_checks() {
        let y = [1.0, 2.0];
        let x = DMatrix::from_element(2, 2, 1.0);
        let z = DMatrix::from_element(2, 2, 1.0);
        assert_eq!(
            build_moment_matrix(&[1.0], &y, &x, &z),
            Err(ElivError::DimensionMismatch { what: "beta", expected: 2, found: 1 })
        );

        let z_short = DMatrix::from_element(1, 2, 1.0);
        assert!(matches!(
            build_moment_matrix(&[1.0, 1.0], &y, &x, &z_short),
            Err(ElivError::DimensionMismatch { what: "rows of z", .. })
        ));
    }
}
