//! Dense kernels.
//!
//! Column-major loops over `DMatrix` storage writing into caller-owned
//! buffers, so the Newton loop allocates nothing per iteration.

use nalgebra::DMatrix;

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

#[inline]
pub fn norm2(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

#[inline]
pub fn norm1(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}

#[inline]
pub fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc: f64, &x| acc.max(x.abs()))
}

#[inline]
pub fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// out = A x
pub fn mul_into(a: &DMatrix<f64>, x: &[f64], out: &mut [f64]) {
    debug_assert_eq!(a.ncols(), x.len());
    debug_assert_eq!(a.nrows(), out.len());

    out.fill(0.0);
    for (col, &xj) in a.column_iter().zip(x) {
        if xj == 0.0 {
            continue;
        }
        for (o, &aij) in out.iter_mut().zip(col.iter()) {
            *o += aij * xj;
        }
    }
}

/// out = Aᵀ x
pub fn mul_tr_into(a: &DMatrix<f64>, x: &[f64], out: &mut [f64]) {
    debug_assert_eq!(a.nrows(), x.len());
    debug_assert_eq!(a.ncols(), out.len());

    for (o, col) in out.iter_mut().zip(a.column_iter()) {
        *o = col.iter().zip(x).map(|(aij, xi)| aij * xi).sum();
    }
}

/// out = diag(Aᵀ D A) for diagonal D
pub fn weighted_col_sq_into(a: &DMatrix<f64>, d: &[f64], out: &mut [f64]) {
    debug_assert_eq!(a.nrows(), d.len());
    debug_assert_eq!(a.ncols(), out.len());

    for (o, col) in out.iter_mut().zip(a.column_iter()) {
        *o = col.iter().zip(d).map(|(aij, di)| di * aij * aij).sum();
    }
}
