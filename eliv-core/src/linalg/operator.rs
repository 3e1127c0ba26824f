//! Structured Newton operator.
//!
//! The Newton system of the calibration IPM is 2r × 2r with block-arrow
//! structure:
//!
//! ```text
//! H = [ Geeᵀ D0 Gee + D1    D2 ]
//!     [ D2                  D1 ]
//! ```
//!
//! with D0 (n × n) and D1, D2 (r × r) diagonal. Products with H cost
//! O(n·r) and never materialize `Geeᵀ D0 Gee`.
//!
//! # Preconditioner
//!
//! Replacing `Geeᵀ D0 Gee` by a diagonal proxy `d` decouples H into r
//! independent 2 × 2 blocks
//!
//! ```text
//! [ dᵢ + D1ᵢ   D2ᵢ ]
//! [ D2ᵢ        D1ᵢ ]
//! ```
//!
//! which are inverted in closed form. The proxy ignores the coupling through
//! Gee; application is O(r).

use super::dense::{mul_into, mul_tr_into};
use nalgebra::DMatrix;

/// Linear operator interface for the PCG solver.
///
/// Implementations must represent a symmetric positive definite matrix and a
/// symmetric positive definite approximation of its inverse.
pub trait StructuredOperator {
    /// Dimension of the square operator.
    fn dim(&self) -> usize;

    /// out = H x
    fn apply(&mut self, x: &[f64], out: &mut [f64]);

    /// out = P⁻¹ r
    fn precondition(&mut self, r: &[f64], out: &mut [f64]);
}

/// Diagonal blocks and preconditioner coefficients of the Newton matrix.
///
/// Owned by one IPM invocation and rebuilt every Newton iteration.
#[derive(Debug, Clone)]
pub struct BlockArrowSystem {
    /// Observation weights (length n)
    pub d0: Vec<f64>,
    /// Diagonal of the (1,1) and (2,2) slack blocks (length r)
    pub d1: Vec<f64>,
    /// Off-diagonal slack block (length r)
    pub d2: Vec<f64>,

    // Closed-form 2×2 inverse: [p1 -p2; -p2 p3]
    p1: Vec<f64>,
    p2: Vec<f64>,
    p3: Vec<f64>,

    // Gee x1 (length n)
    gx: Vec<f64>,
}

impl BlockArrowSystem {
    /// Allocate for n observations and r instruments.
    pub fn new(n: usize, r: usize) -> Self {
        Self {
            d0: vec![0.0; n],
            d1: vec![0.0; r],
            d2: vec![0.0; r],
            p1: vec![0.0; r],
            p2: vec![0.0; r],
            p3: vec![0.0; r],
            gx: vec![0.0; n],
        }
    }

    /// Number of observations n.
    #[inline]
    pub fn num_obs(&self) -> usize {
        self.d0.len()
    }

    /// Half-dimension r.
    #[inline]
    pub fn half_dim(&self) -> usize {
        self.d1.len()
    }

    /// Rebuild the block preconditioner from a diagonal proxy of `Geeᵀ D0 Gee`.
    ///
    /// Must be called after `d1`/`d2` change.
    pub fn update_preconditioner(&mut self, proxy: &[f64]) {
        assert_eq!(proxy.len(), self.half_dim());

        for i in 0..self.half_dim() {
            let prb = proxy[i] + self.d1[i];
            let prs = prb * self.d1[i] - self.d2[i] * self.d2[i];
            self.p1[i] = self.d1[i] / prs;
            self.p2[i] = self.d2[i] / prs;
            self.p3[i] = prb / prs;
        }
    }

    /// Bind to a moment matrix.
    pub fn operator<'a>(&'a mut self, gee: &'a DMatrix<f64>) -> BlockArrowOperator<'a> {
        assert_eq!(gee.nrows(), self.num_obs());
        assert_eq!(gee.ncols(), self.half_dim());
        BlockArrowOperator { gee, sys: self }
    }
}

/// Matrix-free view of the Newton matrix for one moment matrix.
pub struct BlockArrowOperator<'a> {
    gee: &'a DMatrix<f64>,
    sys: &'a mut BlockArrowSystem,
}

impl BlockArrowOperator<'_> {
    /// Materialize H as a dense 2r × 2r matrix.
    ///
    /// O(n·r²); intended for verification and small problems.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let r = self.sys.half_dim();
        let mut h = DMatrix::zeros(2 * r, 2 * r);

        for j in 0..r {
            for k in j..r {
                let gj = self.gee.column(j);
                let gk = self.gee.column(k);
                let v: f64 = gj
                    .iter()
                    .zip(gk.iter())
                    .zip(&self.sys.d0)
                    .map(|((a, b), d)| a * d * b)
                    .sum();
                h[(j, k)] = v;
                h[(k, j)] = v;
            }
        }
        for i in 0..r {
            h[(i, i)] += self.sys.d1[i];
            h[(i, r + i)] = self.sys.d2[i];
            h[(r + i, i)] = self.sys.d2[i];
            h[(r + i, r + i)] = self.sys.d1[i];
        }
        h
    }
}

impl StructuredOperator for BlockArrowOperator<'_> {
    fn dim(&self) -> usize {
        2 * self.sys.half_dim()
    }

    fn apply(&mut self, x: &[f64], out: &mut [f64]) {
        let r = self.sys.half_dim();
        assert_eq!(x.len(), 2 * r);
        assert_eq!(out.len(), 2 * r);

        let (x1, x2) = x.split_at(r);
        let (top, bottom) = out.split_at_mut(r);

        // top = Geeᵀ (D0 ∘ (Gee x1)) + D1 x1 + D2 x2
        mul_into(self.gee, x1, &mut self.sys.gx);
        for (g, d) in self.sys.gx.iter_mut().zip(&self.sys.d0) {
            *g *= d;
        }
        mul_tr_into(self.gee, &self.sys.gx, top);

        for i in 0..r {
            top[i] += self.sys.d1[i] * x1[i] + self.sys.d2[i] * x2[i];
            bottom[i] = self.sys.d2[i] * x1[i] + self.sys.d1[i] * x2[i];
        }
    }

    fn precondition(&mut self, rv: &[f64], out: &mut [f64]) {
        let r = self.sys.half_dim();
        assert_eq!(rv.len(), 2 * r);
        assert_eq!(out.len(), 2 * r);

        let (r1, r2) = rv.split_at(r);
        let (top, bottom) = out.split_at_mut(r);
        for i in 0..r {
            top[i] = self.sys.p1[i] * r1[i] - self.sys.p2[i] * r2[i];
            bottom[i] = -self.sys.p2[i] * r1[i] + self.sys.p3[i] * r2[i];
        }
    }
}
