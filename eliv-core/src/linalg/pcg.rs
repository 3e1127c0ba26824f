//! Preconditioned conjugate gradients.
//!
//! Solves `H x = b` for a symmetric positive definite [`StructuredOperator`]
//! to relative tolerance `tol`, starting from the caller's `x`.
//!
//! # Termination
//!
//! | flag | code | meaning |
//! |------|------|---------|
//! | `Converged` | 0 | true residual ‖b - Hx‖ ≤ tol·‖b‖ |
//! | `MaxIterations` | 1 | iteration cap reached |
//! | `NonFinitePreconditioned` | 2 | P⁻¹r has a NaN/Inf entry |
//! | `Stagnated` | 3 | three consecutive negligible steps |
//! | `Truncated` | 3 | extra verification steps exhausted |
//! | `Breakdown` | 4 | ρ, pᵀHp, α or β zero or non-finite |
//!
//! Convergence is always confirmed against the recomputed residual, since the
//! recursive residual drifts in floating point. On any other exit the best
//! iterate seen so far is returned if its residual is no worse than the last
//! iterate's.

use super::dense::{all_finite, dot, norm2};
use super::operator::StructuredOperator;
use serde::{Deserialize, Serialize};

/// Consecutive negligible steps before declaring stagnation.
const MAX_STAG_STEPS: usize = 3;

/// Upper bound on verification steps after the recursive residual converged.
const MAX_MORE_STEPS: usize = 5;

/// Relative step size below which an update counts as negligible.
const STAG_EPS: f64 = 2e-16;

/// PCG termination flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcgFlag {
    /// Converged to tolerance
    Converged,
    /// Iteration cap reached
    MaxIterations,
    /// Preconditioned residual not finite
    NonFinitePreconditioned,
    /// Negligible progress for several iterations
    Stagnated,
    /// Recursive residual converged but the true residual did not follow
    Truncated,
    /// Curvature or step ratio degenerate
    Breakdown,
}

impl PcgFlag {
    /// Numeric flag code (0 = converged).
    pub fn code(self) -> u8 {
        match self {
            PcgFlag::Converged => 0,
            PcgFlag::MaxIterations => 1,
            PcgFlag::NonFinitePreconditioned => 2,
            PcgFlag::Stagnated | PcgFlag::Truncated => 3,
            PcgFlag::Breakdown => 4,
        }
    }

    pub fn is_converged(self) -> bool {
        matches!(self, PcgFlag::Converged)
    }
}

/// Result of one PCG solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PcgOutcome {
    /// Termination flag
    pub flag: PcgFlag,
    /// Iteration at which the returned iterate was produced
    pub iters: usize,
    /// ‖b - Hx‖ / ‖b‖ of the returned iterate
    pub relres: f64,
}

/// Scratch vectors for [`solve_pcg`].
#[derive(Debug, Clone)]
pub struct PcgWorkspace {
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    q: Vec<f64>,
    xmin: Vec<f64>,
}

impl PcgWorkspace {
    pub fn new(dim: usize) -> Self {
        Self {
            r: vec![0.0; dim],
            z: vec![0.0; dim],
            p: vec![0.0; dim],
            q: vec![0.0; dim],
            xmin: vec![0.0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.r.len()
    }
}

/// Verification steps allowed once the recursive residual has converged:
/// `min(⌊n/50⌋, 5, n - maxit)`, zero for small systems.
pub fn more_steps_budget(n: usize, maxit: usize) -> usize {
    (n / 50).min(MAX_MORE_STEPS).min(n.saturating_sub(maxit))
}

/// r = b - H x, returns ‖r‖
fn true_residual<O: StructuredOperator + ?Sized>(
    op: &mut O,
    b: &[f64],
    x: &[f64],
    hx: &mut [f64],
    r: &mut [f64],
) -> f64 {
    op.apply(x, hx);
    for ((ri, bi), hi) in r.iter_mut().zip(b).zip(hx.iter()) {
        *ri = bi - hi;
    }
    norm2(r)
}

/// Solve `H x = b` in place, using `x` as the initial guess.
pub fn solve_pcg<O: StructuredOperator + ?Sized>(
    op: &mut O,
    b: &[f64],
    x: &mut [f64],
    tol: f64,
    maxit: usize,
    ws: &mut PcgWorkspace,
) -> PcgOutcome {
    let n = op.dim();
    assert_eq!(b.len(), n);
    assert_eq!(x.len(), n);
    assert_eq!(ws.dim(), n);

    let n2b = norm2(b);
    if n2b == 0.0 {
        x.fill(0.0);
        return PcgOutcome { flag: PcgFlag::Converged, iters: 0, relres: 0.0 };
    }

    let tolb = tol * n2b;
    let PcgWorkspace { r, z, p, q, xmin } = ws;

    let normr = true_residual(op, b, x, q, r);
    let mut normr_act = normr;
    if normr <= tolb {
        return PcgOutcome { flag: PcgFlag::Converged, iters: 0, relres: normr / n2b };
    }

    let mut normrmin = normr;
    xmin.copy_from_slice(x);
    let mut imin = 0;

    let mut stag = 0;
    let mut moresteps = 0;
    let maxmsteps = more_steps_budget(n, maxit);

    let mut rho = 1.0;
    let mut flag = PcgFlag::MaxIterations;
    let mut last_iter = maxit;

    for ii in 1..=maxit {
        op.precondition(r, z);
        if !all_finite(z) {
            flag = PcgFlag::NonFinitePreconditioned;
            last_iter = ii;
            break;
        }

        let rho1 = rho;
        rho = dot(r, z);
        if rho == 0.0 || !rho.is_finite() {
            flag = PcgFlag::Breakdown;
            last_iter = ii;
            break;
        }

        if ii == 1 {
            p.copy_from_slice(z);
        } else {
            let beta = rho / rho1;
            if beta == 0.0 || !beta.is_finite() {
                flag = PcgFlag::Breakdown;
                last_iter = ii;
                break;
            }
            for (pi, zi) in p.iter_mut().zip(z.iter()) {
                *pi = zi + beta * *pi;
            }
        }

        op.apply(p, q);
        let pq = dot(p, q);
        if pq <= 0.0 || !pq.is_finite() {
            flag = PcgFlag::Breakdown;
            last_iter = ii;
            break;
        }
        let alpha = rho / pq;
        if !alpha.is_finite() {
            flag = PcgFlag::Breakdown;
            last_iter = ii;
            break;
        }

        if norm2(p) * alpha.abs() < STAG_EPS * norm2(x) {
            stag += 1;
        } else {
            stag = 0;
        }

        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * q[i];
        }
        let normr = norm2(r);
        normr_act = normr;

        if normr <= tolb || stag >= MAX_STAG_STEPS || moresteps > 0 {
            normr_act = true_residual(op, b, x, q, r);
            if normr_act <= tolb {
                return PcgOutcome { flag: PcgFlag::Converged, iters: ii, relres: normr_act / n2b };
            }
            if stag >= MAX_STAG_STEPS && moresteps == 0 {
                stag = 0;
            }
            moresteps += 1;
            if moresteps >= maxmsteps {
                flag = PcgFlag::Truncated;
                last_iter = ii;
                break;
            }
        }

        if normr_act < normrmin {
            normrmin = normr_act;
            xmin.copy_from_slice(x);
            imin = ii;
        }

        if stag >= MAX_STAG_STEPS {
            flag = PcgFlag::Stagnated;
            last_iter = ii;
            break;
        }
    }

    // Minimum-residual fallback
    let normr_min = true_residual(op, b, xmin, q, r);
    if normr_min <= normr_act {
        x.copy_from_slice(xmin);
        PcgOutcome { flag, iters: imin, relres: normr_min / n2b }
    } else {
        PcgOutcome { flag, iters: last_iter, relres: normr_act / n2b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::operator::BlockArrowSystem;
    use nalgebra::DMatrix;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Diagonal operator with an explicit preconditioner diagonal.
    struct DiagOp {
        h: Vec<f64>,
        pinv: Vec<f64>,
    }

    impl StructuredOperator for DiagOp {
        fn dim(&self) -> usize {
            self.h.len()
        }
        fn apply(&mut self, x: &[f64], out: &mut [f64]) {
            for i in 0..x.len() {
                out[i] = self.h[i] * x[i];
            }
        }
        fn precondition(&mut self, r: &[f64], out: &mut [f64]) {
            for i in 0..r.len() {
                out[i] = self.pinv[i] * r[i];
            }
        }
    }

    fn random_system(rng: &mut ChaCha8Rng, n: usize, r: usize) -> (DMatrix<f64>, BlockArrowSystem) {
        let gee = DMatrix::from_fn(n, r, |_, _| rng.gen_range(-1.0..1.0));
        let mut sys = BlockArrowSystem::new(n, r);
        for d in sys.d0.iter_mut() {
            *d = rng.gen_range(0.5..1.5);
        }
        for i in 0..r {
            sys.d1[i] = rng.gen_range(1.0..2.0);
            sys.d2[i] = sys.d1[i] * rng.gen_range(-0.5..0.5);
        }
        sys.update_preconditioner(&vec![4.0; r]);
        (gee, sys)
    }

    #[test]
    fn test_zero_rhs() {
        let mut op = DiagOp { h: vec![1.0, 2.0], pinv: vec![1.0, 0.5] };
        let mut ws = PcgWorkspace::new(2);
        let mut x = vec![3.0, -1.0];
        let out = solve_pcg(&mut op, &[0.0, 0.0], &mut x, 1e-8, 10, &mut ws);
        assert_eq!(out.flag, PcgFlag::Converged);
        assert_eq!(out.iters, 0);
        assert_eq!(x, vec![0.0, 0.0]);
    }

    #[test]
    fn test_recovers_known_solution() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        for &(n, r) in &[(50, 2), (80, 4), (200, 6)] {
            let (gee, mut sys) = random_system(&mut rng, n, r);
            let mut op = sys.operator(&gee);

            let x_true: Vec<f64> = (0..2 * r).map(|_| rng.gen_range(-2.0..2.0)).collect();
            let mut b = vec![0.0; 2 * r];
            op.apply(&x_true, &mut b);

            let mut x = vec![0.0; 2 * r];
            let mut ws = PcgWorkspace::new(2 * r);
            let out = solve_pcg(&mut op, &b, &mut x, 1e-10, 200, &mut ws);

            assert_eq!(out.flag, PcgFlag::Converged, "n={} r={}: {:?}", n, r, out);
            assert!(out.relres <= 1e-10);
            let err: f64 = x.iter().zip(&x_true).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt();
            assert!(err < 1e-6, "n={} r={}: error {}", n, r, err);
        }
    }

    #[test]
    fn test_warm_start_at_solution() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (gee, mut sys) = random_system(&mut rng, 30, 3);
        let mut op = sys.operator(&gee);

        let x_true = vec![1.0, -1.0, 0.5, 0.25, 2.0, -0.75];
        let mut b = vec![0.0; 6];
        op.apply(&x_true, &mut b);

        let mut x = x_true.clone();
        let mut ws = PcgWorkspace::new(6);
        let out = solve_pcg(&mut op, &b, &mut x, 1e-8, 50, &mut ws);
        assert_eq!(out.flag, PcgFlag::Converged);
        assert_eq!(out.iters, 0);
        assert_eq!(x, x_true);
    }

    #[test]
    fn test_indefinite_operator_breaks_down() {
        let mut op = DiagOp { h: vec![-1.0, -2.0], pinv: vec![1.0, 1.0] };
        let mut ws = PcgWorkspace::new(2);
        let mut x = vec![0.0, 0.0];
        let out = solve_pcg(&mut op, &[1.0, 1.0], &mut x, 1e-8, 10, &mut ws);
        assert_eq!(out.flag, PcgFlag::Breakdown);
        assert_eq!(out.flag.code(), 4);
        // Nothing better than the initial guess was produced.
        assert_eq!(x, vec![0.0, 0.0]);
        assert!((out.relres - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_nonfinite_preconditioner() {
        let mut op = DiagOp { h: vec![1.0, 1.0], pinv: vec![f64::INFINITY, 1.0] };
        let mut ws = PcgWorkspace::new(2);
        let mut x = vec![0.0, 0.0];
        let out = solve_pcg(&mut op, &[1.0, 1.0], &mut x, 1e-8, 10, &mut ws);
        assert_eq!(out.flag, PcgFlag::NonFinitePreconditioned);
        assert_eq!(out.flag.code(), 2);
    }

    #[test]
    fn test_more_steps_budget() {
        // 2r = 4: no verification steps
        assert_eq!(more_steps_budget(4, 200), 0);
        assert_eq!(more_steps_budget(4, 2), 0);
        assert_eq!(more_steps_budget(200, 50), 4);
        assert_eq!(more_steps_budget(1000, 200), 5);
        assert_eq!(more_steps_budget(300, 298), 2);
    }

    #[test]
    fn test_cancelled_warm_start_is_truncated() {
        // The huge warm start swallows b in r₀ = b - Hx₀, so the recursive
        // residual reaches zero while the true residual is still ‖b‖.
        let mut op = DiagOp { h: vec![1.0; 4], pinv: vec![1.0; 4] };
        let mut ws = PcgWorkspace::new(4);
        let b = [1.0, 0.0, 0.0, 0.0];
        let mut x = vec![1e20, 0.0, 0.0, 0.0];
        let out = solve_pcg(&mut op, &b, &mut x, 1e-12, 200, &mut ws);

        assert_eq!(out.flag, PcgFlag::Truncated);
        assert_eq!(out.flag.code(), 3);
        assert!(!out.flag.is_converged());
        assert_eq!(out.iters, 1);
        // The last iterate beats the warm start and is kept.
        assert_eq!(x, vec![0.0; 4]);
        assert!((out.relres - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_iteration_cap_keeps_best_iterate() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let (gee, mut sys) = random_system(&mut rng, 100, 8);
        let mut op = sys.operator(&gee);

        let b: Vec<f64> = (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut x = vec![0.0; 16];
        let mut ws = PcgWorkspace::new(16);
        let out = solve_pcg(&mut op, &b, &mut x, 1e-14, 2, &mut ws);

        assert_eq!(out.flag, PcgFlag::MaxIterations);
        assert_eq!(out.flag.code(), 1);
        // Never worse than the starting point.
        assert!(out.relres <= 1.0);

        let mut hx = vec![0.0; 16];
        op.apply(&x, &mut hx);
        let res: f64 = b.iter().zip(&hx).map(|(bi, hi)| (bi - hi).powi(2)).sum::<f64>().sqrt();
        let nb: f64 = b.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((res / nb - out.relres).abs() < 1e-12);
    }
}
