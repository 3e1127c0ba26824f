//! Stabilized logarithm.
//!
//! The calibration objective sums `log(1 + gᵢᵀλ)` over observations, but the
//! unconstrained Newton step can push `1 + gᵢᵀλ` to or below zero. The
//! stabilized logarithm replaces `log` below a threshold τ > 0 with its
//! second-order Taylor expansion around τ, so the objective, gradient, and
//! Hessian stay finite everywhere.
//!
//! # Definition
//!
//! ```text
//! log*(x) = log x                                   x ≥ τ
//!         = log τ - 1.5 + 2x/τ - 0.5 (x/τ)²         x < τ
//! ```
//!
//! # Derivatives
//!
//! - First: `1/x` above τ, `2/τ - x/τ²` below
//! - Second: `-1/x²` above τ, `-1/τ²` below
//!
//! All three pieces agree with the plain logarithm at x = τ. In this crate
//! τ = 1/n.

/// Stabilized logarithm with threshold τ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizedLog {
    thresh: f64,
    log_thresh: f64,
}

impl StabilizedLog {
    /// Create a stabilized logarithm with threshold `thresh` (must be > 0).
    pub fn new(thresh: f64) -> Self {
        assert!(thresh > 0.0, "StabilizedLog threshold must be positive");
        Self { thresh, log_thresh: thresh.ln() }
    }

    /// Threshold 1/n used for n observations.
    pub fn for_sample_size(n: usize) -> Self {
        Self::new(1.0 / n as f64)
    }

    /// Threshold τ.
    #[inline]
    pub fn thresh(&self) -> f64 {
        self.thresh
    }

    /// log*(x)
    #[inline]
    pub fn value(&self, x: f64) -> f64 {
        if x < self.thresh {
            let ratio = x / self.thresh;
            self.log_thresh - 1.5 + 2.0 * ratio - 0.5 * ratio * ratio
        } else {
            x.ln()
        }
    }

    /// d/dx log*(x)
    #[inline]
    pub fn first(&self, x: f64) -> f64 {
        if x < self.thresh {
            2.0 / self.thresh - x / (self.thresh * self.thresh)
        } else {
            1.0 / x
        }
    }

    /// d²/dx² log*(x)
    #[inline]
    pub fn second(&self, x: f64) -> f64 {
        if x < self.thresh {
            -1.0 / (self.thresh * self.thresh)
        } else {
            -1.0 / (x * x)
        }
    }

    /// Σᵢ log*(xᵢ)
    pub fn sum(&self, x: &[f64]) -> f64 {
        x.iter().map(|&xi| self.value(xi)).sum()
    }

    /// Element-wise log* into `out`.
    pub fn eval_into(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), out.len());
        for (o, &xi) in out.iter_mut().zip(x) {
            *o = self.value(xi);
        }
    }

    /// Element-wise first derivative into `out`.
    pub fn first_into(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), out.len());
        for (o, &xi) in out.iter_mut().zip(x) {
            *o = self.first(xi);
        }
    }

    /// Element-wise second derivative into `out`.
    pub fn second_into(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), out.len());
        for (o, &xi) in out.iter_mut().zip(x) {
            *o = self.second(xi);
        }
    }
}
