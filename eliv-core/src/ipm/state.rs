//! Primal iterate of the calibration IPM.
//!
//! The L1 term is lifted with slacks u ≥ |λ|, giving the inequality
//! constraints
//!
//! ```text
//! f = (λ - u, -λ - u) ≤ 0
//! ```
//!
//! which the log barrier keeps strictly negative.

/// Multiplier, slack and constraint values of the current iterate.
#[derive(Debug, Clone)]
pub struct IpmState {
    /// Tilting multiplier λ (length r)
    pub lambda: Vec<f64>,
    /// Slack u (length r)
    pub u: Vec<f64>,
    /// Constraint values f (length 2r)
    pub f: Vec<f64>,
}

impl IpmState {
    /// Standard starting point λ = 0.1, u = 1.
    pub fn initial(r: usize) -> Self {
        let lambda = vec![0.1; r];
        let u = vec![1.0; r];
        let mut f = vec![0.0; 2 * r];
        constraint_values(&lambda, &u, &mut f);
        Self { lambda, u, f }
    }

    /// All constraints strictly negative (u > |λ|).
    pub fn is_strictly_feasible(&self) -> bool {
        is_strictly_feasible(&self.f)
    }

    /// Log barrier `-Σ log(-f)`.
    pub fn barrier(&self) -> f64 {
        barrier(&self.f)
    }
}

/// f = (λ - u, -λ - u)
pub fn constraint_values(lambda: &[f64], u: &[f64], f: &mut [f64]) {
    let r = lambda.len();
    assert_eq!(u.len(), r);
    assert_eq!(f.len(), 2 * r);

    let (lo, hi) = f.split_at_mut(r);
    for i in 0..r {
        lo[i] = lambda[i] - u[i];
        hi[i] = -lambda[i] - u[i];
    }
}

/// NaN entries count as infeasible.
pub fn is_strictly_feasible(f: &[f64]) -> bool {
    f.iter().all(|&fi| fi < 0.0)
}

pub fn barrier(f: &[f64]) -> f64 {
    -f.iter().map(|&fi| (-fi).ln()).sum::<f64>()
}
