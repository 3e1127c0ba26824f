//! Sampler energies.
//!
//! The potential of a coefficient vector β is the negative penalized
//! empirical log-likelihood at the calibrated multiplier λ(β),
//!
//! ```text
//! U(β) = n log n + Σᵢ log*(gᵢᵀλ + 1) - n ν ‖λ‖₁
//! ```
//!
//! plus, optionally, a spherical Gaussian prior term.

use crate::barrier::StabilizedLog;
use crate::linalg::dense::{mul_into, norm1};
use crate::problem::PriorSpec;
use nalgebra::DMatrix;

/// Dual energy `n log n + Σ log*(Gee λ + 1) - n ν ‖λ‖₁`.
pub fn dual_energy(lambda: &[f64], gee: &DMatrix<f64>, nu: f64) -> f64 {
    let n = gee.nrows();
    let nf = n as f64;
    let slog = StabilizedLog::for_sample_size(n);

    let mut z = vec![0.0; n];
    mul_into(gee, lambda, &mut z);
    let sum: f64 = z.iter().map(|&zi| slog.value(zi + 1.0)).sum();

    nf * nf.ln() + sum - nf * nu * norm1(lambda)
}

/// Gaussian prior energy `‖β - mean‖² / (2σ²)`.
pub fn prior_energy(beta: &[f64], mean: &[f64], sigma: f64) -> f64 {
    assert_eq!(beta.len(), mean.len());
    let sq: f64 = beta.iter().zip(mean).map(|(b, m)| (b - m) * (b - m)).sum();
    sq / (2.0 * sigma * sigma)
}

/// Potential U(β): dual energy plus the prior term, if any.
pub fn potential(beta: &[f64], lambda: &[f64], gee: &DMatrix<f64>, nu: f64, prior: &PriorSpec) -> f64 {
    let dual = dual_energy(lambda, gee, nu);
    match prior {
        PriorSpec::Flat => dual,
        PriorSpec::Gaussian { mean, sigma } => dual + prior_energy(beta, mean, *sigma),
    }
}
