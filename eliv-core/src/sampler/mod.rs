//! Random-walk Metropolis-Hastings over the IV coefficients.
//!
//! Each step proposes `β' = β + σ ξ` with ξ ~ N(0, I), calibrates λ(β') with
//! the interior point method and accepts with probability
//! `min(1, exp(U(β) - U(β')))`. Proposals outside the box `max|β'| ≤ B` are
//! rejected without a solve, and so are proposals whose calibration does not
//! converge. The starting point is not a proposal: it keeps its best-effort
//! calibration whatever the status, which is reported in the result.

pub mod chain;

use crate::error::{ElivError, ElivResult};
use crate::ipm::solve_calibration_weights;
use crate::objective::potential;
use crate::problem::{CalibrationResult, CalibrationStatus, ObservationSet, SamplerSettings};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

pub use chain::{posterior_summary, ChainState, PosteriorSummary};

/// Output of one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    /// Trailing-window mean and acceptance rate
    pub summary: PosteriorSummary,
    /// Starting point followed by the state after every step
    pub history: Vec<Vec<f64>>,
    /// State after the last step
    pub final_state: ChainState,
    /// Calibration status at the starting point
    pub initial_status: CalibrationStatus,
    /// Accepted proposals
    pub accepted: usize,
    /// Proposals rejected by the bound
    pub out_of_bound: usize,
    /// Proposals rejected because calibration did not converge
    pub unconverged: usize,
}

/// Random-walk step size `(3.5 + (n - 120)/80) / sqrt(n log r)`.
pub fn proposal_scale(n: usize, r: usize) -> f64 {
    let nf = n as f64;
    (3.5 + (nf - 120.0) / 80.0) / (nf * (r as f64).ln()).sqrt()
}

/// Acceptance probability `min(1, exp(U - U'))`, 0 when undefined.
pub fn acceptance_probability(current: f64, proposed: f64) -> f64 {
    let ratio = (current - proposed).exp();
    if ratio.is_nan() {
        0.0
    } else {
        ratio.min(1.0)
    }
}

/// `max|βᵢ| ≤ bound`
pub fn within_bound(beta: &[f64], bound: f64) -> bool {
    beta.iter().all(|b| b.abs() <= bound)
}

/// Calibrate λ(β) and evaluate the potential.
fn evaluate(
    beta: &[f64],
    data: &ObservationSet,
    settings: &SamplerSettings,
) -> ElivResult<(CalibrationResult, f64)> {
    let gee = data.moment_matrix(beta)?;
    let cal = solve_calibration_weights(&gee, settings.nu, &settings.calibration)?;
    let u = potential(beta, &cal.lambda, &gee, settings.nu, &settings.prior);
    Ok((cal, u))
}

/// Run a Metropolis-Hastings chain from `beta0`.
///
/// # Errors
///
/// - `DimensionMismatch` if `beta0` does not have one entry per covariate
/// - `InvalidSettings` for out-of-range settings
pub fn run_metropolis_chain<R: Rng>(
    beta0: &[f64],
    data: &ObservationSet,
    settings: &SamplerSettings,
    rng: &mut R,
) -> ElivResult<ChainResult> {
    let n = data.num_obs();
    let p = data.num_covariates();
    let r = data.num_instruments();
    if beta0.len() != p {
        return Err(ElivError::dims("beta0", p, beta0.len()));
    }
    settings.validate(p, r)?;

    let sig = proposal_scale(n, r);

    let (cal, u0) = evaluate(beta0, data, settings)?;
    let initial_status = cal.status;
    if !initial_status.is_solved() {
        log::warn!(
            "starting point calibration stopped with {} (gap {:.3e}), continuing from its last iterate",
            initial_status,
            cal.info.gap
        );
    }
    let mut current = ChainState { beta: beta0.to_vec(), potential: u0, lambda: cal.lambda };

    let mut history = Vec::with_capacity(settings.chain_length + 1);
    history.push(current.beta.clone());
    let mut accepted = 0;
    let mut out_of_bound = 0;
    let mut unconverged = 0;

    log::debug!(
        "chain: n={} p={} r={} sigma={:.4} steps={}",
        n,
        p,
        r,
        sig,
        settings.chain_length
    );

    for step in 0..settings.chain_length {
        let proposal: Vec<f64> = current
            .beta
            .iter()
            .map(|b| {
                let xi: f64 = StandardNormal.sample(&mut *rng);
                b + sig * xi
            })
            .collect();

        let mut candidate = None;
        let alpha = if within_bound(&proposal, settings.proposal_bound) {
            let (cal, u) = evaluate(&proposal, data, settings)?;
            if cal.status.is_solved() {
                let a = acceptance_probability(current.potential, u);
                candidate = Some((u, cal.lambda));
                a
            } else {
                unconverged += 1;
                log::debug!("step {}: rejecting proposal, calibration {}", step, cal.status);
                0.0
            }
        } else {
            out_of_bound += 1;
            0.0
        };

        let uniform: f64 = rng.gen();
        if uniform <= alpha {
            if let Some((u, lambda)) = candidate {
                current = ChainState { beta: proposal, potential: u, lambda };
                accepted += 1;
            }
        }
        history.push(current.beta.clone());

        if settings.log_every > 0 && (step + 1) % settings.log_every == 0 {
            log::info!(
                "step {}/{}: acceptance {:.3}, beta {:?}, U {:.4}",
                step + 1,
                settings.chain_length,
                accepted as f64 / (step + 1) as f64,
                current.beta,
                current.potential
            );
        }
    }

    let summary = posterior_summary(&history, settings.window, accepted, settings.chain_length);
    if unconverged > 0 {
        log::warn!("{} proposals rejected after unconverged calibration", unconverged);
    }

    Ok(ChainResult {
        summary,
        history,
        final_state: current,
        initial_status,
        accepted,
        out_of_bound,
        unconverged,
    })
}
