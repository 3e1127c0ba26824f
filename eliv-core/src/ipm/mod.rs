//! Interior point calibration of the tilting multiplier.
//!
//! Solves the penalized exponentially tilted empirical-likelihood problem
//!
//! ```text
//! minimize   -(1/n) Σᵢ log*(gᵢᵀλ + 1) + ν ‖λ‖₁
//! ```
//!
//! for fixed moments `Gee` with a log-barrier path-following method on the
//! slack reformulation `|λ| ≤ u`. Newton directions are computed matrix-free
//! with PCG, and the duality gap against a running dual bound certifies
//! optimality.

pub mod state;
pub mod termination;
pub mod workspace;

use crate::barrier::StabilizedLog;
use crate::error::{ElivError, ElivResult};
use crate::linalg::dense::{dot, inf_norm, mul_into, mul_tr_into, norm1, norm2, weighted_col_sq_into};
use crate::linalg::pcg::{solve_pcg, PcgFlag};
use crate::problem::{
    CalibrationInfo, CalibrationResult, CalibrationSettings, CalibrationStatus, IterationRecord,
    PreconditionerKind,
};
use crate::util::diagnostics_config;
use nalgebra::DMatrix;
use state::{constraint_values, is_strictly_feasible, IpmState};
use std::time::Instant;
use termination::{check_termination, dual_objective, initial_barrier, update_barrier, TerminationCriteria};
use workspace::IpmWorkspace;

/// Barrier objective `-(1/n) Σ log*(z) + ν Σ u - Σ log(-f) / t`.
fn barrier_objective(slog: &StabilizedLog, z: &[f64], u: &[f64], f: &[f64], nu: f64, t: f64) -> f64 {
    let nf = z.len() as f64;
    -slog.sum(z) / nf + nu * u.iter().sum::<f64>() + state::barrier(f) / t
}

/// out = Gee λ + 1
fn shifted_scores(gee: &DMatrix<f64>, lambda: &[f64], out: &mut [f64]) {
    mul_into(gee, lambda, out);
    for v in out.iter_mut() {
        *v += 1.0;
    }
}

/// Backtracking line search along `ws.dir`.
///
/// Returns the first step `s = βᵏ` whose trial point is strictly feasible and
/// satisfies `φ(s) - φ(0) ≤ α s ∇φᵀd`, leaving that point in the trial
/// buffers, or `None` after `max_line_search_iter` trials.
fn backtracking_line_search(
    gee: &DMatrix<f64>,
    slog: &StabilizedLog,
    state: &IpmState,
    ws: &mut IpmWorkspace,
    phi: f64,
    gdx: f64,
    nu: f64,
    t: f64,
    settings: &CalibrationSettings,
) -> Option<f64> {
    let r = state.lambda.len();
    let mut step = 1.0;

    for _ in 0..settings.max_line_search_iter {
        for i in 0..r {
            ws.trial_lambda[i] = state.lambda[i] + step * ws.dir[i];
            ws.trial_u[i] = state.u[i] + step * ws.dir[r + i];
        }
        constraint_values(&ws.trial_lambda, &ws.trial_u, &mut ws.trial_f);

        if is_strictly_feasible(&ws.trial_f) {
            shifted_scores(gee, &ws.trial_lambda, &mut ws.trial_z);
            let new_phi = barrier_objective(slog, &ws.trial_z, &ws.trial_u, &ws.trial_f, nu, t);
            if new_phi - phi <= settings.armijo_alpha * step * gdx {
                return Some(step);
            }
        }
        step *= settings.backtrack_beta;
    }
    None
}

/// Calibrate the tilting multiplier λ for the moment matrix `gee`.
///
/// # Arguments
///
/// * `gee` - Moment matrix (n × r), see [`build_moment_matrix`](crate::build_moment_matrix)
/// * `nu` - L1 penalty level (must be > 0)
/// * `settings` - Solver settings
///
/// # Returns
///
/// `CalibrationResult` with multiplier, slack, status, and diagnostics.
/// Numerical difficulties are reported through the status; `Err` is returned
/// only for invalid arguments.
pub fn solve_calibration_weights(
    gee: &DMatrix<f64>,
    nu: f64,
    settings: &CalibrationSettings,
) -> ElivResult<CalibrationResult> {
    settings.validate()?;
    if !(nu > 0.0 && nu.is_finite()) {
        return Err(ElivError::InvalidSettings(format!("nu must be positive, got {}", nu)));
    }
    let n = gee.nrows();
    let r = gee.ncols();
    if n == 0 {
        return Err(ElivError::dims("rows of Gee", 1, 0));
    }
    if r == 0 {
        return Err(ElivError::dims("columns of Gee", 1, 0));
    }

    let start = Instant::now();
    let nf = n as f64;
    let slog = StabilizedLog::for_sample_size(n);
    let criteria = TerminationCriteria::from(settings);
    let diag = diagnostics_config();
    let log_table = settings.verbose || diag.enabled;

    let mut state = IpmState::initial(r);
    let mut ws = IpmWorkspace::new(n, r);
    let mut info = CalibrationInfo::default();

    let mut t = initial_barrier(nu, n);
    let mut step = 1000.0;
    let mut primal_obj = 1e100;
    let mut best_primal_obj = primal_obj;
    let mut dual_obj = -1e100;
    let mut gap = primal_obj - dual_obj;
    let mut last_pcg_iters = 0;
    let status;

    if log_table {
        log::debug!("calibrating n={} r={} nu={:.3e}", n, r, nu);
        log::debug!("iter   step      pcg   gap         pobj        dobj        t");
    }

    let mut iter = 0;
    loop {
        shifted_scores(gee, &state.lambda, &mut ws.z);
        slog.first_into(&ws.z, &mut ws.dlog);
        mul_tr_into(gee, &ws.dlog, &mut ws.gtd);

        let pobj = -slog.sum(&ws.z) / nf + nu * norm1(&state.lambda);
        let dobj = dual_objective(&ws.dlog, inf_norm(&ws.gtd), nu);
        primal_obj = pobj;
        best_primal_obj = best_primal_obj.min(pobj);
        // Running maximum; a NaN bound is kept so the termination check sees it.
        if dobj.is_nan() || dobj > dual_obj {
            dual_obj = dobj;
        }
        gap = primal_obj - dual_obj;

        info.trace.push(IterationRecord {
            iter,
            step,
            pcg_iters: last_pcg_iters,
            gap,
            primal_obj,
            best_primal_obj,
            dual_obj,
            barrier_t: t,
        });
        if log_table && diag.should_log(iter) {
            log::debug!(
                "{:4}  {:8.2e}  {:4}  {:10.3e}  {:10.3e}  {:10.3e}  {:8.2e}",
                iter,
                step,
                last_pcg_iters,
                gap,
                primal_obj,
                dual_obj,
                t
            );
        }

        if let Some(s) = check_termination(primal_obj, dual_obj, iter, &criteria) {
            status = s;
            break;
        }

        t = update_barrier(t, gap, step, n);

        // Newton system
        for i in 0..r {
            let q1 = 1.0 / (state.u[i] + state.lambda[i]);
            let q2 = 1.0 / (state.u[i] - state.lambda[i]);
            ws.system.d1[i] = (q1 * q1 + q2 * q2) / t;
            ws.system.d2[i] = (q1 * q1 - q2 * q2) / t;
            ws.grad[i] = -ws.gtd[i] / nf - (q1 - q2) / t;
            ws.grad[r + i] = nu - (q1 + q2) / t;
        }
        slog.second_into(&ws.z, &mut ws.system.d0);
        for d in ws.system.d0.iter_mut() {
            *d *= -1.0 / nf;
        }

        match settings.preconditioner {
            PreconditionerKind::Identity => ws.proxy.fill(2.0 * settings.barrier_mu),
            PreconditionerKind::Diagonal => {
                weighted_col_sq_into(gee, &ws.system.d0, &mut ws.proxy);
                for p in ws.proxy.iter_mut() {
                    *p *= 2.0;
                }
            }
        }
        ws.system.update_preconditioner(&ws.proxy);

        let normg = norm2(&ws.grad);
        let mut pcg_tol = (settings.eta * gap / normg.max(1.0)).min(0.1);
        if iter != 0 && last_pcg_iters == 0 {
            pcg_tol *= 0.1;
        }
        for (b, g) in ws.rhs.iter_mut().zip(&ws.grad) {
            *b = -g;
        }

        let outcome = {
            let mut op = ws.system.operator(gee);
            solve_pcg(&mut op, &ws.rhs, &mut ws.dir, pcg_tol, settings.max_pcg_iter, &mut ws.pcg)
        };
        last_pcg_iters = if outcome.flag == PcgFlag::MaxIterations {
            settings.max_pcg_iter
        } else {
            outcome.iters
        };
        if !outcome.flag.is_converged() {
            log::debug!(
                "Newton iteration {}: PCG flag {} after {} iterations (relres {:.2e})",
                iter,
                outcome.flag.code(),
                outcome.iters,
                outcome.relres
            );
        }
        info.pcg_iters += last_pcg_iters;
        info.pcg_history.push(outcome);

        let phi = barrier_objective(&slog, &ws.z, &state.u, &state.f, nu, t);
        let gdx = dot(&ws.grad, &ws.dir);

        match backtracking_line_search(gee, &slog, &state, &mut ws, phi, gdx, nu, t, settings) {
            Some(s) => {
                step = s;
                std::mem::swap(&mut state.lambda, &mut ws.trial_lambda);
                std::mem::swap(&mut state.u, &mut ws.trial_u);
                std::mem::swap(&mut state.f, &mut ws.trial_f);
            }
            None => {
                status = CalibrationStatus::LineSearchExhausted;
                break;
            }
        }

        iter += 1;
        info.newton_iters = iter;
    }

    info.gap = gap;
    info.primal_obj = primal_obj;
    info.dual_obj = dual_obj;
    info.barrier_t = t;
    info.solve_time_us = start.elapsed().as_micros() as u64;

    if status.is_solved() {
        if log_table {
            log::debug!(
                "calibration solved in {} Newton / {} PCG iterations, gap {:.3e}",
                info.newton_iters,
                info.pcg_iters,
                gap
            );
        }
    } else {
        log::debug!(
            "calibration stopped: {} after {} Newton iterations (gap {:.3e})",
            status,
            info.newton_iters,
            gap
        );
    }

    Ok(CalibrationResult { lambda: state.lambda, u: state.u, status, info })
}
