//! Problem data, settings, and result types.
//!
//! This module defines the observation container shared by every chain, the
//! configuration of the inner calibration solver and of the outer sampler,
//! and the status/diagnostic types returned to callers.

use crate::error::{ElivError, ElivResult};
use crate::linalg::pcg::PcgOutcome;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observations of a linear IV model.
///
/// ```text
/// y = x β + ε,   E[zᵢ εᵢ] = 0
/// ```
///
/// # Dimensions
///
/// - `n`: number of observations (length of y, rows of x and z)
/// - `p`: number of covariates (columns of x, length of β)
/// - `r`: number of instruments (columns of z), `r ≥ p`
#[derive(Debug, Clone)]
pub struct ObservationSet {
    y: Vec<f64>,
    x: DMatrix<f64>,
    z: DMatrix<f64>,
}

impl ObservationSet {
    /// Validate dimensions and wrap the data.
    pub fn new(y: Vec<f64>, x: DMatrix<f64>, z: DMatrix<f64>) -> ElivResult<Self> {
        let n = y.len();
        if n == 0 {
            return Err(ElivError::dims("observations", 1, 0));
        }
        if x.nrows() != n {
            return Err(ElivError::dims("rows of x", n, x.nrows()));
        }
        if z.nrows() != n {
            return Err(ElivError::dims("rows of z", n, z.nrows()));
        }
        if x.ncols() == 0 {
            return Err(ElivError::dims("columns of x", 1, 0));
        }
        // Over-identification: at least as many instruments as covariates.
        if z.ncols() < x.ncols() {
            return Err(ElivError::dims("columns of z (r >= p)", x.ncols(), z.ncols()));
        }
        Ok(Self { y, x, z })
    }

    /// Number of observations n.
    pub fn num_obs(&self) -> usize {
        self.y.len()
    }

    /// Number of covariates p.
    pub fn num_covariates(&self) -> usize {
        self.x.ncols()
    }

    /// Number of instruments r.
    pub fn num_instruments(&self) -> usize {
        self.z.ncols()
    }

    /// Response vector.
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Covariate matrix (n × p).
    pub fn x(&self) -> &DMatrix<f64> {
        &self.x
    }

    /// Instrument matrix (n × r).
    pub fn z(&self) -> &DMatrix<f64> {
        &self.z
    }

    /// Moment matrix for `beta`, see [`build_moment_matrix`](crate::build_moment_matrix).
    pub fn moment_matrix(&self, beta: &[f64]) -> ElivResult<DMatrix<f64>> {
        crate::moments::build_moment_matrix(beta, &self.y, &self.x, &self.z)
    }
}

/// Diagonal proxy used by the block preconditioner for `Geeᵀ D0 Gee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreconditionerKind {
    /// Constant proxy `2·μ` (μ = 2), independent of the data.
    #[default]
    Identity,

    /// Proxy `2·diag(Geeᵀ D0 Gee)`, recomputed every Newton iteration.
    Diagonal,
}

impl PreconditionerKind {
    fn from_env() -> Option<Self> {
        let v = std::env::var("ELIV_PRECONDITIONER").ok()?;
        match v.to_lowercase().as_str() {
            "identity" => Some(PreconditionerKind::Identity),
            "diag" | "diagonal" => Some(PreconditionerKind::Diagonal),
            _ => None,
        }
    }
}

/// Settings for the interior point calibration solver.
#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    /// Target relative duality gap
    pub target_gap: f64,

    /// PCG tolerance factor η (tolerance = min(0.1, η·gap / max(1, ‖∇φ‖)))
    pub eta: f64,

    /// Maximum PCG iterations per Newton step
    pub max_pcg_iter: usize,

    /// Preconditioner diagonal proxy
    pub preconditioner: PreconditionerKind,

    /// Maximum Newton (outer IPM) iterations
    pub max_newton_iter: usize,

    /// Maximum backtracking steps per line search
    pub max_line_search_iter: usize,

    /// Armijo sufficient-decrease fraction
    pub armijo_alpha: f64,

    /// Backtracking shrink factor
    pub backtrack_beta: f64,

    /// Barrier update parameter μ (enters the identity preconditioner as 2μ)
    pub barrier_mu: f64,

    /// Log the iteration table
    pub verbose: bool,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        // MINIX-style environment overrides for experiments without recompiling.
        let max_pcg_iter = std::env::var("ELIV_PCG_MAXIT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(5000);
        let target_gap = std::env::var("ELIV_TARGET_GAP")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| *v > 0.0)
            .unwrap_or(1e-9);

        Self {
            target_gap,
            eta: 1e-3,
            max_pcg_iter,
            preconditioner: PreconditionerKind::from_env().unwrap_or_default(),
            max_newton_iter: 400,
            max_line_search_iter: 100,
            armijo_alpha: 0.01,
            backtrack_beta: 0.5,
            barrier_mu: 2.0,
            verbose: crate::util::verbosity() >= 2,
        }
    }
}

impl CalibrationSettings {
    /// Check that all parameters are in range.
    pub fn validate(&self) -> ElivResult<()> {
        if !(self.target_gap > 0.0 && self.target_gap.is_finite()) {
            return Err(ElivError::InvalidSettings(format!(
                "target_gap must be positive, got {}",
                self.target_gap
            )));
        }
        if !(self.eta > 0.0 && self.eta.is_finite()) {
            return Err(ElivError::InvalidSettings(format!("eta must be positive, got {}", self.eta)));
        }
        if self.max_pcg_iter == 0 || self.max_newton_iter == 0 || self.max_line_search_iter == 0 {
            return Err(ElivError::InvalidSettings(
                "iteration caps must be at least 1".to_string(),
            ));
        }
        if !(0.0 < self.armijo_alpha && self.armijo_alpha < 0.5) {
            return Err(ElivError::InvalidSettings(format!(
                "armijo_alpha must be in (0, 0.5), got {}",
                self.armijo_alpha
            )));
        }
        if !(0.0 < self.backtrack_beta && self.backtrack_beta < 1.0) {
            return Err(ElivError::InvalidSettings(format!(
                "backtrack_beta must be in (0, 1), got {}",
                self.backtrack_beta
            )));
        }
        if !(self.barrier_mu > 0.0) {
            return Err(ElivError::InvalidSettings(format!(
                "barrier_mu must be positive, got {}",
                self.barrier_mu
            )));
        }
        Ok(())
    }

    /// Set the target relative duality gap.
    pub fn with_target_gap(mut self, gap: f64) -> Self {
        self.target_gap = gap;
        self
    }

    /// Set the preconditioner kind.
    pub fn with_preconditioner(mut self, kind: PreconditionerKind) -> Self {
        self.preconditioner = kind;
        self
    }
}

/// Prior on the coefficient vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriorSpec {
    /// No prior term in the potential
    Flat,

    /// Spherical Gaussian N(mean, σ² I)
    Gaussian {
        /// Prior mean (length p)
        mean: Vec<f64>,
        /// Prior standard deviation
        sigma: f64,
    },
}

/// Settings for the Metropolis-Hastings sampler.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    /// L1 penalty level ν of the calibration problem
    pub nu: f64,

    /// Prior on β
    pub prior: PriorSpec,

    /// Proposals with max|β'| above this bound are rejected without a solve
    pub proposal_bound: f64,

    /// Number of Metropolis steps
    pub chain_length: usize,

    /// Number of trailing draws averaged in the posterior summary
    pub window: usize,

    /// Inner solver settings
    pub calibration: CalibrationSettings,

    /// Log chain progress every N steps (0 = never)
    pub log_every: usize,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            nu: 0.05,
            prior: PriorSpec::Flat,
            proposal_bound: 5.0,
            chain_length: 3500,
            window: 3000,
            calibration: CalibrationSettings::default(),
            log_every: 0,
        }
    }
}

impl SamplerSettings {
    /// Gaussian prior centred at -1 in every coordinate (σ = 0.5), bound 10.
    pub fn shifted_prior(p: usize) -> Self {
        Self {
            prior: PriorSpec::Gaussian { mean: vec![-1.0; p], sigma: 0.5 },
            proposal_bound: 10.0,
            ..Default::default()
        }
    }

    /// Gaussian prior centred at 0.6 in every coordinate (σ = 0.5), bound 5.
    pub fn centered_prior(p: usize) -> Self {
        Self {
            prior: PriorSpec::Gaussian { mean: vec![0.6; p], sigma: 0.5 },
            proposal_bound: 5.0,
            ..Default::default()
        }
    }

    /// No prior term, bound 5.
    pub fn flat_prior() -> Self {
        Self::default()
    }

    /// Set the penalty level ν.
    pub fn with_nu(mut self, nu: f64) -> Self {
        self.nu = nu;
        self
    }

    /// Set chain length and summary window.
    pub fn with_chain(mut self, chain_length: usize, window: usize) -> Self {
        self.chain_length = chain_length;
        self.window = window;
        self
    }

    /// Check settings against the data dimensions.
    pub fn validate(&self, p: usize, r: usize) -> ElivResult<()> {
        if !(self.nu > 0.0 && self.nu.is_finite()) {
            return Err(ElivError::InvalidSettings(format!("nu must be positive, got {}", self.nu)));
        }
        if !(self.proposal_bound > 0.0) {
            return Err(ElivError::InvalidSettings(format!(
                "proposal_bound must be positive, got {}",
                self.proposal_bound
            )));
        }
        if self.chain_length == 0 {
            return Err(ElivError::InvalidSettings("chain_length must be at least 1".to_string()));
        }
        if self.window == 0 || self.window > self.chain_length + 1 {
            return Err(ElivError::InvalidSettings(format!(
                "window must be in 1..={}, got {}",
                self.chain_length + 1,
                self.window
            )));
        }
        // The proposal scale divides by sqrt(n log r).
        if r < 2 {
            return Err(ElivError::InvalidSettings(format!(
                "at least two instruments are required for the proposal scale, got {}",
                r
            )));
        }
        if let PriorSpec::Gaussian { mean, sigma } = &self.prior {
            if mean.len() != p {
                return Err(ElivError::dims("prior mean", p, mean.len()));
            }
            if !(*sigma > 0.0) {
                return Err(ElivError::InvalidSettings(format!(
                    "prior sigma must be positive, got {}",
                    sigma
                )));
            }
        }
        self.calibration.validate()
    }
}

/// Outcome of one calibration solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStatus {
    /// Relative duality gap below target
    Solved,

    /// Backtracking found no feasible sufficient-decrease step
    LineSearchExhausted,

    /// Newton iteration cap reached
    MaxIterations,

    /// Objective or iterate became non-finite
    NumericalError,
}

impl CalibrationStatus {
    /// Whether the multiplier is certified optimal to the target gap.
    pub fn is_solved(self) -> bool {
        matches!(self, CalibrationStatus::Solved)
    }
}

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationStatus::Solved => write!(f, "Solved"),
            CalibrationStatus::LineSearchExhausted => write!(f, "Line search exhausted"),
            CalibrationStatus::MaxIterations => write!(f, "MaxIterations"),
            CalibrationStatus::NumericalError => write!(f, "Numerical Error"),
        }
    }
}

/// One row of the IPM iteration table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    /// Newton iteration index
    pub iter: usize,
    /// Step length accepted by the previous line search
    pub step: f64,
    /// PCG iterations spent on the previous Newton direction
    pub pcg_iters: usize,
    /// Duality gap
    pub gap: f64,
    /// Primal objective at the current iterate
    pub primal_obj: f64,
    /// Smallest primal objective seen so far
    pub best_primal_obj: f64,
    /// Dual lower bound (running maximum)
    pub dual_obj: f64,
    /// Barrier parameter at the start of the iteration
    pub barrier_t: f64,
}

/// Detailed solve information and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CalibrationInfo {
    /// Newton iterations completed
    pub newton_iters: usize,

    /// Total PCG iterations across all Newton steps
    pub pcg_iters: usize,

    /// PCG outcome of every Newton step
    pub pcg_history: Vec<PcgOutcome>,

    /// Iteration table
    pub trace: Vec<IterationRecord>,

    /// Final duality gap
    pub gap: f64,

    /// Final primal objective
    pub primal_obj: f64,

    /// Final dual lower bound
    pub dual_obj: f64,

    /// Final barrier parameter
    pub barrier_t: f64,

    /// Wall time (microseconds)
    pub solve_time_us: u64,
}

/// Calibrated multiplier with status and diagnostics.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// Tilting multiplier λ (length r)
    pub lambda: Vec<f64>,

    /// Slack u bounding |λ| (length r)
    pub u: Vec<f64>,

    /// Solve status
    pub status: CalibrationStatus,

    /// Diagnostics
    pub info: CalibrationInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize, p: usize, r: usize) -> (Vec<f64>, DMatrix<f64>, DMatrix<f64>) {
        (vec![1.0; n], DMatrix::from_element(n, p, 1.0), DMatrix::from_element(n, r, 1.0))
    }

    #[test]
    fn test_observation_dims() {
        let (y, x, z) = data(10, 2, 3);
        let obs = ObservationSet::new(y, x, z).unwrap();
        assert_eq!(obs.num_obs(), 10);
        assert_eq!(obs.num_covariates(), 2);
        assert_eq!(obs.num_instruments(), 3);
    }

    #[test]
    fn test_observation_rejects_mismatch() {
        let (y, x, _) = data(10, 2, 3);
        let z = DMatrix::from_element(9, 3, 1.0);
        assert!(matches!(
            ObservationSet::new(y, x, z),
            Err(ElivError::DimensionMismatch { what: "rows of z", expected: 10, found: 9 })
        ));

        // Under-identified: r < p
        let (y, x, z) = data(10, 3, 2);
        assert!(matches!(ObservationSet::new(y, x, z), Err(ElivError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_sampler_presets_validate() {
        assert!(SamplerSettings::shifted_prior(2).validate(2, 2).is_ok());
        assert!(SamplerSettings::centered_prior(2).validate(2, 3).is_ok());
        assert!(SamplerSettings::flat_prior().validate(2, 2).is_ok());

        // Prior mean of the wrong length
        assert!(SamplerSettings::shifted_prior(3).validate(2, 2).is_err());
        // Single instrument: proposal scale undefined
        assert!(SamplerSettings::flat_prior().validate(1, 1).is_err());
        // Window longer than the stored history
        let s = SamplerSettings::flat_prior().with_chain(10, 12);
        assert!(s.validate(2, 2).is_err());
    }

    #[test]
    fn test_calibration_settings_validation() {
        assert!(CalibrationSettings::default().validate().is_ok());
        assert!(CalibrationSettings::default().with_target_gap(0.0).validate().is_err());
        let mut s = CalibrationSettings::default();
        s.backtrack_beta = 1.0;
        assert!(s.validate().is_err());
    }
}
