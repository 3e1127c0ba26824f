//! Preallocated buffers for one calibration solve.
//!
//! Sized once from (n, r) and reused across Newton iterations and line-search
//! trials, so the main loop does not allocate.

use crate::linalg::operator::BlockArrowSystem;
use crate::linalg::pcg::PcgWorkspace;

#[derive(Debug, Clone)]
pub struct IpmWorkspace {
    /// z = Gee λ + 1 (n)
    pub z: Vec<f64>,
    /// log*′(z) (n)
    pub dlog: Vec<f64>,
    /// Geeᵀ log*′(z) (r)
    pub gtd: Vec<f64>,

    /// Gradient of the barrier objective (2r)
    pub grad: Vec<f64>,
    /// Newton right-hand side -∇φ (2r)
    pub rhs: Vec<f64>,
    /// Newton direction (dλ, du), warm-started across iterations (2r)
    pub dir: Vec<f64>,
    /// Diagonal proxy for the preconditioner (r)
    pub proxy: Vec<f64>,

    /// Line-search trial point
    pub trial_lambda: Vec<f64>,
    pub trial_u: Vec<f64>,
    pub trial_f: Vec<f64>,
    pub trial_z: Vec<f64>,

    /// Newton matrix blocks
    pub system: BlockArrowSystem,
    pub pcg: PcgWorkspace,
}

impl IpmWorkspace {
    pub fn new(n: usize, r: usize) -> Self {
        Self {
            z: vec![0.0; n],
            dlog: vec![0.0; n],
            gtd: vec![0.0; r],
            grad: vec![0.0; 2 * r],
            rhs: vec![0.0; 2 * r],
            dir: vec![0.0; 2 * r],
            proxy: vec![0.0; r],
            trial_lambda: vec![0.0; r],
            trial_u: vec![0.0; r],
            trial_f: vec![0.0; 2 * r],
            trial_z: vec![0.0; n],
            system: BlockArrowSystem::new(n, r),
            pcg: PcgWorkspace::new(2 * r),
        }
    }
}
