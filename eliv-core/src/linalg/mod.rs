//! Linear algebra for the Newton systems.
//!
//! - `dense`: small kernels over `nalgebra` storage and slices
//! - `operator`: structured (block-arrow) operator and its block preconditioner
//! - `pcg`: preconditioned conjugate gradients against any [`StructuredOperator`]

pub mod dense;
pub mod operator;
pub mod pcg;

pub use operator::{BlockArrowOperator, BlockArrowSystem, StructuredOperator};
pub use pcg::{solve_pcg, PcgFlag, PcgOutcome, PcgWorkspace};
