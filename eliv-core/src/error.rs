//! Error types for calibration and sampling.
//!
//! Numerical trouble inside the interior point method or the conjugate
//! gradient solver is never an error: it is reported through
//! [`CalibrationStatus`](crate::CalibrationStatus) and
//! [`PcgFlag`](crate::PcgFlag). Errors are reserved for contract violations
//! at the public entry points.

use thiserror::Error;

/// Errors that can occur when building moment matrices, calibrating, or sampling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElivError {
    /// Input dimensions do not agree
    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Which argument is malformed
        what: &'static str,
        /// Expected size
        expected: usize,
        /// Size actually supplied
        found: usize,
    },

    /// A setting is outside its admissible range
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl ElivError {
    pub(crate) fn dims(what: &'static str, expected: usize, found: usize) -> Self {
        ElivError::DimensionMismatch { what, expected, found }
    }
}

/// Result type for eliv operations.
pub type ElivResult<T> = Result<T, ElivError>;
