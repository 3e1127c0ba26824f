//! Utility functions.
//!
//! Environment-driven diagnostics and verbosity control.

pub mod diagnostics;

pub use diagnostics::{diagnostics_config, verbosity, DiagnosticsConfig};
