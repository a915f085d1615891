//! Error types for the liquid solver.
//!
//! Per-sample maths (weights, interpolation, integration) is total and never
//! fails. Errors only come out of setup checks, the weight normalization
//! fallback, and the linear solve.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A solid surface was handed over without the inverted sign convention.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Two grids in one operation do not share transform and size.
    #[error("dimension mismatch in {context}: expected {expected}, got {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    /// A multi-material face summed to zero weight and could not be resolved.
    #[error("degenerate face {face:?} on axis {axis}: {candidates} aligned material(s)")]
    DegenerateWeight {
        axis: usize,
        face: [usize; 2],
        candidates: usize,
    },

    /// The linear solve did not reach the requested tolerance.
    #[error("solver did not converge in {iterations} iterations (residual {residual:.3e})")]
    SolverNonconvergence { iterations: usize, residual: f64 },

    #[error("material index {index} out of range (material count {count})")]
    InvalidMaterial { index: usize, count: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn mismatch(
        context: &'static str,
        expected: impl std::fmt::Debug,
        found: impl std::fmt::Debug,
    ) -> Self {
        Self::DimensionMismatch {
            context,
            expected: format!("{:?}", expected),
            found: format!("{:?}", found),
        }
    }
}
