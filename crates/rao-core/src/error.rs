//! Unified error type for the remedial-action optimizer.
//!
//! Domain-specific error types (solver boundary, problem assembly) convert
//! into [`RaoError`] at API boundaries so callers embedding the optimizer in
//! a larger study pipeline handle one error surface.

use thiserror::Error;

/// Unified error type for all optimizer operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// Inconsistent or incomplete input data
    #[error("Data error: {0}")]
    Data(String),

    /// Solver boundary errors (model assembly, value read-back)
    #[error("Solver error: {0}")]
    Solver(String),

    /// Sensitivity computation reported by the external collaborator
    #[error("Sensitivity error: {0}")]
    Sensitivity(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

// Conversion from anyhow::Error for collaborators built on anyhow
impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}
