//! Error types for the nonlinear static solver.

use thiserror::Error;

use crate::adaptive_load::LoadError;
use crate::backend::LinearSolverError;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    /// Malformed mesh data: empty DOF lists, out-of-range indices, mismatched blocks.
    #[error("structural error: {0}")]
    Structural(String),

    #[error("element error: {0}")]
    Element(String),

    #[error(
        "singular tangent system at step {step}, iteration {iteration} \
         (|du| = {displacement_norm:.3e}, |r| = {residual_norm:.3e}): {source}"
    )]
    SingularSystem {
        step: usize,
        iteration: usize,
        displacement_norm: f64,
        residual_norm: f64,
        #[source]
        source: LinearSolverError,
    },

    #[error(
        "load step {step} failed after {iterations} iterations \
         (|du| = {displacement_norm:.3e}, |r| = {residual_norm:.3e}): \
         increment {increment:.3e} fell below minimum {minimum:.3e}"
    )]
    IncrementUnderflow {
        step: usize,
        iterations: usize,
        displacement_norm: f64,
        residual_norm: f64,
        increment: f64,
        minimum: f64,
    },

    #[error(
        "load step {step} failed after {iterations} iterations \
         (|du| = {displacement_norm:.3e}, |r| = {residual_norm:.3e}): \
         {attempts} consecutive attempts failed to converge"
    )]
    CutbackLimit {
        step: usize,
        iterations: usize,
        displacement_norm: f64,
        residual_norm: f64,
        attempts: usize,
    },

    #[error("continuation rejected: {0}")]
    Continuation(#[source] LoadError),

    #[error("load control error: {0}")]
    Load(#[from] LoadError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
