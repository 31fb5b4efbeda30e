//! Backend trait definitions for the linear solve inside each Newton iteration.
//!
//! The equilibrium driver only ever asks for `Kt * du = rhs` to be solved;
//! how that happens (dense factorisation, Krylov iteration) is up to the
//! backend. Element-level computations stay in nalgebra (small, dense).

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use thiserror::Error;

/// Error type for backend operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearSolverError {
    /// The system cannot be solved; retrying with a smaller load step will not help.
    #[error("singular system: {0}")]
    Singular(String),

    /// An iterative method ran out of iterations.
    #[error("{solver} did not converge in {iterations} iterations (residual {residual_norm:.3e})")]
    NotConverged {
        solver: String,
        iterations: usize,
        residual_norm: f64,
    },

    #[error("dimension mismatch: matrix is {rows}x{cols}, rhs has {rhs} entries")]
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },
}

impl LinearSolverError {
    /// Fatal errors abort the load step; the rest count as a failed iteration.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LinearSolverError::NotConverged { .. })
    }
}

/// Solver convergence and diagnostic info.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveInfo {
    /// Number of iterations (1 for direct solvers)
    pub iterations: usize,
    /// Final residual norm (if available)
    pub residual_norm: Option<f64>,
    /// Human-readable solver name (e.g., "nalgebra-LU", "jacobi-CG")
    pub solver_name: String,
}

/// Trait for a linear solver backend.
///
/// Implementations solve `a * x = b`, writing the solution into `x`.
pub trait LinearSolver: Send + Sync {
    fn solve(
        &self,
        a: &CsrMatrix<f64>,
        x: &mut DVector<f64>,
        b: &DVector<f64>,
    ) -> Result<SolveInfo, LinearSolverError>;

    /// Human-readable name of this backend.
    fn name(&self) -> &str;
}

/// Reject non-square systems and right-hand sides of the wrong length
pub(crate) fn check_dimensions(
    a: &CsrMatrix<f64>,
    x: &DVector<f64>,
    b: &DVector<f64>,
) -> Result<(), LinearSolverError> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() || x.len() != b.len() {
        return Err(LinearSolverError::DimensionMismatch {
            rows: a.nrows(),
            cols: a.ncols(),
            rhs: b.len(),
        });
    }
    Ok(())
}
