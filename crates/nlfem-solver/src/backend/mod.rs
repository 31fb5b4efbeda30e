//! Linear solver abstraction layer.
//!
//! The Newton-Raphson driver hands the Dirichlet-conditioned tangent matrix
//! and the negated residual to a boxed [`LinearSolver`]; the backend is picked
//! at runtime from [`LinearSolverConfig`].
//!
//! # Backends
//!
//! - **DirectLu** (default): dense LU from nalgebra.
//! - **ConjugateGradient**: Jacobi preconditioned CG working on the CSR
//!   storage directly.
//!
//! # Architecture
//!
//! ```text
//! Element Library (nalgebra DMatrix — small, dense)
//!         │
//!         ▼
//! Assembly (CSR tangent + force vector)
//!         │
//!         ▼
//! Dirichlet enforcement
//!         │
//!         ▼
//! LinearSolver trait
//!    ┌────┴────┐
//!    ▼         ▼
//! DirectLu   ConjugateGradient
//! ```

pub mod iterative;
pub mod native;
pub mod traits;

pub use iterative::ConjugateGradient;
pub use native::DirectLu;
pub use traits::*;

use crate::config::LinearSolverConfig;

/// Build a linear solver from its configuration block.
pub fn make_linear_solver(config: &LinearSolverConfig) -> Box<dyn LinearSolver> {
    match *config {
        LinearSolverConfig::DirectLu => Box::new(DirectLu),
        LinearSolverConfig::ConjugateGradient {
            tolerance,
            max_iterations,
        } => Box::new(
            ConjugateGradient::new()
                .with_tolerance(tolerance)
                .with_max_iterations(max_iterations),
        ),
    }
}
