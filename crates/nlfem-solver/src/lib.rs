//! Nonlinear static finite element equilibrium solver.
//!
//! The crate drives a mesh collaborator (see [`FemMesh`]) to equilibrium with
//! full Newton-Raphson iterations under adaptive load stepping:
//!
//! - [`sparsity`]: the tangent matrix sparsity pattern from element DOF lists
//! - [`assembly`]: sequential and rayon-parallel stiffness/force assembly
//! - [`dirichlet`]: prescribed displacements on the cumulative and
//!   incremental systems
//! - [`adaptive_load`]: load increment growth and cutback
//! - [`static_solver`]: the Newton-Raphson driver
//! - [`internal_variables`]: quadrature point history with commit/revert
//!
//! [`bar`] provides an elasto-plastic bar chain implementing the mesh traits.

pub mod adaptive_load;
pub mod assembly;
pub mod backend;
pub mod bar;
pub mod config;
pub mod dirichlet;
pub mod error;
pub mod internal_variables;
pub mod mesh;
pub mod sparsity;
pub mod static_solver;

pub use adaptive_load::{AdaptiveLoad, LoadError};
pub use assembly::{AssemblyMode, assemble_internal_force, assemble_stiffness};
pub use backend::{
    ConjugateGradient, DirectLu, LinearSolver, LinearSolverError, SolveInfo, make_linear_solver,
};
pub use bar::{
    BarConfig, BarMaterial, BarMesh, BarRegion, BarRegionConfig, MaterialState, NodalLoad,
    PrescribedConfig, StepSnapshot,
};
pub use config::{IncrementConfig, LinearSolverConfig, NonlinearOptions};
pub use dirichlet::{DirichletBoundary, apply_displacement_boundaries, enforce_dirichlet_conditions};
pub use error::{Result, SolverError};
pub use internal_variables::{InternalVariables, MatrixKind, ScalarKind, TensorKind};
pub use mesh::{DirichletMap, FemMesh, SubMesh};
pub use sparsity::TangentMatrix;
pub use static_solver::{SolveSummary, StaticSolver, StepRecord};
