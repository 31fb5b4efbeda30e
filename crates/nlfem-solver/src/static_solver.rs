//! Nonlinear static analysis using Newton-Raphson iteration under adaptive
//! load stepping.
//!
//! Solves the nonlinear equilibrium equation:
//! R(d) = F_int(d) - F_ext = 0
//!
//! # Load Stepping
//!
//! While the load is not fully applied:
//! 1. Write `load_factor * value` into every prescribed DOF of `d`
//! 2. Push `d` through the constitutive update
//! 3. Run equilibrium iterations
//! 4. On convergence: persist the step, commit internal variables, grow the
//!    increment. Otherwise: revert internal variables and `d`, cut back.
//!
//! # Newton-Raphson Iteration
//!
//! 1. Compute internal forces: F_int(d_i)
//! 2. Form residual: R_i = F_int - F_ext
//! 3. Assemble tangent stiffness: K_T = ∂F_int/∂d
//! 4. Enforce Dirichlet conditions on (K_T, Δd, R_i)
//! 5. Solve: K_T * Δd = -R_i
//! 6. Update: d_{i+1} = d_i + Δd, then the constitutive state
//! 7. Converged when ||Δd|| < tol_d and ||R_i|| < tol_r
//!
//! # Example
//!
//! ```no_run
//! use nlfem_solver::{BarMesh, DirectLu, IncrementConfig, NonlinearOptions, StaticSolver};
//!
//! # fn example(mut mesh: BarMesh) -> nlfem_solver::Result<()> {
//! let mut solver = StaticSolver::new(
//!     &mut mesh,
//!     NonlinearOptions::default(),
//!     IncrementConfig::uniform(4),
//!     Box::new(DirectLu),
//! )?;
//!
//! let summary = solver.solve()?;
//! println!("Converged {} load steps", summary.converged_steps);
//! # Ok(())
//! # }
//! ```

use nalgebra::DVector;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adaptive_load::{AdaptiveLoad, LoadError};
use crate::assembly::{assemble_internal_force, assemble_stiffness};
use crate::backend::LinearSolver;
use crate::config::{IncrementConfig, NonlinearOptions};
use crate::dirichlet::{apply_displacement_boundaries, enforce_dirichlet_conditions};
use crate::error::{Result, SolverError};
use crate::mesh::{FemMesh, SubMesh};
use crate::sparsity::TangentMatrix;

/// Outcome of one load step attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Index of the step being attempted (number of previously converged steps)
    pub step: usize,
    /// Trial cumulative load factor
    pub load_factor: f64,
    pub increment: f64,
    /// Newton iterations performed
    pub iterations: usize,
    pub converged: bool,
    /// Norm of the last displacement correction
    pub displacement_norm: f64,
    /// Norm of the last constrained residual
    pub residual_norm: f64,
}

/// Result of a completed `solve()`
#[derive(Debug, Clone, Serialize)]
pub struct SolveSummary {
    pub records: Vec<StepRecord>,
    pub converged_steps: usize,
    pub failed_attempts: usize,
    pub load_factor: f64,
    pub displacement: Vec<f64>,
}

/// Iteration state at the end of an equilibrium attempt
#[derive(Debug, Clone, Copy, Default)]
struct IterationNorms {
    iterations: usize,
    displacement_norm: f64,
    residual_norm: f64,
}

/// Nonlinear static solver over a borrowed mesh
pub struct StaticSolver<'a, M: FemMesh> {
    fem_mesh: &'a mut M,
    options: NonlinearOptions,
    adaptive_load: AdaptiveLoad,
    linear_solver: Box<dyn LinearSolver>,
    /// Cached tangent; `None` until the sparsity pattern is (re)computed
    kt: Option<TangentMatrix>,
    fint: DVector<f64>,
    d: DVector<f64>,
    /// Displacement at the last converged step
    d_converged: DVector<f64>,
    records: Vec<StepRecord>,
}

impl<'a, M: FemMesh> StaticSolver<'a, M> {
    pub fn new(
        fem_mesh: &'a mut M,
        options: NonlinearOptions,
        increments: IncrementConfig,
        linear_solver: Box<dyn LinearSolver>,
    ) -> Result<Self> {
        let active_dofs = fem_mesh.active_dofs();
        if active_dofs == 0 {
            return Err(SolverError::Structural("mesh has no active DOFs".into()));
        }
        if fem_mesh.meshes().iter().all(|m| m.elements() == 0) {
            return Err(SolverError::Structural("mesh has no elements".into()));
        }
        if options.max_iterations == 0 {
            return Err(SolverError::Config("max_iterations must be positive".into()));
        }

        Ok(Self {
            fem_mesh,
            options,
            adaptive_load: AdaptiveLoad::new(increments)?,
            linear_solver,
            kt: None,
            fint: DVector::zeros(active_dofs),
            d: DVector::zeros(active_dofs),
            d_converged: DVector::zeros(active_dofs),
            records: Vec::new(),
        })
    }

    /// Extend the simulation with new increment parameters.
    ///
    /// Converged progress, displacements and internal variables are kept.
    pub fn continuation(&mut self, new_increments: IncrementConfig) -> Result<()> {
        self.adaptive_load
            .reset(new_increments)
            .map_err(SolverError::Continuation)
    }

    /// Drop the cached sparsity pattern after a topology change
    pub fn invalidate_sparsity(&mut self) {
        self.kt = None;
    }

    pub fn is_sparsity_computed(&self) -> bool {
        self.kt.is_some()
    }

    pub fn displacement(&self) -> &DVector<f64> {
        &self.d
    }

    pub fn internal_force(&self) -> &DVector<f64> {
        &self.fint
    }

    pub fn tangent(&self) -> Option<&TangentMatrix> {
        self.kt.as_ref()
    }

    pub fn adaptive_load(&self) -> &AdaptiveLoad {
        &self.adaptive_load
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Run load steps until the load is fully applied.
    ///
    /// The summary's `records` cover only the attempts made by this call;
    /// [`records`](Self::records) keeps the whole history across continuations.
    pub fn solve(&mut self) -> Result<SolveSummary> {
        info!(
            equations = self.fem_mesh.active_dofs(),
            solver = self.linear_solver.name(),
            pseudo_time = self.adaptive_load.factor(),
            "solving non-linear equations"
        );
        let first_record = self.records.len();

        while !self.adaptive_load.is_fully_applied() {
            let (converged, norms) = match self.attempt_step() {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.abandon_step();
                    return Err(err);
                }
            };
            self.finish_step(converged, norms)?;
        }

        Ok(SolveSummary {
            records: self.records[first_record..].to_vec(),
            converged_steps: self.adaptive_load.step(),
            failed_attempts: self.adaptive_load.failed_attempts(),
            load_factor: self.adaptive_load.factor(),
            displacement: self.d.as_slice().to_vec(),
        })
    }

    /// Boundary application, initial constitutive update and Newton loop of
    /// one trial increment. Leaves the working state dirty on error.
    fn attempt_step(&mut self) -> Result<(bool, IterationNorms)> {
        self.apply_displacement_boundaries()?;

        self.fem_mesh
            .update_internal_variables(&self.d, self.adaptive_load.increment())?;

        self.perform_equilibrium_iterations()
    }

    pub fn compute_sparsity_pattern(&mut self) -> Result<()> {
        let kt = TangentMatrix::from_meshes(self.fem_mesh.meshes(), self.fem_mesh.active_dofs())?;
        self.kt = Some(kt);
        Ok(())
    }

    pub fn assemble_stiffness(&mut self) -> Result<()> {
        let kt = match self.kt.take() {
            Some(kt) => kt,
            None => TangentMatrix::from_meshes(self.fem_mesh.meshes(), self.fem_mesh.active_dofs())?,
        };
        let kt = self.kt.insert(kt);
        assemble_stiffness(kt, self.fem_mesh.meshes(), self.options.assembly)
    }

    pub fn compute_internal_force(&mut self) -> Result<()> {
        assemble_internal_force(&mut self.fint, self.fem_mesh.meshes(), self.options.assembly)
    }

    fn apply_displacement_boundaries(&mut self) -> Result<()> {
        apply_displacement_boundaries(
            &mut self.d,
            self.fem_mesh.dirichlet_boundaries(),
            self.adaptive_load.load_factor(),
        )
    }

    /// Residual `fint - fext` at the trial load factor
    fn residual(&self) -> Result<DVector<f64>> {
        let mut residual = self.fint.clone();
        if let Some(fext) = self.fem_mesh.external_force(self.adaptive_load.load_factor()) {
            if fext.len() != residual.len() {
                return Err(SolverError::Structural(format!(
                    "external force has {} entries for {} active DOFs",
                    fext.len(),
                    residual.len()
                )));
            }
            residual -= fext;
        }
        Ok(residual)
    }

    fn perform_equilibrium_iterations(&mut self) -> Result<(bool, IterationNorms)> {
        let n = self.fem_mesh.active_dofs();
        let mut delta_d = DVector::zeros(n);
        let mut norms = IterationNorms::default();
        let mut converged = false;

        // Full Newton-Raphson iteration to solve nonlinear equations
        while norms.iterations < self.options.max_iterations {
            let iteration = norms.iterations;

            self.compute_internal_force()?;
            let mut residual = self.residual()?;
            self.assemble_stiffness()?;

            let Some(kt) = self.kt.as_mut() else {
                return Err(SolverError::Structural("tangent matrix was not assembled".into()));
            };
            enforce_dirichlet_conditions(
                kt,
                &mut delta_d,
                &mut residual,
                self.fem_mesh.dirichlet_boundaries(),
            )?;
            norms.residual_norm = residual.norm();

            let rhs = -&residual;
            match self.linear_solver.solve(kt.csr(), &mut delta_d, &rhs) {
                Ok(solve_info) => {
                    debug!(
                        iteration,
                        solver = %solve_info.solver_name,
                        linear_iterations = solve_info.iterations,
                        "linear system solved"
                    );
                }
                Err(err) if err.is_fatal() => {
                    return Err(SolverError::SingularSystem {
                        step: self.adaptive_load.step(),
                        iteration,
                        displacement_norm: norms.displacement_norm,
                        residual_norm: norms.residual_norm,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(iteration, error = %err, "linear solve failed, counting iteration as unconverged");
                    delta_d.fill(0.0);
                    norms.iterations += 1;
                    continue;
                }
            }

            self.d += &delta_d;
            self.fem_mesh
                .update_internal_variables(&self.d, self.adaptive_load.increment())?;

            norms.displacement_norm = delta_d.norm();
            debug!(
                iteration,
                displacement_norm = norms.displacement_norm,
                residual_norm = norms.residual_norm,
                "Newton-Raphson iteration"
            );

            if norms.displacement_norm < self.options.displacement_tolerance
                && norms.residual_norm < self.options.residual_tolerance
            {
                converged = true;
                break;
            }
            norms.iterations += 1;
        }
        if converged {
            // Count the converging iteration
            norms.iterations += 1;
        }

        Ok((converged, norms))
    }

    /// Persist or roll back the attempt and move the load controller on
    fn finish_step(&mut self, converged: bool, norms: IterationNorms) -> Result<()> {
        let step = self.adaptive_load.step();
        let load_factor = self.adaptive_load.load_factor();
        let mut record = StepRecord {
            step,
            load_factor,
            increment: self.adaptive_load.increment(),
            iterations: norms.iterations,
            converged,
            displacement_norm: norms.displacement_norm,
            residual_norm: norms.residual_norm,
        };

        if converged {
            info!(step, load_factor, iterations = norms.iterations, "load step converged");
            if let Err(err) = self.fem_mesh.write(step, load_factor) {
                record.converged = false;
                self.records.push(record);
                self.abandon_step();
                return Err(err);
            }
            self.records.push(record);
            self.d_converged.copy_from(&self.d);
            self.fem_mesh.save_internal_variables(true);
        } else {
            warn!(
                step,
                load_factor,
                displacement_norm = norms.displacement_norm,
                residual_norm = norms.residual_norm,
                "load step did not converge, cutting back"
            );
            self.records.push(record);
            self.abandon_step();
        }

        match self.adaptive_load.update_convergence_state(converged) {
            Ok(()) => Ok(()),
            Err(LoadError::IncrementBelowMinimum { increment, minimum }) => {
                Err(SolverError::IncrementUnderflow {
                    step,
                    iterations: norms.iterations,
                    displacement_norm: norms.displacement_norm,
                    residual_norm: norms.residual_norm,
                    increment,
                    minimum,
                })
            }
            Err(LoadError::TooManyCutbacks { attempts }) => Err(SolverError::CutbackLimit {
                step,
                iterations: norms.iterations,
                displacement_norm: norms.displacement_norm,
                residual_norm: norms.residual_norm,
                attempts,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Restore the last converged displacement and internal variables
    fn abandon_step(&mut self) {
        self.d.copy_from(&self.d_converged);
        self.fem_mesh.save_internal_variables(false);
    }
}
