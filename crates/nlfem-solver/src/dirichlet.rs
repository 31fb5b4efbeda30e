//! Prescribed displacement (Dirichlet) boundaries.
//!
//! Two operations act on the prescribed DOFs:
//!
//! - [`apply_displacement_boundaries`] writes `load_factor * value` into the
//!   cumulative displacement at the start of every load step.
//! - [`enforce_dirichlet_conditions`] decouples the prescribed DOFs from the
//!   incremental system `Kt * du = -r` on every Newton iteration. The row and
//!   column of each prescribed DOF are zeroed and the diagonal is restored to
//!   its assembled value, so the matrix scale seen by the linear solver does
//!   not change.

use std::time::Instant;

use nalgebra::DVector;
use tracing::debug;

use crate::error::{Result, SolverError};
use crate::mesh::DirichletMap;
use crate::sparsity::TangentMatrix;

/// A set of prescribed DOFs and their (full load) values
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletBoundary {
    dofs: Vec<usize>,
    values: Vec<f64>,
}

impl DirichletBoundary {
    /// One prescribed value per DOF
    pub fn new(dofs: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if dofs.len() != values.len() {
            return Err(SolverError::Structural(format!(
                "Dirichlet boundary has {} DOFs but {} values",
                dofs.len(),
                values.len()
            )));
        }
        Ok(Self { dofs, values })
    }

    /// The same prescribed value on every DOF
    pub fn uniform(dofs: Vec<usize>, value: f64) -> Self {
        let values = vec![value; dofs.len()];
        Self { dofs, values }
    }

    pub fn dof_view(&self) -> &[usize] {
        &self.dofs
    }

    pub fn value_view(&self) -> &[f64] {
        &self.values
    }

    /// `(dof, prescribed value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.dofs.iter().copied().zip(self.values.iter().copied())
    }
}

fn check_dof(dof: usize, len: usize, group: &str) -> Result<()> {
    if dof >= len {
        return Err(SolverError::Structural(format!(
            "Dirichlet group '{group}' references DOF {dof} (active DOFs: {len})"
        )));
    }
    Ok(())
}

/// Set every prescribed DOF of `d` to `load_factor * value`.
pub fn apply_displacement_boundaries(
    d: &mut DVector<f64>,
    boundaries: &DirichletMap,
    load_factor: f64,
) -> Result<()> {
    let start = Instant::now();

    for (name, group) in boundaries {
        for boundary in group {
            for (dof, value) in boundary.iter() {
                check_dof(dof, d.len(), name)?;
                d[dof] = load_factor * value;
            }
        }
    }

    debug!(load_factor, elapsed = ?start.elapsed(), "displacements applied");
    Ok(())
}

/// Decouple the prescribed DOFs from the incremental system.
///
/// For each prescribed DOF `f`: `x[f]` and `b[f]` are zeroed, every stored
/// entry of row `f` and column `f` is zeroed, and `a[f, f]` is reset to the
/// value it held before zeroing.
pub fn enforce_dirichlet_conditions(
    a: &mut TangentMatrix,
    x: &mut DVector<f64>,
    b: &mut DVector<f64>,
    boundaries: &DirichletMap,
) -> Result<()> {
    let start = Instant::now();
    let n = a.nrows();

    for (name, group) in boundaries {
        for boundary in group {
            for &fixed_dof in boundary.dof_view() {
                check_dof(fixed_dof, n.min(x.len()).min(b.len()), name)?;

                let diagonal_entry = a.get(fixed_dof, fixed_dof);

                x[fixed_dof] = 0.0;
                b[fixed_dof] = 0.0;

                // Zero the row, remembering the columns visited
                let non_zero_visitor: Vec<usize> = a.row_columns(fixed_dof).to_vec();
                for &col in &non_zero_visitor {
                    if let Some(idx) = a.entry_index(fixed_dof, col) {
                        a.values_mut()[idx] = 0.0;
                    }
                }

                // Zero the paired column entries
                for &row in &non_zero_visitor {
                    if let Some(idx) = a.entry_index(row, fixed_dof) {
                        a.values_mut()[idx] = 0.0;
                    }
                }

                // Restore the diagonal to preserve conditioning
                if let Some(idx) = a.entry_index(fixed_dof, fixed_dof) {
                    a.values_mut()[idx] = diagonal_entry;
                }
            }
        }
    }

    debug!(elapsed = ?start.elapsed(), "Dirichlet conditions enforced");
    Ok(())
}
