//! Global assembly of the tangent stiffness matrix and internal force vector.
//!
//! ## Assembly Process
//!
//! 1. Zero the numeric values of the cached CSR pattern (or the force vector)
//! 2. Loop over all elements of every sub-mesh:
//!    - Ask the sub-mesh for the element DOF list and local block
//!    - Scatter-add `ke(a, b)` into `K(dofs[a], dofs[b])`, or `fe(a)` into
//!      `f(dofs[a])`
//!
//! ## Parallel Assembly
//!
//! Elements sharing DOFs write to the same global entries. In parallel mode
//! each rayon worker folds its elements into a private buffer laid out like
//! the CSR value array (or the force vector); the buffers are then summed
//! pairwise. Worker code never touches the shared matrix, so no update is
//! lost. Results match the sequential path up to summation order.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SolverError};
use crate::mesh::SubMesh;
use crate::sparsity::TangentMatrix;

/// Element loop scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyMode {
    /// Single threaded element loop
    Sequential,
    /// Rayon worker pool with a per-worker reduction buffer
    #[default]
    Parallel,
}

fn check_block(region: usize, element: usize, dofs: &[usize], rows: usize, cols: usize) -> Result<()> {
    if dofs.is_empty() {
        return Err(SolverError::Structural(format!(
            "element {element} of region {region} has an empty DOF list"
        )));
    }
    if rows != dofs.len() || cols != dofs.len() {
        return Err(SolverError::Structural(format!(
            "element {element} of region {region}: {rows}x{cols} block for {} DOFs",
            dofs.len()
        )));
    }
    Ok(())
}

/// Scatter a local stiffness block into a buffer laid out like `pattern.values()`
fn scatter_stiffness(
    pattern: &TangentMatrix,
    buffer: &mut [f64],
    region: usize,
    element: usize,
    dofs: &[usize],
    ke: &DMatrix<f64>,
) -> Result<()> {
    check_block(region, element, dofs, ke.nrows(), ke.ncols())?;

    for (b, &col) in dofs.iter().enumerate() {
        for (a, &row) in dofs.iter().enumerate() {
            let idx = pattern.entry_index(row, col).ok_or_else(|| {
                SolverError::Structural(format!(
                    "element {element} of region {region} couples ({row}, {col}) \
                     outside the sparsity pattern"
                ))
            })?;
            buffer[idx] += ke[(a, b)];
        }
    }
    Ok(())
}

fn scatter_force(
    force: &mut [f64],
    region: usize,
    element: usize,
    dofs: &[usize],
    fe: &DVector<f64>,
) -> Result<()> {
    check_block(region, element, dofs, fe.len(), dofs.len())?;

    for (a, &dof) in dofs.iter().enumerate() {
        let slot = force.get_mut(dof).ok_or_else(|| {
            SolverError::Structural(format!(
                "element {element} of region {region} references DOF {dof} outside the force vector"
            ))
        })?;
        *slot += fe[a];
    }
    Ok(())
}

/// Sum per-worker buffers
fn sum_buffers(mut lhs: Vec<f64>, rhs: Vec<f64>) -> Result<Vec<f64>> {
    for (l, r) in lhs.iter_mut().zip(rhs) {
        *l += r;
    }
    Ok(lhs)
}

/// Zero `kt` and accumulate the tangent stiffness of every element.
pub fn assemble_stiffness<S: SubMesh>(
    kt: &mut TangentMatrix,
    meshes: &[S],
    mode: AssemblyMode,
) -> Result<()> {
    let start = Instant::now();
    let nnz = kt.nnz();

    let mut values = vec![0.0; nnz];
    for (region, submesh) in meshes.iter().enumerate() {
        let pattern = &*kt;
        match mode {
            AssemblyMode::Sequential => {
                for element in 0..submesh.elements() {
                    let (dofs, ke) = submesh.tangent_stiffness(element)?;
                    scatter_stiffness(pattern, &mut values, region, element, dofs, &ke)?;
                }
            }
            AssemblyMode::Parallel => {
                let contribution = (0..submesh.elements())
                    .into_par_iter()
                    .try_fold(
                        || vec![0.0; nnz],
                        |mut buffer, element| {
                            let (dofs, ke) = submesh.tangent_stiffness(element)?;
                            scatter_stiffness(pattern, &mut buffer, region, element, dofs, &ke)?;
                            Ok::<_, SolverError>(buffer)
                        },
                    )
                    .try_reduce(|| vec![0.0; nnz], sum_buffers)?;
                values = sum_buffers(values, contribution)?;
            }
        }
    }

    kt.zero();
    kt.add_values(&values);

    debug!(
        regions = meshes.len(),
        elements = meshes.iter().map(SubMesh::elements).sum::<usize>(),
        ?mode,
        elapsed = ?start.elapsed(),
        "tangent stiffness assembled"
    );
    Ok(())
}

/// Zero `fint` and accumulate the internal force of every element.
pub fn assemble_internal_force<S: SubMesh>(
    fint: &mut DVector<f64>,
    meshes: &[S],
    mode: AssemblyMode,
) -> Result<()> {
    let start = Instant::now();
    let n = fint.len();

    fint.fill(0.0);
    for (region, submesh) in meshes.iter().enumerate() {
        match mode {
            AssemblyMode::Sequential => {
                for element in 0..submesh.elements() {
                    let (dofs, fe) = submesh.internal_force(element)?;
                    scatter_force(fint.as_mut_slice(), region, element, dofs, &fe)?;
                }
            }
            AssemblyMode::Parallel => {
                let contribution = (0..submesh.elements())
                    .into_par_iter()
                    .try_fold(
                        || vec![0.0; n],
                        |mut buffer, element| {
                            let (dofs, fe) = submesh.internal_force(element)?;
                            scatter_force(&mut buffer, region, element, dofs, &fe)?;
                            Ok::<_, SolverError>(buffer)
                        },
                    )
                    .try_reduce(|| vec![0.0; n], sum_buffers)?;
                for (total, add) in fint.iter_mut().zip(contribution) {
                    *total += add;
                }
            }
        }
    }

    debug!(?mode, elapsed = ?start.elapsed(), "internal forces assembled");
    Ok(())
}
