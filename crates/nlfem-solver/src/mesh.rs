//! Interfaces the equilibrium solver consumes from the mesh side.
//!
//! A [`FemMesh`] is split into sub-meshes (regions sharing an element
//! formulation and material). Each [`SubMesh`] hands out, per element, its
//! ordered global DOF list together with the local tangent block or the local
//! internal force vector. Everything else (interpolation, quadrature,
//! constitutive laws, output formats) stays behind these traits.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::dirichlet::DirichletBoundary;
use crate::error::Result;

/// Named groups of prescribed degrees of freedom
pub type DirichletMap = BTreeMap<String, Vec<DirichletBoundary>>;

/// A region of the mesh with a homogeneous element formulation.
///
/// Element evaluators take `&self` and must be free of side effects: the
/// assembler calls them concurrently from a worker pool.
pub trait SubMesh: Sync {
    /// Number of elements in this region
    fn elements(&self) -> usize;

    /// Ordered global DOF indices touched by `element`
    fn local_dof_list(&self, element: usize) -> &[usize];

    /// Local tangent stiffness block, square and sized to the DOF list
    fn tangent_stiffness(&self, element: usize) -> Result<(&[usize], DMatrix<f64>)>;

    /// Local internal force vector, sized to the DOF list
    fn internal_force(&self, element: usize) -> Result<(&[usize], DVector<f64>)>;
}

/// The full mesh: topology, prescribed boundaries and material state.
pub trait FemMesh {
    type Region: SubMesh;

    /// Total number of active degrees of freedom
    fn active_dofs(&self) -> usize;

    fn meshes(&self) -> &[Self::Region];

    fn dirichlet_boundaries(&self) -> &DirichletMap;

    /// Externally applied nodal forces at the given load factor.
    ///
    /// `None` means the problem is purely displacement driven.
    fn external_force(&self, _load_factor: f64) -> Option<DVector<f64>> {
        None
    }

    /// Push a trial displacement through the constitutive update.
    ///
    /// Only the working generation of the internal variables may change.
    fn update_internal_variables(&mut self, displacement: &DVector<f64>, time_step: f64)
    -> Result<()>;

    /// Commit (`true`) or revert (`false`) the internal variables
    fn save_internal_variables(&mut self, have_converged: bool);

    /// Persist the converged state of a load step
    fn write(&mut self, step: usize, load_factor: f64) -> Result<()>;
}
