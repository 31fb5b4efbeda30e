//! Versioned quadrature-point state.
//!
//! Every registered variable kind owns two generations of per-quadrature-point
//! values:
//!
//! - **working**: mutated by the constitutive update during Newton iterations
//! - **committed**: the last converged state, used as the history for the next
//!   load step
//!
//! `commit()` copies working into committed and `revert()` copies committed
//! back into working. Both operate on every kind at once.
//!
//! # Example
//!
//! ```
//! use nlfem_solver::internal_variables::{InternalVariables, ScalarKind};
//!
//! let mut vars = InternalVariables::new(4);
//! vars.add_scalar(ScalarKind::EffectivePlasticStrain);
//!
//! vars.scalar_mut(ScalarKind::EffectivePlasticStrain).unwrap()[0] = 0.01;
//! vars.revert();
//! assert_eq!(vars.scalar(ScalarKind::EffectivePlasticStrain).unwrap()[0], 0.0);
//! ```

use std::collections::BTreeMap;

use nalgebra::{DMatrix, Matrix3};

pub type Tensor = Matrix3<f64>;
pub type Tensors = Vec<Tensor>;
pub type Scalars = Vec<f64>;
pub type Matrices = Vec<DMatrix<f64>>;

/// Second order tensor valued variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TensorKind {
    DisplacementGradient,
    CauchyStress,
    CauchyStrain,
    CauchyStressPlastic,
    CauchyStrainPlastic,
    Kirchhoff,
    PiolaKirchhoff1,
    PiolaKirchhoff2,
    DeformationGradient,
    DeformationGradientPlastic,
    GreenStrain,
}

/// Scalar valued variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarKind {
    VonMisesStress,
    EffectivePlasticStrain,
    /// Reference Jacobian determinant
    DetJ0,
    /// Updated Jacobian determinant
    DetJ,
}

/// Small dense square matrix valued variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatrixKind {
    MaterialTangent,
}

/// Working and committed values for a single variable kind.
#[derive(Debug, Clone, PartialEq)]
struct Generations<T> {
    working: Vec<T>,
    committed: Vec<T>,
}

impl<T: Clone> Generations<T> {
    fn filled(size: usize, value: T) -> Self {
        Self {
            working: vec![value.clone(); size],
            committed: vec![value; size],
        }
    }

    fn commit(&mut self) {
        self.committed.clone_from(&self.working);
    }

    fn revert(&mut self) {
        self.working.clone_from(&self.committed);
    }
}

/// Per-quadrature-point internal variables with commit/revert semantics.
///
/// Kinds are registered once at model construction; each registered kind is
/// sized to the total number of quadrature points.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalVariables {
    size: usize,
    tensors: BTreeMap<TensorKind, Generations<Tensor>>,
    scalars: BTreeMap<ScalarKind, Generations<f64>>,
    matrices: BTreeMap<MatrixKind, Generations<DMatrix<f64>>>,
}

impl InternalVariables {
    /// Create an empty store for `size` quadrature points
    pub fn new(size: usize) -> Self {
        Self {
            size,
            tensors: BTreeMap::new(),
            scalars: BTreeMap::new(),
            matrices: BTreeMap::new(),
        }
    }

    /// Number of quadrature points
    pub fn size(&self) -> usize {
        self.size
    }

    /// Register a tensor variable, zero initialised. Re-registering is a no-op.
    pub fn add_tensor(&mut self, kind: TensorKind) -> &mut Self {
        let size = self.size;
        self.tensors
            .entry(kind)
            .or_insert_with(|| Generations::filled(size, Tensor::zeros()));
        self
    }

    /// Register a scalar variable, zero initialised. Re-registering is a no-op.
    pub fn add_scalar(&mut self, kind: ScalarKind) -> &mut Self {
        let size = self.size;
        self.scalars
            .entry(kind)
            .or_insert_with(|| Generations::filled(size, 0.0));
        self
    }

    /// Register a square matrix variable with `rowcol` rows and columns.
    pub fn add_matrix(&mut self, kind: MatrixKind, rowcol: usize) -> &mut Self {
        let size = self.size;
        self.matrices
            .entry(kind)
            .or_insert_with(|| Generations::filled(size, DMatrix::zeros(rowcol, rowcol)));
        self
    }

    pub fn has_tensor(&self, kind: TensorKind) -> bool {
        self.tensors.contains_key(&kind)
    }

    pub fn has_scalar(&self, kind: ScalarKind) -> bool {
        self.scalars.contains_key(&kind)
    }

    pub fn has_matrix(&self, kind: MatrixKind) -> bool {
        self.matrices.contains_key(&kind)
    }

    /// Working (non-converged) tensor values
    pub fn tensor(&self, kind: TensorKind) -> Option<&[Tensor]> {
        self.tensors.get(&kind).map(|g| g.working.as_slice())
    }

    pub fn tensor_mut(&mut self, kind: TensorKind) -> Option<&mut [Tensor]> {
        self.tensors.get_mut(&kind).map(|g| g.working.as_mut_slice())
    }

    /// Last committed tensor values
    pub fn committed_tensor(&self, kind: TensorKind) -> Option<&[Tensor]> {
        self.tensors.get(&kind).map(|g| g.committed.as_slice())
    }

    /// Working (non-converged) scalar values
    pub fn scalar(&self, kind: ScalarKind) -> Option<&[f64]> {
        self.scalars.get(&kind).map(|g| g.working.as_slice())
    }

    pub fn scalar_mut(&mut self, kind: ScalarKind) -> Option<&mut [f64]> {
        self.scalars.get_mut(&kind).map(|g| g.working.as_mut_slice())
    }

    /// Last committed scalar values
    pub fn committed_scalar(&self, kind: ScalarKind) -> Option<&[f64]> {
        self.scalars.get(&kind).map(|g| g.committed.as_slice())
    }

    /// Working (non-converged) matrix values
    pub fn matrix(&self, kind: MatrixKind) -> Option<&[DMatrix<f64>]> {
        self.matrices.get(&kind).map(|g| g.working.as_slice())
    }

    pub fn matrix_mut(&mut self, kind: MatrixKind) -> Option<&mut [DMatrix<f64>]> {
        self.matrices.get_mut(&kind).map(|g| g.working.as_mut_slice())
    }

    /// Last committed matrix values
    pub fn committed_matrix(&self, kind: MatrixKind) -> Option<&[DMatrix<f64>]> {
        self.matrices.get(&kind).map(|g| g.committed.as_slice())
    }

    /// Commit the working state to history once a load step has converged.
    pub fn commit(&mut self) {
        self.tensors.values_mut().for_each(Generations::commit);
        self.scalars.values_mut().for_each(Generations::commit);
        self.matrices.values_mut().for_each(Generations::commit);
    }

    /// Restore the working state from history after a failed load step.
    pub fn revert(&mut self) {
        self.tensors.values_mut().for_each(Generations::revert);
        self.scalars.values_mut().for_each(Generations::revert);
        self.matrices.values_mut().for_each(Generations::revert);
    }

    /// True when every working value equals its committed counterpart
    pub fn is_synchronised(&self) -> bool {
        self.tensors.values().all(|g| g.working == g.committed)
            && self.scalars.values().all(|g| g.working == g.committed)
            && self.matrices.values().all(|g| g.working == g.committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> InternalVariables {
        let mut vars = InternalVariables::new(3);
        vars.add_tensor(TensorKind::CauchyStress)
            .add_tensor(TensorKind::CauchyStrain)
            .add_scalar(ScalarKind::EffectivePlasticStrain)
            .add_matrix(MatrixKind::MaterialTangent, 2);
        vars
    }

    #[test]
    fn registered_kinds_are_sized_to_quadrature_points() {
        let vars = make_store();
        assert_eq!(vars.tensor(TensorKind::CauchyStress).unwrap().len(), 3);
        assert_eq!(vars.scalar(ScalarKind::EffectivePlasticStrain).unwrap().len(), 3);
        let tangents = vars.matrix(MatrixKind::MaterialTangent).unwrap();
        assert_eq!(tangents.len(), 3);
        assert_eq!(tangents[0].shape(), (2, 2));
    }

    #[test]
    fn unregistered_lookup_returns_none() {
        let mut vars = make_store();
        assert!(vars.scalar(ScalarKind::VonMisesStress).is_none());
        assert!(vars.tensor_mut(TensorKind::GreenStrain).is_none());
        assert!(!vars.has_tensor(TensorKind::Kirchhoff));
        assert!(vars.has_matrix(MatrixKind::MaterialTangent));
    }

    #[test]
    fn re_registration_keeps_existing_values() {
        let mut vars = make_store();
        vars.scalar_mut(ScalarKind::EffectivePlasticStrain).unwrap()[1] = 2.0;
        vars.add_scalar(ScalarKind::EffectivePlasticStrain);
        assert_eq!(vars.scalar(ScalarKind::EffectivePlasticStrain).unwrap()[1], 2.0);
    }

    #[test]
    fn revert_restores_committed_state() {
        let mut vars = make_store();
        vars.scalar_mut(ScalarKind::EffectivePlasticStrain).unwrap()[0] = 0.5;
        vars.commit();

        vars.scalar_mut(ScalarKind::EffectivePlasticStrain).unwrap()[0] = 0.9;
        vars.tensor_mut(TensorKind::CauchyStress).unwrap()[2][(0, 0)] = 100.0;
        vars.matrix_mut(MatrixKind::MaterialTangent).unwrap()[1][(1, 1)] = 7.0;
        assert!(!vars.is_synchronised());

        vars.revert();
        assert!(vars.is_synchronised());
        assert_eq!(vars.scalar(ScalarKind::EffectivePlasticStrain).unwrap()[0], 0.5);
        assert_eq!(vars.tensor(TensorKind::CauchyStress).unwrap()[2][(0, 0)], 0.0);
        assert_eq!(vars.matrix(MatrixKind::MaterialTangent).unwrap()[1][(1, 1)], 0.0);
    }

    #[test]
    fn commit_then_revert_is_identity() {
        let mut vars = make_store();
        vars.tensor_mut(TensorKind::CauchyStrain).unwrap()[1] = Tensor::identity();
        vars.commit();
        let snapshot = vars.clone();

        vars.revert();
        assert_eq!(vars, snapshot);
    }

    #[test]
    fn committed_accessors_lag_working_until_commit() {
        let mut vars = make_store();
        vars.scalar_mut(ScalarKind::EffectivePlasticStrain).unwrap()[2] = 0.25;
        assert_eq!(vars.committed_scalar(ScalarKind::EffectivePlasticStrain).unwrap()[2], 0.0);

        vars.commit();
        assert_eq!(vars.committed_scalar(ScalarKind::EffectivePlasticStrain).unwrap()[2], 0.25);
    }
}
