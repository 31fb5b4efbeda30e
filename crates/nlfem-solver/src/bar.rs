//! 2-node elasto-plastic bar chain for axial loading.
//!
//! Nodes lie on a line with one axial DOF per node, so the global DOF of a
//! node is its index. Each element carries a single quadrature point.
//!
//! ## Element Formulation
//!
//! Axial strain from the nodal displacements:
//! ```text
//! eps = (u2 - u1) / L
//! ```
//!
//! Tangent stiffness and internal force:
//! ```text
//! k = (A*Et/L) * [ 1  -1]        f = A*sigma * [-1]
//!                [-1   1]                      [ 1]
//! ```
//!
//! ## Constitutive Model
//!
//! Rate-independent plasticity with linear isotropic hardening, integrated by
//! return mapping:
//! ```text
//! sigma_tr = E * (eps - eps_p,n)
//! f_tr     = |sigma_tr| - (sigma_y + H * alpha_n)
//! dgamma   = f_tr / (E + H)               if f_tr > 0
//! Et       = E * H / (E + H)              while yielding
//! ```
//!
//! History (`eps_p,n`, `alpha_n`) is read from the committed generation of
//! the internal variables; trial results go to the working generation.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dirichlet::DirichletBoundary;
use crate::error::{Result, SolverError};
use crate::internal_variables::{InternalVariables, MatrixKind, ScalarKind, Tensor, TensorKind};
use crate::mesh::{DirichletMap, FemMesh, SubMesh};

/// Uniaxial material parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BarMaterial {
    /// Young's modulus (E)
    pub elastic_modulus: f64,
    /// Initial yield stress; `None` keeps the material elastic
    #[serde(default)]
    pub yield_stress: Option<f64>,
    /// Linear isotropic hardening modulus (H)
    #[serde(default)]
    pub hardening_modulus: f64,
}

impl BarMaterial {
    pub fn elastic(elastic_modulus: f64) -> Self {
        Self {
            elastic_modulus,
            yield_stress: None,
            hardening_modulus: 0.0,
        }
    }

    pub fn plastic(elastic_modulus: f64, yield_stress: f64, hardening_modulus: f64) -> Self {
        Self {
            elastic_modulus,
            yield_stress: Some(yield_stress),
            hardening_modulus,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !(self.elastic_modulus.is_finite() && self.elastic_modulus > 0.0) {
            return Err(format!(
                "elastic modulus {} must be positive",
                self.elastic_modulus
            ));
        }
        if let Some(yield_stress) = self.yield_stress
            && !(yield_stress.is_finite() && yield_stress > 0.0)
        {
            return Err(format!("yield stress {yield_stress} must be positive"));
        }
        if !(self.hardening_modulus.is_finite() && self.hardening_modulus >= 0.0) {
            return Err(format!(
                "hardening modulus {} must be non-negative",
                self.hardening_modulus
            ));
        }
        Ok(())
    }

    /// Integrate the constitutive law for a total strain given the history.
    pub fn return_mapping(
        &self,
        strain: f64,
        plastic_strain: f64,
        effective_plastic_strain: f64,
    ) -> MaterialState {
        let e = self.elastic_modulus;
        let h = self.hardening_modulus;
        let trial_stress = e * (strain - plastic_strain);

        let elastic = MaterialState {
            stress: trial_stress,
            plastic_strain,
            effective_plastic_strain,
            tangent: e,
        };

        let Some(yield_stress) = self.yield_stress else {
            return elastic;
        };

        let trial_yield = trial_stress.abs() - (yield_stress + h * effective_plastic_strain);
        if trial_yield <= 0.0 {
            return elastic;
        }

        let delta_gamma = trial_yield / (e + h);
        let sign = trial_stress.signum();

        MaterialState {
            stress: trial_stress - e * delta_gamma * sign,
            plastic_strain: plastic_strain + delta_gamma * sign,
            effective_plastic_strain: effective_plastic_strain + delta_gamma,
            tangent: e * h / (e + h),
        }
    }
}

/// Result of a return mapping at one quadrature point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialState {
    pub stress: f64,
    pub plastic_strain: f64,
    pub effective_plastic_strain: f64,
    /// Consistent tangent modulus
    pub tangent: f64,
}

/// Elements sharing a material and cross-section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BarRegionConfig {
    pub material: BarMaterial,
    /// Cross-sectional area
    pub area: f64,
    /// Node pairs, one per element
    pub connectivity: Vec<[usize; 2]>,
}

/// Nodes prescribed to `value` at full load
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrescribedConfig {
    pub nodes: Vec<usize>,
    pub value: f64,
}

/// Axial force at a node at full load
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NodalLoad {
    pub node: usize,
    pub value: f64,
}

/// Serialisable description of a bar model
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BarConfig {
    /// Node positions along the bar axis
    pub coordinates: Vec<f64>,
    pub regions: Vec<BarRegionConfig>,
    /// Named groups of prescribed nodes
    #[serde(default)]
    pub dirichlet: BTreeMap<String, Vec<PrescribedConfig>>,
    #[serde(default)]
    pub loads: Vec<NodalLoad>,
}

/// Converged state written at the end of a load step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSnapshot {
    pub step: usize,
    pub load_factor: f64,
    pub displacement: Vec<f64>,
    /// Axial stress per element, regions in order
    pub stress: Vec<f64>,
    pub plastic_strain: Vec<f64>,
}

/// A region of bar elements with its own quadrature point history
#[derive(Debug, Clone)]
pub struct BarRegion {
    material: BarMaterial,
    area: f64,
    connectivity: Vec<[usize; 2]>,
    lengths: Vec<f64>,
    variables: InternalVariables,
}

impl BarRegion {
    fn new(config: &BarRegionConfig, coordinates: &[f64]) -> Result<Self> {
        config.material.validate().map_err(SolverError::Config)?;
        if !(config.area.is_finite() && config.area > 0.0) {
            return Err(SolverError::Config(format!(
                "cross-sectional area {} must be positive",
                config.area
            )));
        }

        let lengths = config
            .connectivity
            .iter()
            .enumerate()
            .map(|(element, &[a, b])| {
                let (Some(xa), Some(xb)) = (coordinates.get(a), coordinates.get(b)) else {
                    return Err(SolverError::Structural(format!(
                        "bar element {element} references node outside 0..{}",
                        coordinates.len()
                    )));
                };
                let length = xb - xa;
                if length.abs() < 1e-12 {
                    return Err(SolverError::Structural(format!(
                        "bar element {element} has zero or near-zero length: {length}"
                    )));
                }
                Ok(length)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut variables = InternalVariables::new(config.connectivity.len());
        variables
            .add_tensor(TensorKind::CauchyStress)
            .add_tensor(TensorKind::CauchyStrain)
            .add_tensor(TensorKind::CauchyStrainPlastic)
            .add_scalar(ScalarKind::EffectivePlasticStrain)
            .add_scalar(ScalarKind::VonMisesStress)
            .add_matrix(MatrixKind::MaterialTangent, 1);

        if let Some(tangents) = variables.matrix_mut(MatrixKind::MaterialTangent) {
            tangents.iter_mut().for_each(|t| t.fill(config.material.elastic_modulus));
        }
        variables.commit();

        Ok(Self {
            material: config.material,
            area: config.area,
            connectivity: config.connectivity.clone(),
            lengths,
            variables,
        })
    }

    pub fn material(&self) -> &BarMaterial {
        &self.material
    }

    pub fn internal_variables(&self) -> &InternalVariables {
        &self.variables
    }

    /// Working axial stress per element
    pub fn stress(&self) -> Vec<f64> {
        self.uniaxial(TensorKind::CauchyStress)
    }

    /// Working plastic strain per element
    pub fn plastic_strain(&self) -> Vec<f64> {
        self.uniaxial(TensorKind::CauchyStrainPlastic)
    }

    fn uniaxial(&self, kind: TensorKind) -> Vec<f64> {
        self.variables
            .tensor(kind)
            .map(|values| values.iter().map(|t| t[(0, 0)]).collect())
            .unwrap_or_default()
    }

    fn dofs(&self, element: usize) -> Result<&[usize]> {
        self.connectivity
            .get(element)
            .map(|nodes| nodes.as_slice())
            .ok_or_else(|| {
                SolverError::Element(format!(
                    "element {element} out of range (region has {})",
                    self.connectivity.len()
                ))
            })
    }

    fn working_stress(&self, element: usize) -> Result<f64> {
        self.variables
            .tensor(TensorKind::CauchyStress)
            .and_then(|values| values.get(element))
            .map(|t| t[(0, 0)])
            .ok_or_else(|| SolverError::Element(format!("stress missing for element {element}")))
    }

    fn working_tangent(&self, element: usize) -> Result<f64> {
        self.variables
            .matrix(MatrixKind::MaterialTangent)
            .and_then(|values| values.get(element))
            .map(|t| t[(0, 0)])
            .ok_or_else(|| SolverError::Element(format!("tangent missing for element {element}")))
    }

    /// Overwrite a working tensor with its axial component only
    fn set_uniaxial(&mut self, kind: TensorKind, values: impl Iterator<Item = f64>) -> Result<()> {
        let tensors = self
            .variables
            .tensor_mut(kind)
            .ok_or_else(|| SolverError::Element(format!("{kind:?} not registered")))?;
        for (tensor, value) in tensors.iter_mut().zip(values) {
            *tensor = Tensor::zeros();
            tensor[(0, 0)] = value;
        }
        Ok(())
    }

    fn set_scalar(&mut self, kind: ScalarKind, values: impl Iterator<Item = f64>) -> Result<()> {
        let scalars = self
            .variables
            .scalar_mut(kind)
            .ok_or_else(|| SolverError::Element(format!("{kind:?} not registered")))?;
        for (scalar, value) in scalars.iter_mut().zip(values) {
            *scalar = value;
        }
        Ok(())
    }

    /// Run the return mapping on every element for the trial displacement
    fn update(&mut self, displacement: &DVector<f64>) -> Result<()> {
        let committed_plastic: Vec<f64> = self
            .variables
            .committed_tensor(TensorKind::CauchyStrainPlastic)
            .map(|values| values.iter().map(|t| t[(0, 0)]).collect())
            .ok_or_else(|| SolverError::Element("plastic strain history missing".into()))?;
        let committed_alpha = self
            .variables
            .committed_scalar(ScalarKind::EffectivePlasticStrain)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| SolverError::Element("effective plastic strain history missing".into()))?;

        let states: Vec<(f64, MaterialState)> = self
            .connectivity
            .iter()
            .zip(&self.lengths)
            .enumerate()
            .map(|(element, (&[a, b], &length))| {
                let strain = (displacement[b] - displacement[a]) / length;
                let state = self.material.return_mapping(
                    strain,
                    committed_plastic[element],
                    committed_alpha[element],
                );
                (strain, state)
            })
            .collect();

        self.set_uniaxial(TensorKind::CauchyStrain, states.iter().map(|(strain, _)| *strain))?;
        self.set_uniaxial(TensorKind::CauchyStress, states.iter().map(|(_, s)| s.stress))?;
        self.set_uniaxial(
            TensorKind::CauchyStrainPlastic,
            states.iter().map(|(_, s)| s.plastic_strain),
        )?;
        self.set_scalar(
            ScalarKind::EffectivePlasticStrain,
            states.iter().map(|(_, s)| s.effective_plastic_strain),
        )?;
        self.set_scalar(ScalarKind::VonMisesStress, states.iter().map(|(_, s)| s.stress.abs()))?;

        let tangents = self
            .variables
            .matrix_mut(MatrixKind::MaterialTangent)
            .ok_or_else(|| SolverError::Element("material tangent not registered".into()))?;
        for (value, (_, state)) in tangents.iter_mut().zip(&states) {
            value.fill(state.tangent);
        }

        Ok(())
    }
}

impl SubMesh for BarRegion {
    fn elements(&self) -> usize {
        self.connectivity.len()
    }

    fn local_dof_list(&self, element: usize) -> &[usize] {
        self.connectivity
            .get(element)
            .map(|nodes| nodes.as_slice())
            .unwrap_or_default()
    }

    fn tangent_stiffness(&self, element: usize) -> Result<(&[usize], DMatrix<f64>)> {
        let dofs = self.dofs(element)?;
        let k = self.area * self.working_tangent(element)? / self.lengths[element].abs();

        let ke = DMatrix::from_row_slice(2, 2, &[k, -k, -k, k]);
        Ok((dofs, ke))
    }

    fn internal_force(&self, element: usize) -> Result<(&[usize], DVector<f64>)> {
        let dofs = self.dofs(element)?;
        let axial = self.area * self.working_stress(element)? * self.lengths[element].signum();

        let fe = DVector::from_vec(vec![-axial, axial]);
        Ok((dofs, fe))
    }
}

/// Chain of bar regions sharing one set of nodes
#[derive(Debug, Clone)]
pub struct BarMesh {
    coordinates: Vec<f64>,
    regions: Vec<BarRegion>,
    dirichlet: DirichletMap,
    loads: Vec<NodalLoad>,
    displacement: DVector<f64>,
    snapshots: Vec<StepSnapshot>,
}

impl BarMesh {
    /// Build a mesh from its serialisable description
    pub fn from_config(config: &BarConfig) -> Result<Self> {
        if config.coordinates.len() < 2 {
            return Err(SolverError::Structural(format!(
                "bar needs at least 2 nodes, got {}",
                config.coordinates.len()
            )));
        }

        let regions = config
            .regions
            .iter()
            .map(|region| BarRegion::new(region, &config.coordinates))
            .collect::<Result<Vec<_>>>()?;

        let mut mesh = Self {
            displacement: DVector::zeros(config.coordinates.len()),
            coordinates: config.coordinates.clone(),
            regions,
            dirichlet: DirichletMap::new(),
            loads: Vec::new(),
            snapshots: Vec::new(),
        };

        for (name, groups) in &config.dirichlet {
            for group in groups {
                mesh.add_dirichlet(name, DirichletBoundary::uniform(group.nodes.clone(), group.value))?;
            }
        }
        for load in &config.loads {
            mesh.add_nodal_load(load.node, load.value)?;
        }

        debug!(
            nodes = mesh.coordinates.len(),
            regions = mesh.regions.len(),
            "bar mesh built"
        );
        Ok(mesh)
    }

    /// Equally spaced chain of `elements` bars over `[0, length]`
    pub fn uniform(elements: usize, length: f64, material: BarMaterial, area: f64) -> Result<Self> {
        if elements == 0 {
            return Err(SolverError::Structural("bar needs at least one element".into()));
        }
        let coordinates = (0..=elements)
            .map(|i| length * i as f64 / elements as f64)
            .collect();
        let connectivity = (0..elements).map(|e| [e, e + 1]).collect();

        Self::from_config(&BarConfig {
            coordinates,
            regions: vec![BarRegionConfig {
                material,
                area,
                connectivity,
            }],
            dirichlet: BTreeMap::new(),
            loads: Vec::new(),
        })
    }

    /// Add a prescribed boundary to the named group
    pub fn add_dirichlet(&mut self, name: &str, boundary: DirichletBoundary) -> Result<()> {
        let nodes = self.coordinates.len();
        if let Some(&dof) = boundary.dof_view().iter().find(|&&dof| dof >= nodes) {
            return Err(SolverError::Structural(format!(
                "Dirichlet group '{name}' references node {dof} (bar has {nodes} nodes)"
            )));
        }
        self.dirichlet
            .entry(name.to_string())
            .or_default()
            .push(boundary);
        Ok(())
    }

    /// Apply an axial force at `node`, scaled by the load factor
    pub fn add_nodal_load(&mut self, node: usize, value: f64) -> Result<()> {
        if node >= self.coordinates.len() {
            return Err(SolverError::Structural(format!(
                "nodal load references node {node} (bar has {} nodes)",
                self.coordinates.len()
            )));
        }
        self.loads.push(NodalLoad { node, value });
        Ok(())
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    pub fn regions(&self) -> &[BarRegion] {
        &self.regions
    }

    /// Displacement from the last constitutive update
    pub fn displacement(&self) -> &DVector<f64> {
        &self.displacement
    }

    pub fn snapshots(&self) -> &[StepSnapshot] {
        &self.snapshots
    }

    pub fn snapshots_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshots)?)
    }
}

impl FemMesh for BarMesh {
    type Region = BarRegion;

    fn active_dofs(&self) -> usize {
        self.coordinates.len()
    }

    fn meshes(&self) -> &[BarRegion] {
        &self.regions
    }

    fn dirichlet_boundaries(&self) -> &DirichletMap {
        &self.dirichlet
    }

    fn external_force(&self, load_factor: f64) -> Option<DVector<f64>> {
        if self.loads.is_empty() {
            return None;
        }
        let mut fext = DVector::zeros(self.coordinates.len());
        for load in &self.loads {
            fext[load.node] += load_factor * load.value;
        }
        Some(fext)
    }

    fn update_internal_variables(
        &mut self,
        displacement: &DVector<f64>,
        _time_step: f64,
    ) -> Result<()> {
        if displacement.len() != self.coordinates.len() {
            return Err(SolverError::Structural(format!(
                "displacement has {} entries for {} nodes",
                displacement.len(),
                self.coordinates.len()
            )));
        }
        for region in &mut self.regions {
            region.update(displacement)?;
        }
        self.displacement.copy_from(displacement);
        Ok(())
    }

    fn save_internal_variables(&mut self, have_converged: bool) {
        for region in &mut self.regions {
            if have_converged {
                region.variables.commit();
            } else {
                region.variables.revert();
            }
        }
    }

    fn write(&mut self, step: usize, load_factor: f64) -> Result<()> {
        self.snapshots.push(StepSnapshot {
            step,
            load_factor,
            displacement: self.displacement.as_slice().to_vec(),
            stress: self.regions.iter().flat_map(BarRegion::stress).collect(),
            plastic_strain: self
                .regions
                .iter()
                .flat_map(BarRegion::plastic_strain)
                .collect(),
        });
        Ok(())
    }
}
