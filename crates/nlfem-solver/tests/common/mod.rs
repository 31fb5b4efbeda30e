//! Shared meshes for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use nlfem_solver::{
    BarMaterial, BarMesh, DirectLu, DirichletBoundary, DirichletMap, FemMesh, LinearSolver,
    LinearSolverError, Result, SolveInfo, SolverError, SubMesh,
};

pub const E: f64 = 1000.0;
pub const YIELD: f64 = 10.0;
pub const H: f64 = 100.0;

/// Bar of unit length per element, clamped at node 0, loaded at the free end
pub fn loaded_bar(elements: usize, material: BarMaterial, load: f64) -> BarMesh {
    let mut mesh = BarMesh::uniform(elements, elements as f64, material, 1.0).unwrap();
    mesh.add_dirichlet("clamped", DirichletBoundary::uniform(vec![0], 0.0))
        .unwrap();
    mesh.add_nodal_load(elements, load).unwrap();
    mesh
}

/// Bar clamped at node 0 with the free end pulled to `end_displacement`
pub fn stretched_bar(elements: usize, material: BarMaterial, end_displacement: f64) -> BarMesh {
    let mut mesh = BarMesh::uniform(elements, elements as f64, material, 1.0).unwrap();
    mesh.add_dirichlet("clamped", DirichletBoundary::uniform(vec![0], 0.0))
        .unwrap();
    mesh.add_dirichlet(
        "pulled",
        DirichletBoundary::uniform(vec![elements], end_displacement),
    )
    .unwrap();
    mesh
}

/// When a spring mesh refuses to reach equilibrium
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    Never,
    Always,
    /// Fails whenever the trial increment exceeds the given size
    AboveIncrement(f64),
}

/// Linear springs whose internal force can drift from the reported tangent.
///
/// With `force_scale = 2` full Newton oscillates between two states forever.
#[derive(Debug, Clone)]
pub struct SpringRegion {
    dofs: Vec<[usize; 2]>,
    stiffness: f64,
    displacement: Vec<f64>,
    force_scale: f64,
}

impl SubMesh for SpringRegion {
    fn elements(&self) -> usize {
        self.dofs.len()
    }

    fn local_dof_list(&self, element: usize) -> &[usize] {
        &self.dofs[element]
    }

    fn tangent_stiffness(&self, element: usize) -> Result<(&[usize], DMatrix<f64>)> {
        let k = self.stiffness;
        Ok((
            self.dofs[element].as_slice(),
            DMatrix::from_row_slice(2, 2, &[k, -k, -k, k]),
        ))
    }

    fn internal_force(&self, element: usize) -> Result<(&[usize], DVector<f64>)> {
        let [a, b] = self.dofs[element];
        let n = self.force_scale * self.stiffness * (self.displacement[b] - self.displacement[a]);
        Ok((self.dofs[element].as_slice(), DVector::from_vec(vec![-n, n])))
    }
}

/// Spring chain clamped at DOF 0 and loaded at the last DOF
pub struct SpringMesh {
    regions: Vec<SpringRegion>,
    dirichlet: DirichletMap,
    load: f64,
    failure: Failure,
    pub commits: usize,
    pub reverts: usize,
    pub writes: Vec<(usize, f64)>,
    /// Make every `write` fail
    pub fail_writes: bool,
}

impl SpringMesh {
    pub fn chain(springs: usize, stiffness: f64, load: f64, failure: Failure) -> Self {
        let mut dirichlet = DirichletMap::new();
        dirichlet.insert(
            "clamped".to_string(),
            vec![DirichletBoundary::uniform(vec![0], 0.0)],
        );
        Self {
            regions: vec![SpringRegion {
                dofs: (0..springs).map(|s| [s, s + 1]).collect(),
                stiffness,
                displacement: vec![0.0; springs + 1],
                force_scale: 1.0,
            }],
            dirichlet,
            load,
            failure,
            commits: 0,
            reverts: 0,
            writes: Vec::new(),
            fail_writes: false,
        }
    }
}

impl FemMesh for SpringMesh {
    type Region = SpringRegion;

    fn active_dofs(&self) -> usize {
        self.regions[0].displacement.len()
    }

    fn meshes(&self) -> &[SpringRegion] {
        &self.regions
    }

    fn dirichlet_boundaries(&self) -> &DirichletMap {
        &self.dirichlet
    }

    fn external_force(&self, load_factor: f64) -> Option<DVector<f64>> {
        let mut fext = DVector::zeros(self.active_dofs());
        fext[self.active_dofs() - 1] = load_factor * self.load;
        Some(fext)
    }

    fn update_internal_variables(&mut self, displacement: &DVector<f64>, time_step: f64) -> Result<()> {
        let broken = match self.failure {
            Failure::Never => false,
            Failure::Always => true,
            Failure::AboveIncrement(limit) => time_step > limit,
        };
        for region in &mut self.regions {
            region.displacement.copy_from_slice(displacement.as_slice());
            region.force_scale = if broken { 2.0 } else { 1.0 };
        }
        Ok(())
    }

    fn save_internal_variables(&mut self, have_converged: bool) {
        if have_converged {
            self.commits += 1;
        } else {
            self.reverts += 1;
        }
    }

    fn write(&mut self, step: usize, load_factor: f64) -> Result<()> {
        if self.fail_writes {
            return Err(SolverError::Io(std::io::Error::other("disk full")));
        }
        self.writes.push((step, load_factor));
        Ok(())
    }
}

/// Wraps a mesh and fails the `fail_on`-th constitutive update (1-based)
/// after the update has already touched the working state.
pub struct FailingUpdate<M> {
    pub inner: M,
    pub fail_on: usize,
    pub updates: usize,
}

impl<M: FemMesh> FailingUpdate<M> {
    pub fn new(inner: M, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            updates: 0,
        }
    }
}

impl<M: FemMesh> FemMesh for FailingUpdate<M> {
    type Region = M::Region;

    fn active_dofs(&self) -> usize {
        self.inner.active_dofs()
    }

    fn meshes(&self) -> &[M::Region] {
        self.inner.meshes()
    }

    fn dirichlet_boundaries(&self) -> &DirichletMap {
        self.inner.dirichlet_boundaries()
    }

    fn external_force(&self, load_factor: f64) -> Option<DVector<f64>> {
        self.inner.external_force(load_factor)
    }

    fn update_internal_variables(&mut self, displacement: &DVector<f64>, time_step: f64) -> Result<()> {
        self.updates += 1;
        self.inner.update_internal_variables(displacement, time_step)?;
        if self.updates == self.fail_on {
            return Err(SolverError::Element(format!("update {} rejected", self.updates)));
        }
        Ok(())
    }

    fn save_internal_variables(&mut self, have_converged: bool) {
        self.inner.save_internal_variables(have_converged);
    }

    fn write(&mut self, step: usize, load_factor: f64) -> Result<()> {
        self.inner.write(step, load_factor)
    }
}

/// Iterative backend stand-in that runs out of iterations on the first
/// `failures` solves, then hands over to dense LU
pub struct GivesUpSolver {
    failures: usize,
    calls: AtomicUsize,
}

impl GivesUpSolver {
    pub fn always() -> Self {
        Self::first(usize::MAX)
    }

    pub fn first(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl LinearSolver for GivesUpSolver {
    fn solve(
        &self,
        a: &CsrMatrix<f64>,
        x: &mut DVector<f64>,
        b: &DVector<f64>,
    ) -> std::result::Result<SolveInfo, LinearSolverError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if call < self.failures {
            return Err(LinearSolverError::NotConverged {
                solver: "gives-up".to_string(),
                iterations: 0,
                residual_norm: b.norm(),
            });
        }
        DirectLu.solve(a, x, b)
    }

    fn name(&self) -> &str {
        "gives-up"
    }
}

/// Elements with arbitrary DOF lists and precomputed blocks
pub struct RandomBlocks {
    pub dofs: Vec<Vec<usize>>,
    pub stiffness: Vec<DMatrix<f64>>,
    pub forces: Vec<DVector<f64>>,
}

impl RandomBlocks {
    /// Deterministic block values derived from the DOF lists
    pub fn new(dofs: Vec<Vec<usize>>) -> Self {
        let stiffness = dofs
            .iter()
            .enumerate()
            .map(|(e, list)| {
                let n = list.len();
                DMatrix::from_fn(n, n, |i, j| (e + 1) as f64 + 0.5 * i as f64 - 0.25 * j as f64)
            })
            .collect();
        let forces = dofs
            .iter()
            .enumerate()
            .map(|(e, list)| DVector::from_fn(list.len(), |i, _| (e as f64 - i as f64) * 0.75))
            .collect();
        Self {
            dofs,
            stiffness,
            forces,
        }
    }
}

impl SubMesh for RandomBlocks {
    fn elements(&self) -> usize {
        self.dofs.len()
    }

    fn local_dof_list(&self, element: usize) -> &[usize] {
        &self.dofs[element]
    }

    fn tangent_stiffness(&self, element: usize) -> Result<(&[usize], DMatrix<f64>)> {
        Ok((self.dofs[element].as_slice(), self.stiffness[element].clone()))
    }

    fn internal_force(&self, element: usize) -> Result<(&[usize], DVector<f64>)> {
        Ok((self.dofs[element].as_slice(), self.forces[element].clone()))
    }
}
