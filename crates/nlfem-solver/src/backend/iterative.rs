//! Jacobi preconditioned conjugate gradient on CSR storage.
//!
//! After Dirichlet enforcement the tangent matrix of a stable structure is
//! symmetric positive definite, which is what CG needs. A breakdown
//! (non-positive curvature or a zero diagonal) is reported as a singular
//! system; running out of iterations is reported as non-convergence.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use super::traits::*;

/// Conjugate gradient solver for symmetric positive definite systems
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    max_iterations: usize,
    tolerance: f64,
    abs_tolerance: f64,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new()
    }
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self {
            max_iterations: 2000,
            tolerance: 1e-10,
            abs_tolerance: 1e-14,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }
}

/// y = A * x
fn spmv(a: &CsrMatrix<f64>, x: &[f64], y: &mut [f64]) {
    for (row_idx, row) in a.row_iter().enumerate() {
        y[row_idx] = row
            .col_indices()
            .iter()
            .zip(row.values())
            .map(|(&col, &value)| value * x[col])
            .sum();
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn inverse_diagonal(a: &CsrMatrix<f64>) -> Result<Vec<f64>, LinearSolverError> {
    a.row_iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let diagonal = row
                .col_indices()
                .iter()
                .position(|&col| col == row_idx)
                .map_or(0.0, |pos| row.values()[pos]);
            if diagonal.abs() < f64::MIN_POSITIVE {
                Err(LinearSolverError::Singular(format!(
                    "zero diagonal entry at DOF {row_idx}"
                )))
            } else {
                Ok(1.0 / diagonal)
            }
        })
        .collect()
}

impl LinearSolver for ConjugateGradient {
    fn solve(
        &self,
        a: &CsrMatrix<f64>,
        x: &mut DVector<f64>,
        b: &DVector<f64>,
    ) -> Result<SolveInfo, LinearSolverError> {
        check_dimensions(a, x, b)?;
        let n = b.len();
        let b = b.as_slice();
        let b_norm = dot(b, b).sqrt();

        x.fill(0.0);
        if b_norm < self.abs_tolerance {
            return Ok(SolveInfo {
                iterations: 0,
                residual_norm: Some(b_norm),
                solver_name: self.name().to_string(),
            });
        }

        let inv_diag = inverse_diagonal(a)?;
        let x = x.as_mut_slice();

        let mut r = b.to_vec();
        let mut z: Vec<f64> = r.iter().zip(&inv_diag).map(|(ri, di)| ri * di).collect();
        let mut p = z.clone();
        let mut ap = vec![0.0; n];
        let mut rz = dot(&r, &z);
        let mut residual_norm = b_norm;

        for iteration in 1..=self.max_iterations {
            spmv(a, &p, &mut ap);
            let p_ap = dot(&p, &ap);
            if p_ap <= 0.0 || !p_ap.is_finite() {
                return Err(LinearSolverError::Singular(format!(
                    "non-positive curvature {p_ap:.3e} at CG iteration {iteration}"
                )));
            }
            let alpha = rz / p_ap;

            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }

            residual_norm = dot(&r, &r).sqrt();
            if residual_norm < self.tolerance * b_norm || residual_norm < self.abs_tolerance {
                return Ok(SolveInfo {
                    iterations: iteration,
                    residual_norm: Some(residual_norm),
                    solver_name: self.name().to_string(),
                });
            }

            for i in 0..n {
                z[i] = r[i] * inv_diag[i];
            }
            let rz_new = dot(&r, &z);
            let beta = rz_new / rz;
            rz = rz_new;

            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
        }

        Err(LinearSolverError::NotConverged {
            solver: self.name().to_string(),
            iterations: self.max_iterations,
            residual_norm,
        })
    }

    fn name(&self) -> &str {
        "jacobi-CG"
    }
}
