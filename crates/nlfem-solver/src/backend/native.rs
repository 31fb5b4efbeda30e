//! Native direct backend using nalgebra.
//!
//! Reconstructs a dense matrix from the CSR storage and solves with LU
//! decomposition. Suitable for small-to-medium problems (up to a few
//! thousand DOFs).

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

use super::traits::*;

/// Dense LU solver.
pub struct DirectLu;

impl LinearSolver for DirectLu {
    fn solve(
        &self,
        a: &CsrMatrix<f64>,
        x: &mut DVector<f64>,
        b: &DVector<f64>,
    ) -> Result<SolveInfo, LinearSolverError> {
        check_dimensions(a, x, b)?;
        let n = a.nrows();

        // Reconstruct dense matrix from CSR rows
        let mut k = DMatrix::zeros(n, n);
        for (row_idx, row) in a.row_iter().enumerate() {
            for (&col_idx, &value) in row.col_indices().iter().zip(row.values().iter()) {
                k[(row_idx, col_idx)] += value;
            }
        }

        let solution = k
            .lu()
            .solve(b)
            .ok_or_else(|| LinearSolverError::Singular("zero pivot in LU decomposition".into()))?;

        if solution.iter().any(|v| !v.is_finite()) {
            return Err(LinearSolverError::Singular(
                "LU solution contains non-finite values".into(),
            ));
        }
        x.copy_from(&solution);

        Ok(SolveInfo {
            iterations: 1,
            residual_norm: None,
            solver_name: self.name().to_string(),
        })
    }

    fn name(&self) -> &str {
        "nalgebra-LU"
    }
}
