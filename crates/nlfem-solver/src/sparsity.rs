//! Non-zero structure of the global tangent matrix.
//!
//! The pattern is the union over all elements of the Cartesian product of the
//! element DOF list with itself. It is computed once per mesh topology and the
//! numeric values are re-accumulated in place on every assembly.

use std::time::Instant;

use nalgebra_sparse::CsrMatrix;
use nalgebra_sparse::pattern::SparsityPattern;
use tracing::debug;

use crate::error::{Result, SolverError};
use crate::mesh::SubMesh;

/// CSR tangent matrix with a fixed sparsity pattern
#[derive(Debug, Clone)]
pub struct TangentMatrix {
    csr: CsrMatrix<f64>,
}

impl TangentMatrix {
    /// Build the pattern from the element DOF lists of every sub-mesh.
    ///
    /// Values are initialised to zero.
    pub fn from_meshes<S: SubMesh>(meshes: &[S], active_dofs: usize) -> Result<Self> {
        let start = Instant::now();

        let mut doublets: Vec<(usize, usize)> = Vec::with_capacity(active_dofs);
        for (region, submesh) in meshes.iter().enumerate() {
            for element in 0..submesh.elements() {
                let dofs = submesh.local_dof_list(element);
                if let Some(&bad) = dofs.iter().find(|&&dof| dof >= active_dofs) {
                    return Err(SolverError::Structural(format!(
                        "element {element} of region {region} references DOF {bad} \
                         (active DOFs: {active_dofs})"
                    )));
                }
                for &p in dofs {
                    for &q in dofs {
                        doublets.push((p, q));
                    }
                }
            }
        }

        let matrix = Self::from_doublets(active_dofs, doublets)?;

        debug!(
            non_zeros = matrix.nnz(),
            elapsed = ?start.elapsed(),
            "sparsity pattern computed"
        );
        Ok(matrix)
    }

    /// Build from (row, col) coordinates; duplicates are coalesced.
    pub fn from_doublets(size: usize, mut doublets: Vec<(usize, usize)>) -> Result<Self> {
        doublets.sort_unstable();
        doublets.dedup();

        let mut offsets = Vec::with_capacity(size + 1);
        let mut indices = Vec::with_capacity(doublets.len());
        let mut cursor = 0;
        offsets.push(0);
        for row in 0..size {
            while cursor < doublets.len() && doublets[cursor].0 == row {
                indices.push(doublets[cursor].1);
                cursor += 1;
            }
            offsets.push(indices.len());
        }
        if cursor != doublets.len() {
            return Err(SolverError::Structural(format!(
                "coordinate ({}, {}) outside a {size}x{size} system",
                doublets[cursor].0, doublets[cursor].1
            )));
        }

        let nnz = indices.len();
        let pattern = SparsityPattern::try_from_offsets_and_indices(size, size, offsets, indices)
            .map_err(|e| SolverError::Structural(format!("invalid sparsity pattern: {e}")))?;
        let csr = CsrMatrix::try_from_pattern_and_values(pattern, vec![0.0; nnz])
            .map_err(|e| SolverError::Structural(format!("invalid sparse matrix: {e}")))?;

        Ok(Self { csr })
    }

    pub fn nrows(&self) -> usize {
        self.csr.nrows()
    }

    pub fn nnz(&self) -> usize {
        self.csr.nnz()
    }

    pub fn csr(&self) -> &CsrMatrix<f64> {
        &self.csr
    }

    pub fn values(&self) -> &[f64] {
        self.csr.values()
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        self.csr.values_mut()
    }

    /// Zero every stored value, keeping the pattern
    pub fn zero(&mut self) {
        self.csr.values_mut().fill(0.0);
    }

    /// Position of `(row, col)` in the value array, if it is in the pattern
    pub fn entry_index(&self, row: usize, col: usize) -> Option<usize> {
        let offsets = self.csr.row_offsets();
        if row + 1 >= offsets.len() {
            return None;
        }
        let (begin, end) = (offsets[row], offsets[row + 1]);
        self.csr.col_indices()[begin..end]
            .binary_search(&col)
            .ok()
            .map(|pos| begin + pos)
    }

    /// Stored value at `(row, col)`; zero outside the pattern
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entry_index(row, col)
            .map_or(0.0, |idx| self.csr.values()[idx])
    }

    /// Column indices stored in `row`
    pub fn row_columns(&self, row: usize) -> &[usize] {
        let offsets = self.csr.row_offsets();
        &self.csr.col_indices()[offsets[row]..offsets[row + 1]]
    }

    /// Stored `(row, col)` coordinates in storage order
    pub fn coordinates(&self) -> Vec<(usize, usize)> {
        let offsets = self.csr.row_offsets();
        let indices = self.csr.col_indices();
        (0..self.nrows())
            .flat_map(|row| {
                indices[offsets[row]..offsets[row + 1]]
                    .iter()
                    .map(move |&col| (row, col))
            })
            .collect()
    }

    /// Add `values` (one per stored entry, in storage order) to the matrix
    pub fn add_values(&mut self, values: &[f64]) {
        for (stored, add) in self.csr.values_mut().iter_mut().zip(values) {
            *stored += add;
        }
    }

    /// Dense copy, for small systems and diagnostics
    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let n = self.nrows();
        let mut dense = nalgebra::DMatrix::zeros(n, n);
        for (row_idx, row) in self.csr.row_iter().enumerate() {
            for (&col_idx, &value) in row.col_indices().iter().zip(row.values().iter()) {
                dense[(row_idx, col_idx)] = value;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    struct Blocks(Vec<Vec<usize>>);

    impl SubMesh for Blocks {
        fn elements(&self) -> usize {
            self.0.len()
        }

        fn local_dof_list(&self, element: usize) -> &[usize] {
            &self.0[element]
        }

        fn tangent_stiffness(&self, element: usize) -> Result<(&[usize], DMatrix<f64>)> {
            let n = self.0[element].len();
            Ok((self.0[element].as_slice(), DMatrix::identity(n, n)))
        }

        fn internal_force(&self, element: usize) -> Result<(&[usize], DVector<f64>)> {
            let n = self.0[element].len();
            Ok((self.0[element].as_slice(), DVector::zeros(n)))
        }
    }

    #[test]
    fn chain_pattern_is_tridiagonal() {
        let mesh = Blocks(vec![vec![0, 1], vec![1, 2], vec![2, 3]]);
        let kt = TangentMatrix::from_meshes(&[mesh], 4).unwrap();

        // 4 diagonal + 3 upper + 3 lower
        assert_eq!(kt.nnz(), 10);
        assert!(kt.entry_index(1, 2).is_some());
        assert!(kt.entry_index(2, 1).is_some());
        assert!(kt.entry_index(0, 3).is_none());
        assert_eq!(kt.row_columns(1), &[0, 1, 2]);
    }

    #[test]
    fn duplicates_are_coalesced() {
        let a = Blocks(vec![vec![0, 2], vec![2, 0]]);
        let b = Blocks(vec![vec![0, 2]]);
        let kt = TangentMatrix::from_meshes(&[a, b], 3).unwrap();
        assert_eq!(kt.nnz(), 4);
        assert_eq!(kt.row_columns(1), &[] as &[usize]);
    }

    #[test]
    fn out_of_range_dof_is_structural_error() {
        let mesh = Blocks(vec![vec![0, 5]]);
        let err = TangentMatrix::from_meshes(&[mesh], 3).unwrap_err();
        assert!(matches!(err, SolverError::Structural(_)));
    }

    #[test]
    fn values_start_at_zero_and_accumulate() {
        let mut kt = TangentMatrix::from_doublets(2, vec![(0, 0), (1, 1), (0, 1)]).unwrap();
        assert!(kt.values().iter().all(|&v| v == 0.0));

        kt.add_values(&[1.0, 2.0, 3.0]);
        kt.add_values(&[1.0, 0.0, 0.0]);
        assert_eq!(kt.get(0, 0), 2.0);
        assert_eq!(kt.get(0, 1), 2.0);
        assert_eq!(kt.get(1, 1), 3.0);
        assert_eq!(kt.get(1, 0), 0.0);

        kt.zero();
        assert_eq!(kt.to_dense(), DMatrix::zeros(2, 2));
    }
}
