//! Linear-system solve for the junction heads.
//!
//! The solver assembles a symmetric positive-definite system as a diagonal
//! array `Aii`, an off-diagonal entry list `Aij` and a right-hand side `F`;
//! this module treats the solve itself as an opaque step. LU decomposition
//! is tried first, with an SVD pseudo-inverse fallback for the
//! ill-conditioned systems a disconnected or degenerate network produces.

use nalgebra::{DMatrix, DVector};

use crate::error::{HydError, HydResult};

/// Off-diagonal coefficient between two junction rows.
#[derive(Debug, Clone, Copy)]
pub struct OffDiag {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Solve `A h = f` for the junction heads.
pub fn solve_system(aii: &[f64], aij: &[OffDiag], f: &[f64]) -> HydResult<Vec<f64>> {
    let n = aii.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut a = DMatrix::<f64>::zeros(n, n);
    for (i, v) in aii.iter().enumerate() {
        a[(i, i)] = *v;
    }
    for entry in aij {
        a[(entry.row, entry.col)] += entry.value;
        a[(entry.col, entry.row)] += entry.value;
    }
    let rhs = DVector::from_column_slice(f);

    match a.clone().lu().solve(&rhs) {
        Some(h) => Ok(h.iter().copied().collect()),
        None => {
            // singular or near-singular; regularized pseudo-inverse
            let svd = a.svd(true, true);
            let threshold = 1e-10 * svd.singular_values.max();
            let h = svd
                .solve(&rhs, threshold)
                .map_err(|_| HydError::Unsolvable)?;
            Ok(h.iter().copied().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_two_junction_chain() {
        // conductance-1 chain: fixed head 100 feeds j0, j0-j1 linked,
        // demand 1 at j1
        let aii = vec![2.0, 1.0];
        let aij = vec![OffDiag {
            row: 0,
            col: 1,
            value: -1.0,
        }];
        let f = vec![100.0, -1.0];
        let h = solve_system(&aii, &aij, &f).unwrap();
        // row0: 2 h0 - h1 = 100; row1: -h0 + h1 = -1 -> h0 = 99, h1 = 98
        assert!((h[0] - 99.0).abs() < 1e-9);
        assert!((h[1] - 98.0).abs() < 1e-9);
    }

    #[test]
    fn singular_system_falls_back() {
        let aii = vec![1.0, 0.0];
        let aij = vec![];
        let f = vec![5.0, 0.0];
        let h = solve_system(&aii, &aij, &f).unwrap();
        assert!((h[0] - 5.0).abs() < 1e-9);
    }
}
