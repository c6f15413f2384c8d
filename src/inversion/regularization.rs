//! Regularization matrix: a smoothness prior between adjacent cells.
//!
//! For per-cell weights `w` and neighbor pairs `(i, j)`:
//!
//! ```text
//! H[i][i] = n_i · w_i² + Σ_{j ∈ N(i)} w_j²
//! H[i][j] = H[j][i] = −(w_i² + w_j²)      for every pair
//! ```
//!
//! Every row sums to zero, so `H` is positive semi-definite with the constant
//! vector in its null space. Cells without neighbors get a zero row and column.

use nalgebra::{DMatrix, DVector};

use crate::error::{ReconError, Result};
use crate::pixelization::Pixelization;

/// Dense, exactly symmetric `cell_count × cell_count` regularization matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularizationMatrix {
    matrix: DMatrix<f64>,
}

impl RegularizationMatrix {
    /// Build `H` from weights, per-cell neighbor counts and the unique pair list.
    ///
    /// Pairs must satisfy `i < j < cell_count`; `neighbor_counts[i]` must be
    /// the number of pairs that touch cell `i`.
    pub fn from_pairs(
        weights: &[f64],
        neighbor_counts: &[usize],
        pairs: &[(usize, usize)],
    ) -> Result<Self> {
        let n = weights.len();
        if neighbor_counts.len() != n {
            return Err(ReconError::Geometry(format!(
                "{} neighbor counts for {} regularization weights",
                neighbor_counts.len(),
                n
            )));
        }
        let mut touches = vec![0usize; n];
        for &(i, j) in pairs {
            if i >= j || j >= n {
                return Err(ReconError::Geometry(format!(
                    "invalid regularization pair ({}, {}) for {} cells",
                    i, j, n
                )));
            }
            touches[i] += 1;
            touches[j] += 1;
        }
        if let Some(bad) = (0..n).find(|&i| touches[i] != neighbor_counts[i]) {
            return Err(ReconError::Geometry(format!(
                "cell {} has {} neighbor pairs but a neighbor count of {}",
                bad, touches[bad], neighbor_counts[bad]
            )));
        }

        let w2: Vec<f64> = weights.iter().map(|w| w * w).collect();
        let mut matrix = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            matrix[(i, i)] = neighbor_counts[i] as f64 * w2[i];
        }
        for &(i, j) in pairs {
            let off = w2[i] + w2[j];
            matrix[(i, i)] += w2[j];
            matrix[(j, j)] += w2[i];
            matrix[(i, j)] -= off;
            matrix[(j, i)] -= off;
        }

        Ok(Self { matrix })
    }

    /// Build `H` from a pixelization's weights and adjacency.
    pub fn from_pixelization(pixelization: &Pixelization) -> Result<Self> {
        let adjacency = pixelization.adjacency();
        Self::from_pairs(
            pixelization.regularization_weights(),
            &adjacency.neighbor_counts(),
            adjacency.pairs(),
        )
    }

    /// Wrap an existing square, exactly symmetric matrix.
    pub fn from_matrix(matrix: DMatrix<f64>) -> Result<Self> {
        if !matrix.is_square() {
            return Err(ReconError::Geometry(format!(
                "regularization matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix != matrix.transpose() {
            return Err(ReconError::Geometry(
                "regularization matrix must be symmetric".into(),
            ));
        }
        Ok(Self { matrix })
    }

    /// Add `floor` to every diagonal entry.
    ///
    /// `H` as built is only semi-definite; a small floor makes `ln|H|`
    /// finite so the evidence can be computed. A floor of zero is a no-op.
    pub fn with_diagonal_floor(mut self, floor: f64) -> Self {
        for i in 0..self.matrix.nrows() {
            self.matrix[(i, i)] += floor;
        }
        self
    }

    pub fn cell_count(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// The penalty `sᵀ H s` for a reconstruction vector `s`.
    pub fn regularization_term(&self, reconstruction: &DVector<f64>) -> Result<f64> {
        if reconstruction.len() != self.cell_count() {
            return Err(ReconError::Geometry(format!(
                "reconstruction has {} entries for {} cells",
                reconstruction.len(),
                self.cell_count()
            )));
        }
        Ok(reconstruction.dot(&(&self.matrix * reconstruction)))
    }
}
