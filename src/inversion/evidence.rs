//! Likelihood and Bayesian-evidence terms of a regularized inversion.
//!
//! ```text
//! χ²          = Σ ((image − model) / σ)²
//! noise_norm  = Σ ln(2π σ²)
//! likelihood  = −½ (χ² + noise_norm)
//! evidence    = −½ (χ² + sᵀHs + ln|F+H| − ln|H| + noise_norm)
//! ```
//!
//! Log-determinants take two explicit paths: Cholesky (`2 Σ ln L_ii`) for
//! positive-definite matrices, otherwise LU (`Σ ln |U_ii|`) with a
//! [`NumericalWarning`] so the precision loss is visible to the caller.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::error::{NumericalWarning, ReconError, Result};

/// Natural-log determinant of a square matrix.
///
/// Returns the value and, when the Cholesky path failed, `fallback` as the
/// warning to record. Pivots are judged against `n·ε·max` of the matrix
/// diagonal (Cholesky) or of the LU pivots: a pivot at or below that level is
/// rounding noise on a singular matrix, and the result is
/// [`ReconError::SingularSystem`] rather than a meaningless finite value.
pub fn log_determinant(
    matrix: &DMatrix<f64>,
    fallback: NumericalWarning,
) -> Result<(f64, Option<NumericalWarning>)> {
    let n = matrix.nrows().max(1) as f64;
    let max_diag = matrix.diagonal().iter().fold(0.0_f64, |m, d| m.max(d.abs()));
    let cholesky_tolerance = n * f64::EPSILON * max_diag;

    if let Some(chol) = matrix.clone().cholesky() {
        let diag = chol.l_dirty().diagonal();
        if diag
            .iter()
            .all(|&d| d.is_finite() && d > 0.0 && d * d > cholesky_tolerance)
        {
            return Ok((2.0 * diag.iter().map(|d| d.ln()).sum::<f64>(), None));
        }
    }

    warn!(
        "Cholesky failed on {}x{} matrix, using LU log-determinant ({:?})",
        matrix.nrows(),
        matrix.ncols(),
        fallback
    );
    let lu = matrix.clone().lu();
    let pivots = lu.u().diagonal();
    if let Some(i) = pivots.iter().position(|p| !p.is_finite()) {
        return Err(ReconError::SingularSystem(format!(
            "non-finite pivot at row {} of the LU log-determinant",
            i
        )));
    }
    let max_pivot = pivots.iter().fold(0.0_f64, |m, p| m.max(p.abs()));
    let lu_tolerance = n * f64::EPSILON * max_pivot;
    let mut log_det = 0.0;
    for (i, &pivot) in pivots.iter().enumerate() {
        if pivot.abs() <= lu_tolerance {
            return Err(ReconError::SingularSystem(format!(
                "pivot {:.3e} at row {} of the LU log-determinant is below {:.3e}",
                pivot, i, lu_tolerance
            )));
        }
        log_det += pivot.abs().ln();
    }
    Ok((log_det, Some(fallback)))
}

/// `Σ ((image − model) / σ)²`.
pub fn chi_squared(image: &DVector<f64>, model: &DVector<f64>, noise: &DVector<f64>) -> f64 {
    image
        .iter()
        .zip(model.iter())
        .zip(noise.iter())
        .map(|((d, m), s)| ((d - m) / s).powi(2))
        .sum()
}

/// `Σ ln(2π σ²)`.
pub fn noise_normalization(noise: &DVector<f64>) -> f64 {
    noise
        .iter()
        .map(|s| (2.0 * std::f64::consts::PI * s * s).ln())
        .sum()
}

/// `−½ (χ² + noise_norm)`.
pub fn likelihood(chi_squared: f64, noise_normalization: f64) -> f64 {
    -0.5 * (chi_squared + noise_normalization)
}

/// `−½ (χ² + sᵀHs + noise_norm)`.
pub fn likelihood_with_regularization(
    chi_squared: f64,
    regularization_term: f64,
    noise_normalization: f64,
) -> f64 {
    -0.5 * (chi_squared + regularization_term + noise_normalization)
}

/// `−½ (χ² + sᵀHs + ln|F+H| − ln|H| + noise_norm)`.
pub fn evidence(
    chi_squared: f64,
    regularization_term: f64,
    log_det_curvature_reg: f64,
    log_det_regularization: f64,
    noise_normalization: f64,
) -> f64 {
    -0.5 * (chi_squared + regularization_term + log_det_curvature_reg - log_det_regularization
        + noise_normalization)
}

/// Every term of a solved inversion's score.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub chi_squared: f64,
    pub regularization_term: f64,
    /// `ln|F + H|`
    pub log_det_curvature_reg: f64,
    /// `ln|H|`
    pub log_det_regularization: f64,
    pub noise_normalization: f64,
    pub likelihood: f64,
    pub likelihood_with_regularization: f64,
    pub evidence: f64,
    /// Determinant fallbacks taken while computing the terms.
    pub warnings: Vec<NumericalWarning>,
}

impl Evidence {
    pub fn from_terms(
        chi_squared: f64,
        regularization_term: f64,
        log_det_curvature_reg: f64,
        log_det_regularization: f64,
        noise_normalization: f64,
        warnings: Vec<NumericalWarning>,
    ) -> Self {
        Self {
            chi_squared,
            regularization_term,
            log_det_curvature_reg,
            log_det_regularization,
            noise_normalization,
            likelihood: likelihood(chi_squared, noise_normalization),
            likelihood_with_regularization: likelihood_with_regularization(
                chi_squared,
                regularization_term,
                noise_normalization,
            ),
            evidence: evidence(
                chi_squared,
                regularization_term,
                log_det_curvature_reg,
                log_det_regularization,
                noise_normalization,
            ),
            warnings,
        }
    }
}
