//! Error types shared by every stage of the reconstruction.
//!
//! All failures are local and synchronous. Nothing is retried internally and
//! no partial results are returned; an outer sampler is expected to treat
//! [`ReconError::is_rejected_sample`] errors as "this model is invalid" and
//! keep sampling.

use thiserror::Error;

/// Errors that can occur while building a pixelization or scoring a fit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconError {
    /// Degenerate clustering / tessellation input, or inconsistent shapes.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Insufficient points or a singular border polynomial fit.
    #[error("border fit error: {0}")]
    Fit(String),

    /// The neighbor walk exceeded its iteration bound or hit malformed adjacency.
    #[error("neighbor walk for sub-pixel {sub_pixel} did not converge within {max_steps} steps")]
    Convergence { sub_pixel: usize, max_steps: usize },

    /// Invalid cell count or clustering weights.
    #[error("clustering error: {0}")]
    Clustering(String),

    /// `F + H` (or a determinant fallback) is not usable.
    #[error("singular system: {0}")]
    SingularSystem(String),
}

impl ReconError {
    /// Returns `true` for errors that mean "reject this model sample" rather
    /// than "abort the run".
    pub fn is_rejected_sample(&self) -> bool {
        matches!(
            self,
            ReconError::SingularSystem(_) | ReconError::Clustering(_)
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ReconError>;

/// Non-fatal numerical fallback recorded alongside a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericalWarning {
    /// Cholesky of `F + H` failed while computing its log-determinant; the LU
    /// path was used instead.
    CurvatureRegularizationLuFallback,
    /// Cholesky of `H` failed; the LU path was used instead.
    RegularizationLuFallback,
}
