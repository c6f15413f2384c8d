//! Regularized linear inversion of an image onto a pixelization.
//!
//! # Steps
//!
//! 1. Curvature matrix `F = M · diag(1/σ²) · Mᵀ` (`M` blurred, cell × pixel).
//! 2. Data vector `D = M · (image / σ²)`.
//! 3. Solve `(F + H) s = D` by Cholesky. A non positive-definite system is a
//!    [`ReconError::SingularSystem`], never a silent fallback.
//! 4. Model image `Mᵀ s`, then χ², `sᵀHs`, log-determinants and evidence
//!    ([`evidence`]).
//!
//! The inversion is a type-state value: [`Inversion<Unsolved>`] holds the
//! assembled system, [`Inversion<Solved>`] adds the reconstruction, and only
//! a solved inversion can produce an [`Evidence`].

pub mod blurring;
pub mod evidence;
pub mod mapping;
pub mod regularization;

pub use blurring::{BlurringOperator, IdentityBlur, KernelConvolver};
pub use evidence::Evidence;
pub use mapping::MappingMatrix;
pub use regularization::RegularizationMatrix;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{NumericalWarning, ReconError, Result};

/// Marker: system assembled, not yet solved.
#[derive(Debug, Clone)]
pub struct Unsolved;

/// Reconstruction of a solved inversion.
#[derive(Debug, Clone)]
pub struct Solved {
    reconstruction: DVector<f64>,
    model_image: DVector<f64>,
}

/// An inversion of `image` through `mapping` with prior `regularization`.
#[derive(Debug, Clone)]
pub struct Inversion<S = Unsolved> {
    mapping: MappingMatrix,
    regularization: RegularizationMatrix,
    image: DVector<f64>,
    noise: DVector<f64>,
    curvature: DMatrix<f64>,
    curvature_reg: DMatrix<f64>,
    data_vector: DVector<f64>,
    state: S,
}

impl Inversion<Unsolved> {
    /// Assemble `F`, `F + H` and `D`.
    ///
    /// Image and noise must have one entry per mapping-matrix pixel and the
    /// regularization matrix one row per cell ([`ReconError::Geometry`]).
    /// Every noise value must be finite and positive
    /// ([`ReconError::SingularSystem`]).
    pub fn new(
        mapping: MappingMatrix,
        regularization: RegularizationMatrix,
        image: DVector<f64>,
        noise: DVector<f64>,
    ) -> Result<Self> {
        let pixels = mapping.pixel_count();
        if image.len() != pixels || noise.len() != pixels {
            return Err(ReconError::Geometry(format!(
                "image ({}) and noise ({}) must match the {} mapped pixels",
                image.len(),
                noise.len(),
                pixels
            )));
        }
        if regularization.cell_count() != mapping.cell_count() {
            return Err(ReconError::Geometry(format!(
                "regularization matrix covers {} cells, mapping matrix {}",
                regularization.cell_count(),
                mapping.cell_count()
            )));
        }
        if let Some(bad) = noise.iter().position(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(ReconError::SingularSystem(format!(
                "noise at pixel {} is {}, must be finite and positive",
                bad, noise[bad]
            )));
        }
        if let Some(bad) = image.iter().position(|v| !v.is_finite()) {
            return Err(ReconError::Geometry(format!(
                "image pixel {} is not finite",
                bad
            )));
        }

        let m = mapping.blurred();
        let inv_var = noise.map(|s| 1.0 / (s * s));

        // M · diag(1/σ²): scale each pixel column.
        let mut weighted = m.clone();
        for (j, mut col) in weighted.column_iter_mut().enumerate() {
            col *= inv_var[j];
        }
        let curvature = &weighted * m.transpose();
        let data_vector = &weighted * &image;
        let curvature_reg = &curvature + regularization.matrix();

        Ok(Self {
            mapping,
            regularization,
            image,
            noise,
            curvature,
            curvature_reg,
            data_vector,
            state: Unsolved,
        })
    }

    /// Solve `(F + H) s = D` and form the model image `Mᵀ s`.
    pub fn solve(self) -> Result<Inversion<Solved>> {
        let chol = self.curvature_reg.clone().cholesky().ok_or_else(|| {
            ReconError::SingularSystem(format!(
                "curvature + regularization matrix ({} cells) is not positive definite",
                self.mapping.cell_count()
            ))
        })?;
        let reconstruction = chol.solve(&self.data_vector);
        if reconstruction.iter().any(|v| !v.is_finite()) {
            return Err(ReconError::SingularSystem(
                "reconstruction is not finite".into(),
            ));
        }
        let model_image = self.mapping.model_image(&reconstruction)?;

        debug!(
            "Inversion solved: {} cells, {} pixels",
            self.mapping.cell_count(),
            self.mapping.pixel_count()
        );

        Ok(Inversion {
            mapping: self.mapping,
            regularization: self.regularization,
            image: self.image,
            noise: self.noise,
            curvature: self.curvature,
            curvature_reg: self.curvature_reg,
            data_vector: self.data_vector,
            state: Solved {
                reconstruction,
                model_image,
            },
        })
    }
}

impl<S> Inversion<S> {
    pub fn mapping(&self) -> &MappingMatrix {
        &self.mapping
    }

    pub fn regularization(&self) -> &RegularizationMatrix {
        &self.regularization
    }

    pub fn image(&self) -> &DVector<f64> {
        &self.image
    }

    pub fn noise(&self) -> &DVector<f64> {
        &self.noise
    }

    /// `F`
    pub fn curvature_matrix(&self) -> &DMatrix<f64> {
        &self.curvature
    }

    /// `F + H`
    pub fn curvature_reg_matrix(&self) -> &DMatrix<f64> {
        &self.curvature_reg
    }

    /// `D`
    pub fn data_vector(&self) -> &DVector<f64> {
        &self.data_vector
    }
}

/// An inversion whose reconstruction is available.
pub type SolvedInversion = Inversion<Solved>;

impl Inversion<Solved> {
    /// One flux per cell.
    pub fn reconstruction(&self) -> &DVector<f64> {
        &self.state.reconstruction
    }

    /// Blurred image of the reconstruction, `Mᵀ s`.
    pub fn model_image(&self) -> &DVector<f64> {
        &self.state.model_image
    }

    /// `sᵀ H s`
    pub fn regularization_term(&self) -> Result<f64> {
        self.regularization
            .regularization_term(&self.state.reconstruction)
    }

    /// Score the inversion against its own image.
    pub fn evidence(&self) -> Result<Evidence> {
        self.evidence_with_model(&self.state.model_image, &self.image)
    }

    /// Score a total model (e.g. reconstruction plus a profile image)
    /// against `image`.
    pub fn evidence_with_model(
        &self,
        model: &DVector<f64>,
        image: &DVector<f64>,
    ) -> Result<Evidence> {
        if model.len() != self.noise.len() || image.len() != self.noise.len() {
            return Err(ReconError::Geometry(format!(
                "model ({}) and image ({}) must match the {} noise values",
                model.len(),
                image.len(),
                self.noise.len()
            )));
        }
        let chi2 = evidence::chi_squared(image, model, &self.noise);
        let reg_term = self.regularization_term()?;
        let noise_norm = evidence::noise_normalization(&self.noise);

        let mut warnings = Vec::new();
        let (log_det_curvature_reg, w) = evidence::log_determinant(
            &self.curvature_reg,
            NumericalWarning::CurvatureRegularizationLuFallback,
        )?;
        warnings.extend(w);
        let (log_det_regularization, w) = evidence::log_determinant(
            self.regularization.matrix(),
            NumericalWarning::RegularizationLuFallback,
        )?;
        warnings.extend(w);

        let result = Evidence::from_terms(
            chi2,
            reg_term,
            log_det_curvature_reg,
            log_det_regularization,
            noise_norm,
            warnings,
        );
        debug!(
            "Evidence: chi2 {:.4e}, sHs {:.4e}, ln|F+H| {:.4}, ln|H| {:.4}, evidence {:.6e}",
            result.chi_squared,
            result.regularization_term,
            result.log_det_curvature_reg,
            result.log_det_regularization,
            result.evidence
        );
        Ok(result)
    }
}
