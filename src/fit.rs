//! Per-pixel diagnostics and the scalar score of a model image.
//!
//! An [`ImageFit`] compares an observed image with a model image, either a
//! plain profile model (scored by its likelihood) or one that includes a
//! source reconstruction (scored by its evidence).

use nalgebra::DVector;

use crate::error::{ReconError, Result};
use crate::inversion::evidence::{self, Evidence};
use crate::inversion::{Inversion, MappingMatrix, RegularizationMatrix, SolvedInversion};

#[derive(Debug, Clone)]
pub struct ImageFit {
    image: DVector<f64>,
    noise: DVector<f64>,
    model_image: DVector<f64>,
    profile_image: Option<DVector<f64>>,
    inversion: Option<SolvedInversion>,
    evidence: Option<Evidence>,
    chi_squared: f64,
    noise_normalization: f64,
}

impl ImageFit {
    /// Fit of a model image with no reconstruction.
    pub fn from_model(
        image: DVector<f64>,
        noise: DVector<f64>,
        model_image: DVector<f64>,
    ) -> Result<Self> {
        if image.len() != noise.len() || model_image.len() != noise.len() {
            return Err(ReconError::Geometry(format!(
                "image ({}), noise ({}) and model ({}) lengths differ",
                image.len(),
                noise.len(),
                model_image.len()
            )));
        }
        if let Some(bad) = noise.iter().position(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(ReconError::SingularSystem(format!(
                "noise at pixel {} must be finite and positive",
                bad
            )));
        }
        Ok(Self {
            chi_squared: evidence::chi_squared(&image, &model_image, &noise),
            noise_normalization: evidence::noise_normalization(&noise),
            image,
            noise,
            model_image,
            profile_image: None,
            inversion: None,
            evidence: None,
        })
    }

    /// Fit of a solved inversion against the image it was solved for.
    pub fn from_inversion(inversion: SolvedInversion) -> Result<Self> {
        let evidence = inversion.evidence()?;
        Ok(Self {
            image: inversion.image().clone(),
            noise: inversion.noise().clone(),
            model_image: inversion.model_image().clone(),
            profile_image: None,
            chi_squared: evidence.chi_squared,
            noise_normalization: evidence.noise_normalization,
            evidence: Some(evidence),
            inversion: Some(inversion),
        })
    }

    /// Subtract a (blurred) profile image, reconstruct the residual flux,
    /// then score profile + reconstruction against the full image.
    pub fn with_profile_image(
        image: DVector<f64>,
        noise: DVector<f64>,
        profile_image: DVector<f64>,
        mapping: MappingMatrix,
        regularization: RegularizationMatrix,
    ) -> Result<Self> {
        if profile_image.len() != image.len() {
            return Err(ReconError::Geometry(format!(
                "profile image has {} pixels, image {}",
                profile_image.len(),
                image.len()
            )));
        }
        let source_image = &image - &profile_image;
        let inversion = Inversion::new(mapping, regularization, source_image, noise.clone())?.solve()?;
        let model_image = &profile_image + inversion.model_image();
        let evidence = inversion.evidence_with_model(&model_image, &image)?;
        Ok(Self {
            chi_squared: evidence.chi_squared,
            noise_normalization: evidence.noise_normalization,
            image,
            noise,
            model_image,
            profile_image: Some(profile_image),
            inversion: Some(inversion),
            evidence: Some(evidence),
        })
    }

    pub fn image(&self) -> &DVector<f64> {
        &self.image
    }

    pub fn noise(&self) -> &DVector<f64> {
        &self.noise
    }

    pub fn model_image(&self) -> &DVector<f64> {
        &self.model_image
    }

    pub fn profile_image(&self) -> Option<&DVector<f64>> {
        self.profile_image.as_ref()
    }

    pub fn inversion(&self) -> Option<&SolvedInversion> {
        self.inversion.as_ref()
    }

    /// `image − model`
    pub fn residual_map(&self) -> DVector<f64> {
        &self.image - &self.model_image
    }

    /// `(image − model) / σ`
    pub fn normalized_residual_map(&self) -> DVector<f64> {
        self.residual_map().component_div(&self.noise)
    }

    pub fn chi_squared_map(&self) -> DVector<f64> {
        self.normalized_residual_map().map(|r| r * r)
    }

    pub fn signal_to_noise_map(&self) -> DVector<f64> {
        self.image.component_div(&self.noise)
    }

    pub fn chi_squared(&self) -> f64 {
        self.chi_squared
    }

    pub fn noise_normalization(&self) -> f64 {
        self.noise_normalization
    }

    pub fn likelihood(&self) -> f64 {
        evidence::likelihood(self.chi_squared, self.noise_normalization)
    }

    /// `None` without a reconstruction.
    pub fn likelihood_with_regularization(&self) -> Option<f64> {
        self.evidence.as_ref().map(|e| e.likelihood_with_regularization)
    }

    /// `None` without a reconstruction.
    pub fn evidence(&self) -> Option<f64> {
        self.evidence.as_ref().map(|e| e.evidence)
    }

    pub fn evidence_terms(&self) -> Option<&Evidence> {
        self.evidence.as_ref()
    }

    /// The score a sampler maximizes: evidence with a reconstruction,
    /// likelihood otherwise.
    pub fn figure_of_merit(&self) -> f64 {
        self.evidence().unwrap_or_else(|| self.likelihood())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_model_fit_maps() {
        let fit = ImageFit::from_model(
            DVector::from_vec(vec![1.0, 2.0, 3.0]),
            DVector::from_vec(vec![1.0, 2.0, 3.0]),
            DVector::from_vec(vec![1.0, 0.0, 6.0]),
        )
        .unwrap();
        assert_eq!(fit.residual_map().as_slice(), &[0.0, 2.0, -3.0]);
        assert_eq!(fit.normalized_residual_map().as_slice(), &[0.0, 1.0, -1.0]);
        assert_eq!(fit.chi_squared_map().as_slice(), &[0.0, 1.0, 1.0]);
        assert_eq!(fit.signal_to_noise_map().as_slice(), &[1.0, 1.0, 1.0]);
        assert_eq!(fit.chi_squared(), 2.0);
        assert!(fit.evidence().is_none());
        assert!(fit.likelihood_with_regularization().is_none());
        assert_eq!(fit.figure_of_merit(), fit.likelihood());
    }

    #[test]
    fn test_perfect_model_likelihood() {
        let image = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let noise = DVector::from_element(4, 2.0);
        let fit = ImageFit::from_model(image.clone(), noise, image).unwrap();
        assert_eq!(fit.chi_squared(), 0.0);
        assert_eq!(fit.likelihood(), -0.5 * fit.noise_normalization());
    }

    #[test]
    fn test_inversion_fit_uses_evidence() {
        let mapping = MappingMatrix::from_blurred(DMatrix::identity(3, 3));
        let h = RegularizationMatrix::from_matrix(DMatrix::identity(3, 3)).unwrap();
        let inv = Inversion::new(
            mapping,
            h,
            DVector::from_element(3, 2.0),
            DVector::from_element(3, 1.0),
        )
        .unwrap()
        .solve()
        .unwrap();
        let fit = ImageFit::from_inversion(inv).unwrap();
        let evidence = fit.evidence().unwrap();
        assert_eq!(fit.figure_of_merit(), evidence);
        assert!(fit.likelihood_with_regularization().unwrap() > evidence);
        assert!(fit.model_image().iter().all(|m| (m - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_profile_image_is_added_back() {
        let mapping = MappingMatrix::from_blurred(DMatrix::identity(2, 2));
        let h = RegularizationMatrix::from_matrix(DMatrix::identity(2, 2)).unwrap();
        let image = DVector::from_vec(vec![5.0, 7.0]);
        let profile = DVector::from_vec(vec![3.0, 3.0]);
        let fit = ImageFit::with_profile_image(
            image,
            DVector::from_element(2, 1.0),
            profile,
            mapping,
            h,
        )
        .unwrap();
        // Residual flux [2, 4] reconstructs to [1, 2] with F = H = I.
        let recon = fit.inversion().unwrap().reconstruction();
        assert!((recon[0] - 1.0).abs() < 1e-12);
        assert!((recon[1] - 2.0).abs() < 1e-12);
        assert!((fit.model_image()[0] - 4.0).abs() < 1e-12);
        assert!((fit.model_image()[1] - 5.0).abs() < 1e-12);
        assert!((fit.chi_squared() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_noise() {
        let v = DVector::from_element(2, 1.0);
        let err = ImageFit::from_model(v.clone(), DVector::from_vec(vec![1.0, -1.0]), v).unwrap_err();
        assert!(matches!(err, ReconError::SingularSystem(_)));
    }
}
