//! End-to-end source reconstruction for one lens-model evaluation.
//!
//! ```text
//! traced sub-pixels ─► border relocation ─► k-means + Voronoi pixelization
//!        │                                          │
//!        └──────────► sub-pixel → cell assignment ◄─┘
//!                              │
//!               mapping matrix (blurred) + regularization matrix
//!                              │
//!                   inversion ─► evidence / fit diagnostics
//! ```

use std::sync::Arc;

use nalgebra::DVector;
use tracing::debug;

use crate::error::{ReconError, Result};
use crate::fit::ImageFit;
use crate::inversion::{BlurringOperator, Evidence, Inversion, MappingMatrix, RegularizationMatrix};
use crate::pixelization::{AssignmentStrategy, KMeansConfig, Pixelization, PixelizationCache};
use crate::source_plane::{SourcePlane, SparseSourcePlane};

/// Parameters of a reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionConfig {
    /// Number of Voronoi cells in the source plane. Default 50.
    pub cell_count: usize,
    /// Sub-pixels per image pixel along each axis. Default 2.
    pub sub_grid_size: usize,
    /// Polynomial degree of the border fit, or `None` to skip relocation.
    /// Default `Some(3)`.
    pub border: Option<usize>,
    /// How sub-pixels are matched to cells, and whether k-means runs on every
    /// sub-pixel (exhaustive) or on the sparse sample (sparse pairs). Default
    /// exhaustive.
    pub assignment: AssignmentStrategy,
    /// Clustering parameters for the cell centers.
    pub kmeans: KMeansConfig,
    /// Per-cell regularization weights. `None` = all 1.0.
    pub regularization_weights: Option<Vec<f64>>,
    /// Added to the diagonal of the regularization matrix so `ln|H|` stays
    /// finite. Zero uses the matrix exactly as built. Default 1e-8.
    pub regularization_floor: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            cell_count: 50,
            sub_grid_size: 2,
            border: Some(3),
            assignment: AssignmentStrategy::Exhaustive,
            kmeans: KMeansConfig::default(),
            regularization_weights: None,
            regularization_floor: 1e-8,
        }
    }
}

/// Everything produced by [`reconstruct`].
#[derive(Debug, Clone)]
pub struct SourceReconstruction {
    source_plane: SourcePlane,
    pixelization: Arc<Pixelization>,
    sub_to_cell: Vec<usize>,
    reconstruction: DVector<f64>,
    fit: ImageFit,
}

impl SourceReconstruction {
    /// The source plane after border relocation.
    pub fn source_plane(&self) -> &SourcePlane {
        &self.source_plane
    }

    pub fn pixelization(&self) -> &Arc<Pixelization> {
        &self.pixelization
    }

    /// Cell index of every sub-pixel.
    pub fn sub_to_cell(&self) -> &[usize] {
        &self.sub_to_cell
    }

    pub fn fit(&self) -> &ImageFit {
        &self.fit
    }

    /// One flux per cell.
    pub fn reconstruction(&self) -> &DVector<f64> {
        &self.reconstruction
    }

    pub fn model_image(&self) -> &DVector<f64> {
        self.fit.model_image()
    }

    pub fn evidence(&self) -> f64 {
        self.fit.figure_of_merit()
    }

    pub fn evidence_terms(&self) -> Option<&Evidence> {
        self.fit.evidence_terms()
    }
}

/// Reconstruct the source behind `image`.
///
/// `source_plane` holds `pixel_count · s²` traced sub-pixels, grouped by
/// image pixel; `border_mask` selects the border sub-pixels and is ignored
/// when [`ReconstructionConfig::border`] is `None`. `image` and `noise` have
/// one entry per image pixel, in the order `blur` expects.
pub fn reconstruct(
    source_plane: &SourcePlane,
    border_mask: &[bool],
    image: &[f64],
    noise: &[f64],
    blur: &dyn BlurringOperator,
    config: &ReconstructionConfig,
) -> Result<SourceReconstruction> {
    run(source_plane, border_mask, image, noise, blur, config, None)
}

/// [`reconstruct`], taking the pixelization from `cache` when the same
/// relocated coordinates and settings were seen before.
pub fn reconstruct_with_cache(
    cache: &PixelizationCache,
    source_plane: &SourcePlane,
    border_mask: &[bool],
    image: &[f64],
    noise: &[f64],
    blur: &dyn BlurringOperator,
    config: &ReconstructionConfig,
) -> Result<SourceReconstruction> {
    run(source_plane, border_mask, image, noise, blur, config, Some(cache))
}

fn run(
    source_plane: &SourcePlane,
    border_mask: &[bool],
    image: &[f64],
    noise: &[f64],
    blur: &dyn BlurringOperator,
    config: &ReconstructionConfig,
    cache: Option<&PixelizationCache>,
) -> Result<SourceReconstruction> {
    let s = config.sub_grid_size;
    let per_pixel = s * s;
    if per_pixel == 0 || image.len() * per_pixel != source_plane.len() {
        return Err(ReconError::Geometry(format!(
            "{} sub-pixels do not match {} image pixels at sub-grid size {}",
            source_plane.len(),
            image.len(),
            s
        )));
    }

    let plane = match config.border {
        Some(degree) => {
            let relocated = source_plane.relocated_with_mask(border_mask, degree)?;
            debug!(
                "Border relocation: degree {}, {} border sub-pixels",
                degree,
                border_mask.iter().filter(|&&m| m).count()
            );
            relocated
        }
        None => source_plane.clone(),
    };
    let sparse = SparseSourcePlane::from_sub_grid(plane, s)?;

    // Sparse pairs clusters one sample per image pixel.
    let coordinates = match config.assignment {
        AssignmentStrategy::Exhaustive => sparse.plane().coordinates(),
        AssignmentStrategy::SparsePairs => sparse.sparse_coordinates(),
    };
    let weights = config.regularization_weights.as_deref();
    let pixelization = match cache {
        Some(cache) => cache.get_or_build(coordinates, config.cell_count, None, weights, &config.kmeans)?,
        None => {
            let mut pix = Pixelization::build(coordinates, config.cell_count, None, &config.kmeans)?;
            if let Some(w) = weights {
                pix = pix.with_regularization_weights(w.to_vec())?;
            }
            Arc::new(pix)
        }
    };

    let sub_to_cell = pixelization.assign(&sparse, config.assignment)?;
    debug!(
        "Assigned {} sub-pixels to {} cells ({:?})",
        sub_to_cell.len(),
        pixelization.cell_count(),
        config.assignment
    );

    let mapping = MappingMatrix::from_grid(pixelization.cell_count(), image.len(), s, &sub_to_cell)?
        .blurred_with(blur)?;
    let regularization = RegularizationMatrix::from_pixelization(&pixelization)?
        .with_diagonal_floor(config.regularization_floor);

    let inversion = Inversion::new(
        mapping,
        regularization,
        DVector::from_column_slice(image),
        DVector::from_column_slice(noise),
    )?
    .solve()?;
    let reconstruction = inversion.reconstruction().clone();
    let fit = ImageFit::from_inversion(inversion)?;

    debug!(
        "Reconstruction: {} pixels, {} cells, chi2 {:.4e}, evidence {:.6e}",
        image.len(),
        pixelization.cell_count(),
        fit.chi_squared(),
        fit.figure_of_merit()
    );

    Ok(SourceReconstruction {
        source_plane: sparse.plane().clone(),
        pixelization,
        sub_to_cell,
        reconstruction,
        fit,
    })
}
