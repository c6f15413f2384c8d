//! Source-plane coordinate sets.
//!
//! A [`SourcePlane`] owns the traced sub-pixel coordinates of one lens-model
//! evaluation together with the center that all polar geometry is measured
//! from. Operations never mutate a plane in place; relocation returns a new
//! plane so the same traced grid can be reused across evaluations.
//!
//! # Border relocation
//!
//! 1. Select the border coordinates with a boolean mask
//!    ([`SourcePlane::border_from_mask`]).
//! 2. Fit radius(θ) ([`SourcePlaneBorder::fit`]).
//! 3. Pull every coordinate outside the curve back onto it
//!    ([`SourcePlane::relocate_outside_border`]).

pub mod border;

pub use border::SourcePlaneBorder;

use crate::coordinate::{angle_from_x, radius, Coordinate};
use crate::error::{ReconError, Result};

/// Traced sub-pixel coordinates and the center of the source plane.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePlane {
    center: Coordinate,
    coordinates: Vec<Coordinate>,
}

impl SourcePlane {
    /// Create a source plane centered on the origin.
    pub fn new(coordinates: Vec<Coordinate>) -> Self {
        Self::with_center(coordinates, Coordinate::default())
    }

    pub fn with_center(coordinates: Vec<Coordinate>, center: Coordinate) -> Self {
        Self {
            center,
            coordinates,
        }
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Angle (degrees, `[0, 360)`) of a coordinate about this plane's center.
    pub fn angle_from_x(&self, coordinate: &Coordinate) -> f64 {
        angle_from_x(&self.center, coordinate)
    }

    /// Distance of a coordinate from this plane's center.
    pub fn radius(&self, coordinate: &Coordinate) -> f64 {
        radius(&self.center, coordinate)
    }

    /// Fit a border through the coordinates selected by `border_mask`.
    ///
    /// `border_mask` must have one entry per coordinate.
    pub fn border_from_mask(
        &self,
        border_mask: &[bool],
        polynomial_degree: usize,
    ) -> Result<SourcePlaneBorder> {
        if border_mask.len() != self.coordinates.len() {
            return Err(ReconError::Fit(format!(
                "border mask has {} entries for {} coordinates",
                border_mask.len(),
                self.coordinates.len()
            )));
        }
        let selected: Vec<Coordinate> = self
            .coordinates
            .iter()
            .zip(border_mask)
            .filter(|(_, &m)| m)
            .map(|(c, _)| *c)
            .collect();
        SourcePlaneBorder::fit(selected, polynomial_degree, self.center)
    }

    /// A new plane with every coordinate outside `border` moved onto it.
    pub fn relocate_outside_border(&self, border: &SourcePlaneBorder) -> SourcePlane {
        SourcePlane {
            center: self.center,
            coordinates: self
                .coordinates
                .iter()
                .map(|c| border.relocated_coordinate(c))
                .collect(),
        }
    }

    /// Fit the border from `border_mask` and relocate in one step.
    pub fn relocated_with_mask(
        &self,
        border_mask: &[bool],
        polynomial_degree: usize,
    ) -> Result<SourcePlane> {
        let border = self.border_from_mask(border_mask, polynomial_degree)?;
        Ok(self.relocate_outside_border(&border))
    }
}

/// A source plane paired with a low-resolution sample of itself.
///
/// The sparse coordinates are typically the traced centers of the image
/// pixels; `sub_to_sparse[i]` is the sparse sample closest to sub-pixel `i`.
/// This is the input the accelerated cluster assignment walks from.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseSourcePlane {
    plane: SourcePlane,
    sparse_coordinates: Vec<Coordinate>,
    sub_to_sparse: Vec<usize>,
}

impl SparseSourcePlane {
    pub fn new(
        plane: SourcePlane,
        sparse_coordinates: Vec<Coordinate>,
        sub_to_sparse: Vec<usize>,
    ) -> Result<Self> {
        if sub_to_sparse.len() != plane.len() {
            return Err(ReconError::Geometry(format!(
                "sub_to_sparse has {} entries for {} sub-pixels",
                sub_to_sparse.len(),
                plane.len()
            )));
        }
        if let Some(&bad) = sub_to_sparse
            .iter()
            .find(|&&s| s >= sparse_coordinates.len())
        {
            return Err(ReconError::Geometry(format!(
                "sparse index {} out of range for {} sparse coordinates",
                bad,
                sparse_coordinates.len()
            )));
        }
        Ok(Self {
            plane,
            sparse_coordinates,
            sub_to_sparse,
        })
    }

    /// Build the sparse sample from a regular sub-grid.
    ///
    /// Sub-pixels `p·s² .. (p+1)·s²` belong to image pixel `p`; each pixel's
    /// sparse coordinate is the mean of its traced sub-pixels.
    pub fn from_sub_grid(plane: SourcePlane, sub_grid_size: usize) -> Result<Self> {
        let per_pixel = sub_grid_size * sub_grid_size;
        if per_pixel == 0 || plane.len() % per_pixel != 0 {
            return Err(ReconError::Geometry(format!(
                "{} sub-pixels do not tile a sub-grid of size {}",
                plane.len(),
                sub_grid_size
            )));
        }
        let sparse_coordinates: Vec<Coordinate> = plane
            .coordinates()
            .chunks(per_pixel)
            .map(|chunk| {
                let (sx, sy) = chunk
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
                Coordinate::new(sx / per_pixel as f64, sy / per_pixel as f64)
            })
            .collect();
        let sub_to_sparse: Vec<usize> = (0..plane.len()).map(|i| i / per_pixel).collect();
        Self::new(plane, sparse_coordinates, sub_to_sparse)
    }

    pub fn plane(&self) -> &SourcePlane {
        &self.plane
    }

    pub fn sparse_coordinates(&self) -> &[Coordinate] {
        &self.sparse_coordinates
    }

    pub fn sub_to_sparse(&self) -> &[usize] {
        &self.sub_to_sparse
    }

    /// Relocate both the fine and the sparse coordinates onto `border`.
    pub fn relocate_outside_border(&self, border: &SourcePlaneBorder) -> SparseSourcePlane {
        SparseSourcePlane {
            plane: self.plane.relocate_outside_border(border),
            sparse_coordinates: self
                .sparse_coordinates
                .iter()
                .map(|c| border.relocated_coordinate(c))
                .collect(),
            sub_to_sparse: self.sub_to_sparse.clone(),
        }
    }
}
