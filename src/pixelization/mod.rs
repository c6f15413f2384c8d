//! Adaptive Voronoi pixelization of the source plane.
//!
//! Cell centers come from weighted k-means over the traced coordinates, so the
//! cells are small where the lens magnifies the source and large elsewhere.
//! Cells that share a Voronoi ridge are neighbors; the adjacency graph feeds
//! the regularization matrix and the accelerated sub-pixel assignment.
//!
//! A [`Pixelization`] is immutable once built and is `Send + Sync`, so one
//! geometry can be shared (`Arc`) by every evaluation of the same lens model.

pub mod assignment;
pub mod cache;
pub mod kmeans;
pub mod voronoi;

pub use assignment::{assign_exhaustive, assign_via_sparse_pairs, AssignmentStrategy};
pub use cache::{PixelizationCache, DEFAULT_CACHE_CAPACITY};
pub use kmeans::{weighted_kmeans, KMeansConfig, KMeansResult};
pub use voronoi::{voronoi_adjacency, AdjacencyGraph};

use tracing::debug;

use crate::coordinate::Coordinate;
use crate::error::{ReconError, Result};
use crate::source_plane::SparseSourcePlane;

/// A view of one pixelization cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell<'a> {
    pub index: usize,
    pub center: Coordinate,
    pub regularization_weight: f64,
    pub neighbors: &'a [usize],
}

/// Cell centers, regularization weights and Voronoi adjacency.
///
/// Cells are stored by index; neighbors refer to each other by index only.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixelization {
    centers: Vec<Coordinate>,
    regularization_weights: Vec<f64>,
    adjacency: AdjacencyGraph,
}

impl Pixelization {
    /// Cluster `coordinates` into `cell_count` cells and tessellate them.
    ///
    /// `clustering_weights` (one per coordinate) bias k-means towards bright
    /// regions; `None` weights every coordinate equally.
    pub fn build(
        coordinates: &[Coordinate],
        cell_count: usize,
        clustering_weights: Option<&[f64]>,
        config: &KMeansConfig,
    ) -> Result<Self> {
        let clusters = weighted_kmeans(coordinates, clustering_weights, cell_count, config)?;
        let pix = Self::from_centers(clusters.centers)?;
        debug!(
            "Pixelization: {} coordinates -> {} cells, {} neighbor pairs",
            coordinates.len(),
            pix.cell_count(),
            pix.adjacency.pairs().len()
        );
        Ok(pix)
    }

    /// Tessellate given centers. Every regularization weight starts at 1.0.
    pub fn from_centers(centers: Vec<Coordinate>) -> Result<Self> {
        let adjacency = voronoi_adjacency(&centers)?;
        Ok(Self {
            regularization_weights: vec![1.0; centers.len()],
            centers,
            adjacency,
        })
    }

    /// Replace the per-cell regularization weights.
    pub fn with_regularization_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != self.centers.len() {
            return Err(ReconError::Geometry(format!(
                "{} regularization weights for {} cells",
                weights.len(),
                self.centers.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(ReconError::Geometry(
                "regularization weights must be finite".into(),
            ));
        }
        self.regularization_weights = weights;
        Ok(self)
    }

    pub fn cell_count(&self) -> usize {
        self.centers.len()
    }

    pub fn cell(&self, index: usize) -> Option<Cell<'_>> {
        let center = *self.centers.get(index)?;
        Some(Cell {
            index,
            center,
            regularization_weight: self.regularization_weights[index],
            neighbors: self.adjacency.neighbors(index),
        })
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell<'_>> + '_ {
        (0..self.cell_count()).filter_map(move |i| self.cell(i))
    }

    pub fn centers(&self) -> &[Coordinate] {
        &self.centers
    }

    pub fn regularization_weights(&self) -> &[f64] {
        &self.regularization_weights
    }

    pub fn adjacency(&self) -> &AdjacencyGraph {
        &self.adjacency
    }

    /// Cell index of every sub-pixel of `plane`.
    ///
    /// [`AssignmentStrategy::SparsePairs`] first assigns the sparse samples
    /// exhaustively, then walks each sub-pixel from its sample's cell.
    pub fn assign(
        &self,
        plane: &SparseSourcePlane,
        strategy: AssignmentStrategy,
    ) -> Result<Vec<usize>> {
        let coordinates = plane.plane().coordinates();
        match strategy {
            AssignmentStrategy::Exhaustive => assign_exhaustive(coordinates, &self.centers),
            AssignmentStrategy::SparsePairs => {
                let sparse_to_cell = assign_exhaustive(plane.sparse_coordinates(), &self.centers)?;
                assign_via_sparse_pairs(
                    coordinates,
                    &self.centers,
                    &self.adjacency,
                    plane.sub_to_sparse(),
                    &sparse_to_cell,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_plane::SourcePlane;

    fn grid(n: usize) -> Vec<Coordinate> {
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                pts.push(Coordinate::new(i as f64 / n as f64, j as f64 / n as f64));
            }
        }
        pts
    }

    fn sunflower(n: usize) -> Vec<Coordinate> {
        (0..n)
            .map(|i| {
                let t = i as f64 * 2.399963;
                let r = (i as f64 + 0.5).sqrt();
                Coordinate::new(r * t.cos(), r * t.sin())
            })
            .collect()
    }

    #[test]
    fn test_build() {
        let pix = Pixelization::build(&grid(12), 10, None, &KMeansConfig::default()).unwrap();
        assert_eq!(pix.cell_count(), 10);
        assert!(pix.adjacency().is_connected());
        assert!(pix.cells().all(|c| c.regularization_weight == 1.0));
        for cell in pix.cells() {
            assert!(!cell.neighbors.is_empty());
            assert!(cell.neighbors.iter().all(|&n| n != cell.index));
        }
    }

    #[test]
    fn test_regularization_weights() {
        let centers = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(0.0, 1.0),
        ];
        let pix = Pixelization::from_centers(centers)
            .unwrap()
            .with_regularization_weights(vec![1.0, 2.0, 3.0])
            .unwrap();
        assert_eq!(pix.cell(2).unwrap().regularization_weight, 3.0);
        assert!(pix.cell(3).is_none());
        let err = pix.clone().with_regularization_weights(vec![1.0]).unwrap_err();
        assert!(matches!(err, ReconError::Geometry(_)));
    }

    #[test]
    fn test_strategies_agree() {
        let plane = SourcePlane::new(sunflower(64));
        let sparse = SparseSourcePlane::from_sub_grid(plane, 2).unwrap();
        let pix = Pixelization::build(
            sparse.plane().coordinates(),
            7,
            None,
            &KMeansConfig::default(),
        )
        .unwrap();
        let exhaustive = pix.assign(&sparse, AssignmentStrategy::Exhaustive).unwrap();
        let walked = pix.assign(&sparse, AssignmentStrategy::SparsePairs).unwrap();
        assert_eq!(exhaustive, walked);
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pixelization>();
        assert_send_sync::<PixelizationCache>();
    }
}
