//! Nearest-cell assignment of traced sub-pixels.
//!
//! Two interchangeable strategies produce, for every sub-pixel, the index of
//! its nearest cell center (squared Euclidean distance):
//!
//! - **Exhaustive**: scan every center. O(N·K), always correct; the reference.
//! - **Sparse pairs**: start at the cell already assigned to the sub-pixel's
//!   nearest sparse sample and walk the Voronoi adjacency graph towards any
//!   strictly closer neighbor until none is closer. On a Delaunay-consistent
//!   graph the local optimum is the global one, so this turns an O(K) scan into
//!   a walk of a few hops.

use crate::coordinate::Coordinate;
use crate::error::{ReconError, Result};

use super::voronoi::AdjacencyGraph;

/// Which assignment strategy a reconstruction uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentStrategy {
    /// Brute-force scan of all cell centers.
    #[default]
    Exhaustive,
    /// Sparse-sample seeded neighbor walk over the adjacency graph. The
    /// reconstruction pipeline also clusters the sparse sample instead of
    /// every sub-pixel when this strategy is selected.
    SparsePairs,
}

/// Index of the nearest center for every coordinate (first minimum wins ties).
pub fn assign_exhaustive(coordinates: &[Coordinate], centers: &[Coordinate]) -> Result<Vec<usize>> {
    if centers.is_empty() {
        return Err(ReconError::Geometry(
            "cannot assign coordinates to an empty set of cells".into(),
        ));
    }
    Ok(coordinates
        .iter()
        .map(|c| nearest_center(c, centers))
        .collect())
}

#[inline]
fn nearest_center(coordinate: &Coordinate, centers: &[Coordinate]) -> usize {
    let mut best = 0;
    let mut best_d2 = coordinate.squared_distance(&centers[0]);
    for (k, center) in centers.iter().enumerate().skip(1) {
        let d2 = coordinate.squared_distance(center);
        if d2 < best_d2 {
            best_d2 = d2;
            best = k;
        }
    }
    best
}

/// Nearest-center assignment seeded from a sparse sample.
///
/// - `sub_to_sparse[i]`: sparse sample nearest to sub-pixel `i`.
/// - `sparse_to_cell[j]`: cell already assigned (exhaustively) to sparse sample `j`.
///
/// Fails with [`ReconError::Convergence`] if a walk does not settle within
/// `cell_count` steps or reaches a neighbor index outside the graph, and with
/// [`ReconError::Geometry`] if the index tables are inconsistent.
pub fn assign_via_sparse_pairs(
    coordinates: &[Coordinate],
    centers: &[Coordinate],
    adjacency: &AdjacencyGraph,
    sub_to_sparse: &[usize],
    sparse_to_cell: &[usize],
) -> Result<Vec<usize>> {
    check_graph(centers, adjacency)?;
    if sub_to_sparse.len() != coordinates.len() {
        return Err(ReconError::Geometry(format!(
            "sub_to_sparse has {} entries for {} sub-pixels",
            sub_to_sparse.len(),
            coordinates.len()
        )));
    }

    coordinates
        .iter()
        .zip(sub_to_sparse)
        .enumerate()
        .map(|(i, (c, &sparse))| {
            let start = *sparse_to_cell.get(sparse).ok_or_else(|| {
                ReconError::Geometry(format!(
                    "sub-pixel {} maps to sparse sample {} but only {} are assigned",
                    i,
                    sparse,
                    sparse_to_cell.len()
                ))
            })?;
            walk_to_nearest(i, c, centers, adjacency, start)
        })
        .collect()
}

fn check_graph(centers: &[Coordinate], adjacency: &AdjacencyGraph) -> Result<()> {
    if adjacency.cell_count() != centers.len() {
        return Err(ReconError::Geometry(format!(
            "adjacency graph has {} cells but {} centers were given",
            adjacency.cell_count(),
            centers.len()
        )));
    }
    Ok(())
}

/// Walk from `start` to the locally nearest cell for one sub-pixel.
///
/// `adjacency` must describe exactly `centers` ([`ReconError::Geometry`]
/// otherwise).
pub fn walk_to_nearest(
    sub_pixel: usize,
    coordinate: &Coordinate,
    centers: &[Coordinate],
    adjacency: &AdjacencyGraph,
    start: usize,
) -> Result<usize> {
    check_graph(centers, adjacency)?;
    let max_steps = centers.len();
    let convergence_error = || ReconError::Convergence {
        sub_pixel,
        max_steps,
    };

    let mut current = start;
    let mut current_d2 = coordinate.squared_distance(centers.get(current).ok_or_else(convergence_error)?);

    for _ in 0..max_steps {
        let mut best: Option<(usize, f64)> = None;
        for &n in adjacency.neighbors(current) {
            let d2 = coordinate.squared_distance(centers.get(n).ok_or_else(convergence_error)?);
            if best.map_or(true, |(_, bd)| d2 < bd) {
                best = Some((n, d2));
            }
        }
        match best {
            Some((n, d2)) if d2 < current_d2 => {
                current = n;
                current_d2 = d2;
            }
            _ => return Ok(current),
        }
    }
    Err(convergence_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_centers() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_exhaustive() {
        let coords = vec![
            Coordinate::new(0.1, 0.1),
            Coordinate::new(0.9, 0.2),
            Coordinate::new(0.8, 0.9),
            Coordinate::new(-2.0, 3.0),
        ];
        let a = assign_exhaustive(&coords, &square_centers()).unwrap();
        assert_eq!(a, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_exhaustive_tie_takes_first() {
        let a = assign_exhaustive(&[Coordinate::new(0.5, 0.5)], &square_centers()).unwrap();
        assert_eq!(a, vec![0]);
    }

    #[test]
    fn test_exhaustive_empty_centers() {
        assert!(assign_exhaustive(&[Coordinate::default()], &[]).is_err());
    }

    #[test]
    fn test_walk_crosses_cells() {
        // Chain 0 - 1 - 2 - 3 along the square's edges.
        let adjacency = AdjacencyGraph::from_pairs(4, &[(0, 1), (1, 2), (2, 3)]).unwrap();
        let coords = vec![Coordinate::new(0.05, 0.95)];
        let a = assign_via_sparse_pairs(&coords, &square_centers(), &adjacency, &[0], &[0]).unwrap();
        // Greedy walk from 0: neighbor 1 is not closer, so the local optimum is 0
        // on this deliberately incomplete graph.
        assert_eq!(a, vec![0]);

        let full = AdjacencyGraph::from_pairs(4, &[(0, 1), (1, 2), (2, 3), (0, 3), (0, 2)]).unwrap();
        let a = assign_via_sparse_pairs(&coords, &square_centers(), &full, &[0], &[0]).unwrap();
        assert_eq!(a, vec![3]);
    }

    #[test]
    fn test_walk_multiple_hops() {
        let centers: Vec<Coordinate> = (0..6).map(|i| Coordinate::new(i as f64, 0.0)).collect();
        let pairs: Vec<(usize, usize)> = (0..5).map(|i| (i, i + 1)).collect();
        let adjacency = AdjacencyGraph::from_pairs(6, &pairs).unwrap();
        let coords = vec![Coordinate::new(4.8, 0.1)];
        let a = assign_via_sparse_pairs(&coords, &centers, &adjacency, &[0], &[0]).unwrap();
        assert_eq!(a, vec![5]);
    }

    #[test]
    fn test_isolated_start_cell_stays() {
        let adjacency = AdjacencyGraph::from_pairs(4, &[(1, 2)]).unwrap();
        let coords = vec![Coordinate::new(1.0, 1.0)];
        let a = assign_via_sparse_pairs(&coords, &square_centers(), &adjacency, &[0], &[0]).unwrap();
        assert_eq!(a, vec![0]);
    }

    #[test]
    fn test_walk_rejects_mismatched_graph() {
        // Graph over 6 cells, only 4 centers: a neighbor index would be out of range.
        let pairs: Vec<(usize, usize)> = (0..5).map(|i| (i, i + 1)).collect();
        let adjacency = AdjacencyGraph::from_pairs(6, &pairs).unwrap();
        let err = walk_to_nearest(0, &Coordinate::new(5.0, 0.0), &square_centers(), &adjacency, 3)
            .unwrap_err();
        assert!(matches!(err, ReconError::Geometry(_)));
    }

    #[test]
    fn test_bad_start_cell_is_convergence_error() {
        let adjacency = AdjacencyGraph::from_pairs(4, &[(0, 1)]).unwrap();
        let err = assign_via_sparse_pairs(
            &[Coordinate::default()],
            &square_centers(),
            &adjacency,
            &[0],
            &[9],
        )
        .unwrap_err();
        assert!(matches!(err, ReconError::Convergence { sub_pixel: 0, .. }));
    }

    #[test]
    fn test_table_length_mismatch() {
        let adjacency = AdjacencyGraph::from_pairs(4, &[(0, 1)]).unwrap();
        let err = assign_via_sparse_pairs(
            &[Coordinate::default(); 2],
            &square_centers(),
            &adjacency,
            &[0],
            &[0],
        )
        .unwrap_err();
        assert!(matches!(err, ReconError::Geometry(_)));
    }
}
