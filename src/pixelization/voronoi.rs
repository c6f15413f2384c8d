//! Voronoi adjacency of cell centers.
//!
//! Two cells share a Voronoi ridge exactly when their centers are joined by a
//! Delaunay edge, so the adjacency graph is read off a Delaunay triangulation
//! of the centers.
//!
//! ## Algorithm
//!
//! 1. Normalize the centers to unit scale about their mean.
//! 2. Bowyer–Watson: insert points one at a time into a triangulation seeded
//!    with a large enclosing triangle, re-triangulating the cavity of every
//!    triangle whose circumcircle contains the new point.
//! 3. Collect every edge between two real centers.
//! 4. Add the convex-hull edges (unbounded ridges), which the finite enclosing
//!    triangle can otherwise shadow for nearly collinear hull points.
//!
//! The graph is stored as an arena of index lists. Cells never own each other.

use std::collections::BTreeSet;

use tracing::debug;

use crate::coordinate::Coordinate;
use crate::error::{ReconError, Result};

/// Half-size of the enclosing triangle, in normalized units.
const SUPER_TRIANGLE_SCALE: f64 = 1.0e4;

/// Relative tolerance for coincident / collinear center detection.
const DEGENERACY_TOLERANCE: f64 = 1e-12;

/// Undirected cell adjacency graph.
///
/// `neighbors[i]` lists the cells sharing a ridge with cell `i` (sorted, no
/// duplicates); `pairs` lists every edge once as `(i, j)` with `i < j`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyGraph {
    neighbors: Vec<Vec<usize>>,
    pairs: Vec<(usize, usize)>,
}

impl AdjacencyGraph {
    /// Build a graph from an edge list.
    ///
    /// Edges may be given in either orientation and may repeat; they are
    /// normalized to `i < j` and deduplicated. Self-loops and out-of-range
    /// indices are rejected.
    pub fn from_pairs(cell_count: usize, pairs: &[(usize, usize)]) -> Result<Self> {
        let mut unique = BTreeSet::new();
        for &(a, b) in pairs {
            if a >= cell_count || b >= cell_count {
                return Err(ReconError::Geometry(format!(
                    "edge ({}, {}) out of range for {} cells",
                    a, b, cell_count
                )));
            }
            if a == b {
                return Err(ReconError::Geometry(format!("self-loop on cell {}", a)));
            }
            unique.insert((a.min(b), a.max(b)));
        }

        let mut neighbors = vec![Vec::new(); cell_count];
        for &(i, j) in &unique {
            neighbors[i].push(j);
            neighbors[j].push(i);
        }
        for n in neighbors.iter_mut() {
            n.sort_unstable();
        }

        Ok(Self {
            neighbors,
            pairs: unique.into_iter().collect(),
        })
    }

    pub fn cell_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Cells adjacent to cell `i`.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighbors[i].len()
    }

    /// Neighbor count of every cell.
    pub fn neighbor_counts(&self) -> Vec<usize> {
        self.neighbors.iter().map(Vec::len).collect()
    }

    /// Every edge once, `i < j`, in lexicographic order.
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.neighbors
            .get(i)
            .is_some_and(|n| n.binary_search(&j).is_ok())
    }

    /// `true` if every cell can reach every other.
    pub fn is_connected(&self) -> bool {
        let n = self.cell_count();
        if n == 0 {
            return true;
        }
        let mut seen = vec![false; n];
        let mut stack = vec![0];
        seen[0] = true;
        let mut visited = 1;
        while let Some(i) = stack.pop() {
            for &j in &self.neighbors[i] {
                if !seen[j] {
                    seen[j] = true;
                    visited += 1;
                    stack.push(j);
                }
            }
        }
        visited == n
    }
}

/// Adjacency graph of the Voronoi tessellation of `centers`.
///
/// Fails with [`ReconError::Geometry`] for fewer than three centers,
/// coincident centers, or all-collinear centers.
pub fn voronoi_adjacency(centers: &[Coordinate]) -> Result<AdjacencyGraph> {
    let n = centers.len();
    if n < 3 {
        return Err(ReconError::Geometry(format!(
            "a Voronoi tessellation needs at least 3 centers, got {}",
            n
        )));
    }
    if let Some(bad) = centers.iter().position(|c| !c.is_finite()) {
        return Err(ReconError::Geometry(format!(
            "cell center {} is not finite",
            bad
        )));
    }

    let points = normalize(centers);
    check_degenerate(&points)?;

    let triangles = bowyer_watson(&points);

    let mut edges: Vec<(usize, usize)> = Vec::with_capacity(3 * n);
    for t in &triangles {
        for k in 0..3 {
            let a = t[k];
            let b = t[(k + 1) % 3];
            if a < n && b < n {
                edges.push((a, b));
            }
        }
    }
    edges.extend(hull_edges(&points));

    let graph = AdjacencyGraph::from_pairs(n, &edges)?;
    debug!(
        "Voronoi adjacency: {} cells, {} ridges, {} triangles",
        n,
        graph.pairs().len(),
        triangles.len()
    );
    Ok(graph)
}

/// Translate to the mean and scale so the largest |coordinate| is 1.
fn normalize(centers: &[Coordinate]) -> Vec<(f64, f64)> {
    let n = centers.len() as f64;
    let mx = centers.iter().map(|c| c.x).sum::<f64>() / n;
    let my = centers.iter().map(|c| c.y).sum::<f64>() / n;
    let scale = centers
        .iter()
        .map(|c| (c.x - mx).abs().max((c.y - my).abs()))
        .fold(0.0, f64::max);
    let scale = if scale > 0.0 { scale } else { 1.0 };
    centers
        .iter()
        .map(|c| ((c.x - mx) / scale, (c.y - my) / scale))
        .collect()
}

fn check_degenerate(points: &[(f64, f64)]) -> Result<()> {
    let mut sorted: Vec<(usize, (f64, f64))> = points.iter().copied().enumerate().collect();
    sorted.sort_by(|a, b| a.1 .0.total_cmp(&b.1 .0).then(a.1 .1.total_cmp(&b.1 .1)));
    let tol2 = DEGENERACY_TOLERANCE * DEGENERACY_TOLERANCE;
    for w in sorted.windows(2) {
        let (ia, a) = w[0];
        let (ib, b) = w[1];
        if (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) <= tol2 {
            return Err(ReconError::Geometry(format!(
                "cell centers {} and {} coincide",
                ia.min(ib),
                ia.max(ib)
            )));
        }
    }

    // Collinear iff every point has ~zero cross product against the line
    // through the two most separated points.
    let (p, q) = farthest_pair_from_first(points);
    let dx = points[q].0 - points[p].0;
    let dy = points[q].1 - points[p].1;
    let len = (dx * dx + dy * dy).sqrt();
    let all_collinear = points.iter().all(|r| {
        let cross = dx * (r.1 - points[p].1) - dy * (r.0 - points[p].0);
        cross.abs() <= DEGENERACY_TOLERANCE * len.max(1.0)
    });
    if all_collinear {
        return Err(ReconError::Geometry(
            "all cell centers are collinear".into(),
        ));
    }
    Ok(())
}

/// A well separated pair: the point farthest from point 0, then the point
/// farthest from that one.
fn farthest_pair_from_first(points: &[(f64, f64)]) -> (usize, usize) {
    let farthest_from = |i: usize| {
        let (x0, y0) = points[i];
        points
            .iter()
            .enumerate()
            .map(|(j, &(x, y))| (j, (x - x0).powi(2) + (y - y0).powi(2)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(j, _)| j)
            .unwrap_or(i)
    };
    let p = farthest_from(0);
    let q = farthest_from(p);
    (p, q)
}

/// Twice the signed area of (a, b, c); positive when counter-clockwise.
#[inline]
fn orient(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

/// `true` if `d` lies strictly inside the circumcircle of CCW triangle (a, b, c).
#[inline]
fn in_circumcircle(a: (f64, f64), b: (f64, f64), c: (f64, f64), d: (f64, f64)) -> bool {
    let (adx, ady) = (a.0 - d.0, a.1 - d.1);
    let (bdx, bdy) = (b.0 - d.0, b.1 - d.1);
    let (cdx, cdy) = (c.0 - d.0, c.1 - d.1);
    let ad = adx * adx + ady * ady;
    let bd = bdx * bdx + bdy * bdy;
    let cd = cdx * cdx + cdy * cdy;
    let det = ad * (bdx * cdy - cdx * bdy) - bd * (adx * cdy - cdx * ady)
        + cd * (adx * bdy - bdx * ady);
    det > 0.0
}

/// Bowyer–Watson triangulation. Returns CCW vertex triples; indices `>= n`
/// refer to the enclosing triangle.
fn bowyer_watson(points: &[(f64, f64)]) -> Vec<[usize; 3]> {
    let n = points.len();
    let s = SUPER_TRIANGLE_SCALE;
    let mut vertices: Vec<(f64, f64)> = points.to_vec();
    vertices.push((-s, -s));
    vertices.push((s, -s));
    vertices.push((0.0, s));

    let mut triangles: Vec<[usize; 3]> = vec![[n, n + 1, n + 2]];

    for i in 0..n {
        let p = vertices[i];

        let (bad, good): (Vec<[usize; 3]>, Vec<[usize; 3]>) =
            triangles.into_iter().partition(|t| {
                in_circumcircle(vertices[t[0]], vertices[t[1]], vertices[t[2]], p)
            });

        // Cavity boundary: edges of bad triangles not shared with another bad one.
        let mut boundary: Vec<(usize, usize)> = Vec::new();
        for t in &bad {
            for k in 0..3 {
                let e = (t[k], t[(k + 1) % 3]);
                let shared = bad.iter().any(|u| {
                    u != t && (0..3).any(|m| (u[m], u[(m + 1) % 3]) == (e.1, e.0))
                });
                if !shared {
                    boundary.push(e);
                }
            }
        }

        triangles = good;
        for (a, b) in boundary {
            let tri = if orient(vertices[a], vertices[b], p) >= 0.0 {
                [a, b, i]
            } else {
                [b, a, i]
            };
            triangles.push(tri);
        }
    }

    triangles
}

/// Edges between consecutive points along the convex hull, including points
/// lying on hull edges.
fn hull_edges(points: &[(f64, f64)]) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        points[a]
            .0
            .total_cmp(&points[b].0)
            .then(points[a].1.total_cmp(&points[b].1))
    });

    // Andrew's monotone chain, strict turns only.
    let mut hull: Vec<usize> = Vec::with_capacity(2 * points.len());
    let extend_chain = |hull: &mut Vec<usize>, chain: &mut dyn Iterator<Item = usize>| {
        let start = hull.len();
        for i in chain {
            while hull.len() >= start + 2
                && orient(
                    points[hull[hull.len() - 2]],
                    points[hull[hull.len() - 1]],
                    points[i],
                ) <= 0.0
            {
                hull.pop();
            }
            hull.push(i);
        }
        hull.pop();
    };
    extend_chain(&mut hull, &mut order.iter().copied());
    extend_chain(&mut hull, &mut order.iter().rev().copied());

    let mut edges = Vec::new();
    let h = hull.len();
    for k in 0..h {
        let a = hull[k];
        let b = hull[(k + 1) % h];
        let (pa, pb) = (points[a], points[b]);
        let (dx, dy) = (pb.0 - pa.0, pb.1 - pa.1);
        let len2 = dx * dx + dy * dy;

        // Points on the segment split it into consecutive edges.
        let mut on_edge: Vec<(f64, usize)> = points
            .iter()
            .enumerate()
            .filter_map(|(j, &pj)| {
                let t = ((pj.0 - pa.0) * dx + (pj.1 - pa.1) * dy) / len2;
                let cross = orient(pa, pb, pj);
                (cross.abs() <= DEGENERACY_TOLERANCE * len2.max(1.0) && (0.0..=1.0).contains(&t))
                    .then_some((t, j))
            })
            .collect();
        on_edge.sort_by(|x, y| x.0.total_cmp(&y.0));
        for w in on_edge.windows(2) {
            edges.push((w[0].1, w[1].1));
        }
    }
    edges
}
