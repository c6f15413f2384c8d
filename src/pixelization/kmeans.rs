//! Weighted k-means clustering of traced coordinates into cell centers.
//!
//! Seeding is k-means++ (probability ∝ weight · D²) from a seeded `StdRng`, so
//! the same inputs always give the same centers. Lloyd iterations then move
//! each center to the weighted mean of its members until the largest center
//! shift drops below `tolerance × extent` or `max_iterations` is reached.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing::debug;

use crate::coordinate::Coordinate;
use crate::error::{ReconError, Result};

use super::assignment::assign_exhaustive;

/// Parameters for the weighted k-means clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansConfig {
    /// Maximum Lloyd iterations. Default 300.
    pub max_iterations: usize,
    /// Convergence threshold on the largest center shift, as a fraction of
    /// the bounding-box diagonal of the input. Default 1e-6.
    pub tolerance: f64,
    /// Seed for k-means++ initialization. Default 0.
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            tolerance: 1e-6,
            seed: 0,
        }
    }
}

/// Output of [`weighted_kmeans`].
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// One center per cell.
    pub centers: Vec<Coordinate>,
    /// Cluster index of every input coordinate.
    pub labels: Vec<usize>,
    /// Weighted sum of squared distances to the assigned centers.
    pub inertia: f64,
    /// Lloyd iterations performed.
    pub iterations: usize,
}

/// Cluster `coordinates` into `cell_count` weighted k-means centers.
///
/// `weights`, if given, must have one non-negative finite entry per
/// coordinate and at least one positive entry. Fails with
/// [`ReconError::Clustering`] if `cell_count` is zero or exceeds the number of
/// distinct (positively weighted) coordinates.
pub fn weighted_kmeans(
    coordinates: &[Coordinate],
    weights: Option<&[f64]>,
    cell_count: usize,
    config: &KMeansConfig,
) -> Result<KMeansResult> {
    if cell_count == 0 {
        return Err(ReconError::Clustering("cell count must be positive".into()));
    }
    if let Some(bad) = coordinates.iter().position(|c| !c.is_finite()) {
        return Err(ReconError::Clustering(format!(
            "coordinate {} is not finite",
            bad
        )));
    }
    let weights: Vec<f64> = match weights {
        Some(w) => {
            if w.len() != coordinates.len() {
                return Err(ReconError::Clustering(format!(
                    "{} clustering weights for {} coordinates",
                    w.len(),
                    coordinates.len()
                )));
            }
            if w.iter().any(|&v| !v.is_finite() || v < 0.0) {
                return Err(ReconError::Clustering(
                    "clustering weights must be finite and non-negative".into(),
                ));
            }
            w.to_vec()
        }
        None => vec![1.0; coordinates.len()],
    };

    let distinct = count_distinct(coordinates, &weights);
    if cell_count > distinct {
        return Err(ReconError::Clustering(format!(
            "cannot form {} cells from {} distinct coordinates",
            cell_count, distinct
        )));
    }

    let extent = bounding_diagonal(coordinates);
    let shift_limit = config.tolerance * extent;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut centers = kmeans_plus_plus(coordinates, &weights, cell_count, &mut rng);
    let mut labels = assign_exhaustive(coordinates, &centers)?;
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let mut sum_x = vec![0.0; cell_count];
        let mut sum_y = vec![0.0; cell_count];
        let mut sum_w = vec![0.0; cell_count];
        for ((c, &label), &w) in coordinates.iter().zip(&labels).zip(&weights) {
            sum_x[label] += w * c.x;
            sum_y[label] += w * c.y;
            sum_w[label] += w;
        }

        let mut max_shift = 0.0_f64;
        let mut new_centers = centers.clone();
        for k in 0..cell_count {
            if sum_w[k] > 0.0 {
                new_centers[k] = Coordinate::new(sum_x[k] / sum_w[k], sum_y[k] / sum_w[k]);
            }
        }

        // Empty clusters take the member farthest from its own center.
        for k in 0..cell_count {
            if sum_w[k] > 0.0 {
                continue;
            }
            if let Some(far) = farthest_point(coordinates, &weights, &labels, &new_centers) {
                debug!("k-means: re-seeding empty cluster {} at point {}", k, far);
                new_centers[k] = coordinates[far];
                labels[far] = k;
            }
        }

        for (old, new) in centers.iter().zip(&new_centers) {
            max_shift = max_shift.max(old.squared_distance(new).sqrt());
        }
        centers = new_centers;
        labels = assign_exhaustive(coordinates, &centers)?;

        if max_shift <= shift_limit {
            break;
        }
    }

    let inertia = coordinates
        .iter()
        .zip(&labels)
        .zip(&weights)
        .map(|((c, &l), &w)| w * c.squared_distance(&centers[l]))
        .sum();

    debug!(
        "k-means: {} points -> {} cells in {} iterations, inertia {:.4e}",
        coordinates.len(),
        cell_count,
        iterations,
        inertia
    );

    Ok(KMeansResult {
        centers,
        labels,
        inertia,
        iterations,
    })
}

/// k-means++ seeding: first center ∝ weight, subsequent ∝ weight · D².
fn kmeans_plus_plus(
    coordinates: &[Coordinate],
    weights: &[f64],
    cell_count: usize,
    rng: &mut StdRng,
) -> Vec<Coordinate> {
    let mut centers = Vec::with_capacity(cell_count);
    let first = sample_index(weights, rng);
    centers.push(coordinates[first]);

    let mut d2: Vec<f64> = coordinates
        .iter()
        .map(|c| c.squared_distance(&centers[0]))
        .collect();

    while centers.len() < cell_count {
        let scores: Vec<f64> = d2.iter().zip(weights).map(|(&d, &w)| d * w).collect();
        let next = sample_index(&scores, rng);
        let center = coordinates[next];
        centers.push(center);
        for (d, c) in d2.iter_mut().zip(coordinates) {
            *d = d.min(c.squared_distance(&center));
        }
    }
    centers
}

/// Draw an index with probability proportional to `scores`.
///
/// Falls back to the largest score when the total is zero or rounding leaves
/// the cumulative sum short of the draw.
fn sample_index(scores: &[f64], rng: &mut StdRng) -> usize {
    let total: f64 = scores.iter().sum();
    let argmax = scores
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &s)| {
            if s > best.1 {
                (i, s)
            } else {
                best
            }
        })
        .0;
    if total <= 0.0 || !total.is_finite() {
        return argmax;
    }
    let target = rng.random::<f64>() * total;
    let mut acc = 0.0;
    for (i, &s) in scores.iter().enumerate() {
        acc += s;
        if s > 0.0 && acc >= target {
            return i;
        }
    }
    argmax
}

/// Positively weighted point farthest from its assigned center.
fn farthest_point(
    coordinates: &[Coordinate],
    weights: &[f64],
    labels: &[usize],
    centers: &[Coordinate],
) -> Option<usize> {
    coordinates
        .iter()
        .enumerate()
        .filter(|(i, _)| weights[*i] > 0.0)
        .map(|(i, c)| (i, c.squared_distance(&centers[labels[i]])))
        .filter(|(_, d)| *d > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Number of distinct coordinates among those with positive weight.
fn count_distinct(coordinates: &[Coordinate], weights: &[f64]) -> usize {
    let mut pts: Vec<(f64, f64)> = coordinates
        .iter()
        .zip(weights)
        .filter(|(_, &w)| w > 0.0)
        .map(|(c, _)| (c.x, c.y))
        .collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();
    pts.len()
}

fn bounding_diagonal(coordinates: &[Coordinate]) -> f64 {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for c in coordinates {
        min_x = min_x.min(c.x);
        min_y = min_y.min(c.y);
        max_x = max_x.max(c.x);
        max_y = max_y.max(c.y);
    }
    if coordinates.is_empty() {
        return 0.0;
    }
    ((max_x - min_x).powi(2) + (max_y - min_y).powi(2)).sqrt()
}
