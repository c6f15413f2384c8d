//! Explicit cache of pixelization geometry.
//!
//! Building a pixelization (k-means + Delaunay) dominates the cost of one
//! evaluation, and a sampler often revisits identical traced grids. The cache
//! is an ordinary value the caller owns and shares; there is no global state.
//! Keys are built from the exact bit patterns of every input, so a hit always
//! returns the geometry the same inputs would have produced.
//!
//! The cache holds at most `capacity` geometries. Inserting past that evicts
//! the least recently used entry, so a long sampling run that keeps tracing
//! new grids uses bounded memory.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::coordinate::Coordinate;
use crate::error::Result;

use super::{KMeansConfig, Pixelization};

/// Exact-bit identity of a pixelization's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeometryKey {
    coordinates: Vec<(u64, u64)>,
    cell_count: usize,
    clustering_weights: Option<Vec<u64>>,
    regularization_weights: Option<Vec<u64>>,
    max_iterations: usize,
    tolerance: u64,
    seed: u64,
}

impl GeometryKey {
    pub fn new(
        coordinates: &[Coordinate],
        cell_count: usize,
        clustering_weights: Option<&[f64]>,
        regularization_weights: Option<&[f64]>,
        config: &KMeansConfig,
    ) -> Self {
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        Self {
            coordinates: coordinates
                .iter()
                .map(|c| (c.x.to_bits(), c.y.to_bits()))
                .collect(),
            cell_count,
            clustering_weights: clustering_weights.map(bits),
            regularization_weights: regularization_weights.map(bits),
            max_iterations: config.max_iterations,
            tolerance: config.tolerance.to_bits(),
            seed: config.seed,
        }
    }
}

/// Number of geometries kept by [`PixelizationCache::new`].
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct Entries {
    /// Pixelization and the tick of its last use.
    map: HashMap<GeometryKey, (Arc<Pixelization>, u64)>,
    tick: u64,
}

impl Entries {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, (_, used))| *used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.map.remove(&key);
        }
    }
}

/// Thread-safe, bounded map from [`GeometryKey`] to shared pixelizations.
#[derive(Debug)]
pub struct PixelizationCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl Default for PixelizationCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl PixelizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` geometries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The cached pixelization for these inputs, building it on a miss.
    ///
    /// The lock is not held while building; if two workers race on the same
    /// key, the first insert wins and both receive that value.
    pub fn get_or_build(
        &self,
        coordinates: &[Coordinate],
        cell_count: usize,
        clustering_weights: Option<&[f64]>,
        regularization_weights: Option<&[f64]>,
        config: &KMeansConfig,
    ) -> Result<Arc<Pixelization>> {
        let key = GeometryKey::new(
            coordinates,
            cell_count,
            clustering_weights,
            regularization_weights,
            config,
        );
        {
            let mut entries = self.entries.lock();
            let tick = entries.next_tick();
            if let Some((hit, used)) = entries.map.get_mut(&key) {
                *used = tick;
                return Ok(Arc::clone(hit));
            }
        }

        let mut pix = Pixelization::build(coordinates, cell_count, clustering_weights, config)?;
        if let Some(w) = regularization_weights {
            pix = pix.with_regularization_weights(w.to_vec())?;
        }

        let mut entries = self.entries.lock();
        let tick = entries.next_tick();
        if let Some((raced, used)) = entries.map.get_mut(&key) {
            *used = tick;
            return Ok(Arc::clone(raced));
        }
        if entries.map.len() >= self.capacity {
            entries.evict_least_recent();
        }
        let shared = Arc::new(pix);
        entries.map.insert(key, (Arc::clone(&shared), tick));
        debug!(
            "Pixelization cache miss, {}/{} entries",
            entries.map.len(),
            self.capacity
        );
        Ok(shared)
    }

    /// Drop the entry for these inputs. Returns `true` if one was present.
    pub fn invalidate(
        &self,
        coordinates: &[Coordinate],
        cell_count: usize,
        clustering_weights: Option<&[f64]>,
        regularization_weights: Option<&[f64]>,
        config: &KMeansConfig,
    ) -> bool {
        let key = GeometryKey::new(
            coordinates,
            cell_count,
            clustering_weights,
            regularization_weights,
            config,
        );
        self.entries.lock().map.remove(&key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().map.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().map.is_empty()
    }
}
