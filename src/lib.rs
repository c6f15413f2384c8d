//! # lensrecon
//!
//! Adaptive **source-plane reconstruction** for strong gravitational lensing.
//!
//! Given the source-plane positions of an image's ray-traced sub-pixels,
//! `lensrecon` builds an adaptive Voronoi pixelization of the source, maps
//! every sub-pixel onto it, and solves a regularized linear inversion for the
//! source brightness. The Bayesian evidence of that inversion scores the lens
//! model that produced the traced coordinates.
//!
//! ## Example
//!
//! ```no_run
//! use lensrecon::{reconstruct, IdentityBlur, ReconstructionConfig, SourcePlane};
//!
//! # let traced = vec![];
//! # let border_mask: Vec<bool> = vec![];
//! # let image: Vec<f64> = vec![];
//! # let noise: Vec<f64> = vec![];
//! // `traced` holds pixel_count · 2² source-plane coordinates, grouped by pixel.
//! let plane = SourcePlane::new(traced);
//! let config = ReconstructionConfig {
//!     cell_count: 40,
//!     sub_grid_size: 2,
//!     ..Default::default()
//! };
//! let blur = IdentityBlur::new(image.len());
//! let result = reconstruct(&plane, &border_mask, &image, &noise, &blur, &config).unwrap();
//! println!("evidence {:.3}", result.evidence());
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Border relocation**: fit radius(θ) through the traced border
//!    sub-pixels and pull everything outside the curve back onto it
//! 2. **Pixelization**: weighted k-means places the cell centers; a Delaunay
//!    triangulation of the centers gives the Voronoi neighbors
//! 3. **Assignment**: nearest cell per sub-pixel, either exhaustively or by
//!    walking the neighbor graph from a sparse sample's cell
//! 4. **Matrices**: mapping matrix (sub-pixel fractions, blurred by the PSF)
//!    and regularization matrix (neighbor smoothness)
//! 5. **Inversion**: Cholesky solve of `(F + H) s = D`, then χ², `sᵀHs`,
//!    log-determinants and evidence
//!

pub mod coordinate;
pub mod error;
pub mod fit;
pub mod inversion;
pub mod pixelization;
pub mod reconstruct;
pub mod source_plane;

pub use coordinate::{angle_from_x, radius, Coordinate};
pub use error::{NumericalWarning, ReconError, Result};
pub use fit::ImageFit;
pub use inversion::{
    BlurringOperator, Evidence, IdentityBlur, Inversion, KernelConvolver, MappingMatrix,
    RegularizationMatrix, Solved, SolvedInversion, Unsolved,
};
pub use pixelization::{
    AdjacencyGraph, AssignmentStrategy, Cell, KMeansConfig, Pixelization, PixelizationCache,
};
pub use reconstruct::{reconstruct, reconstruct_with_cache, ReconstructionConfig, SourceReconstruction};
pub use source_plane::{SourcePlane, SourcePlaneBorder, SparseSourcePlane};
