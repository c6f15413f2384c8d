//! Mapping matrix: the linear map from cell fluxes to image pixels.
//!
//! Stored `cell_count × pixel_count`. Entry `(i, j)` is the fraction of image
//! pixel `j`'s `s²` sub-pixels that trace into cell `i`, so every column of
//! the unblurred matrix sums to one. The blurred matrix applies the
//! point-spread function to each cell's image (each row).
//!
//! Both matrices are dense; memory scales as `cell_count × pixel_count`.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{ReconError, Result};

use super::blurring::BlurringOperator;

#[derive(Debug, Clone, PartialEq)]
pub struct MappingMatrix {
    unblurred: DMatrix<f64>,
    blurred: DMatrix<f64>,
    sub_grid_size: usize,
}

impl MappingMatrix {
    /// Accumulate `1/s²` at `(sub_to_cell[k], sub_to_pixel[k])` for every sub-pixel.
    pub fn new(
        cell_count: usize,
        pixel_count: usize,
        sub_grid_size: usize,
        sub_to_cell: &[usize],
        sub_to_pixel: &[usize],
    ) -> Result<Self> {
        if sub_grid_size == 0 {
            return Err(ReconError::Geometry("sub-grid size must be at least 1".into()));
        }
        let expected = pixel_count * sub_grid_size * sub_grid_size;
        if sub_to_cell.len() != expected || sub_to_pixel.len() != expected {
            return Err(ReconError::Geometry(format!(
                "expected {} sub-pixels ({} pixels, sub-grid {}), got {} cell and {} pixel indices",
                expected,
                pixel_count,
                sub_grid_size,
                sub_to_cell.len(),
                sub_to_pixel.len()
            )));
        }

        let fraction = 1.0 / (sub_grid_size * sub_grid_size) as f64;
        let mut unblurred = DMatrix::<f64>::zeros(cell_count, pixel_count);
        for (k, (&cell, &pixel)) in sub_to_cell.iter().zip(sub_to_pixel).enumerate() {
            if cell >= cell_count || pixel >= pixel_count {
                return Err(ReconError::Geometry(format!(
                    "sub-pixel {} maps to cell {} / pixel {} outside {}x{}",
                    k, cell, pixel, cell_count, pixel_count
                )));
            }
            unblurred[(cell, pixel)] += fraction;
        }

        Ok(Self {
            blurred: unblurred.clone(),
            unblurred,
            sub_grid_size,
        })
    }

    /// [`MappingMatrix::new`] for the canonical layout where sub-pixels
    /// `p·s² .. (p+1)·s²` belong to image pixel `p`.
    pub fn from_grid(
        cell_count: usize,
        pixel_count: usize,
        sub_grid_size: usize,
        sub_to_cell: &[usize],
    ) -> Result<Self> {
        let per_pixel = (sub_grid_size * sub_grid_size).max(1);
        let sub_to_pixel: Vec<usize> = (0..sub_to_cell.len()).map(|k| k / per_pixel).collect();
        Self::new(cell_count, pixel_count, sub_grid_size, sub_to_cell, &sub_to_pixel)
    }

    /// Use an explicit (already blurred) `cell × pixel` matrix for both forms.
    pub fn from_blurred(matrix: DMatrix<f64>) -> Self {
        Self {
            unblurred: matrix.clone(),
            blurred: matrix,
            sub_grid_size: 1,
        }
    }

    /// Blur each cell's image-plane row with `blur`.
    pub fn blurred_with(mut self, blur: &dyn BlurringOperator) -> Result<Self> {
        if blur.pixel_count() != self.pixel_count() {
            return Err(ReconError::Geometry(format!(
                "blurring operator covers {} pixels, mapping matrix has {}",
                blur.pixel_count(),
                self.pixel_count()
            )));
        }
        for i in 0..self.cell_count() {
            let row: Vec<f64> = self.unblurred.row(i).iter().copied().collect();
            let blurred = blur.convolve(&row);
            if blurred.len() != row.len() {
                return Err(ReconError::Geometry(format!(
                    "blurring operator returned {} values for {} pixels",
                    blurred.len(),
                    row.len()
                )));
            }
            for (j, v) in blurred.into_iter().enumerate() {
                self.blurred[(i, j)] = v;
            }
        }
        debug!(
            "Blurred mapping matrix: {} cells x {} pixels",
            self.cell_count(),
            self.pixel_count()
        );
        Ok(self)
    }

    pub fn cell_count(&self) -> usize {
        self.blurred.nrows()
    }

    pub fn pixel_count(&self) -> usize {
        self.blurred.ncols()
    }

    pub fn sub_grid_size(&self) -> usize {
        self.sub_grid_size
    }

    pub fn unblurred(&self) -> &DMatrix<f64> {
        &self.unblurred
    }

    pub fn blurred(&self) -> &DMatrix<f64> {
        &self.blurred
    }

    /// Column sums of the unblurred matrix (1.0 for every pixel).
    pub fn column_sums(&self) -> Vec<f64> {
        self.unblurred.column_iter().map(|c| c.sum()).collect()
    }

    /// Image of a reconstruction: `Mᵀ · s` with the blurred matrix.
    pub fn model_image(&self, reconstruction: &DVector<f64>) -> Result<DVector<f64>> {
        if reconstruction.len() != self.cell_count() {
            return Err(ReconError::Geometry(format!(
                "reconstruction has {} entries for {} cells",
                reconstruction.len(),
                self.cell_count()
            )));
        }
        Ok(self.blurred.tr_mul(reconstruction))
    }
}
