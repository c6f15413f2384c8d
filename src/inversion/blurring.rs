//! Blurring operators applied to image-plane vectors.
//!
//! The reconstruction treats the point-spread function as an opaque linear
//! operator on a vector of masked image pixels. Building the operator from a
//! PSF belongs to the caller; [`KernelConvolver`] covers the common case of a
//! small kernel on a masked rectangular grid.

use crate::error::{ReconError, Result};

/// A linear operator on vectors of masked image pixels.
pub trait BlurringOperator: Send + Sync {
    /// Length of the vectors this operator accepts and returns.
    fn pixel_count(&self) -> usize;

    /// Blur one image-plane vector of length [`pixel_count`](Self::pixel_count).
    ///
    /// Passing a vector of any other length is a caller bug; implementations
    /// may panic in debug builds.
    fn convolve(&self, values: &[f64]) -> Vec<f64>;
}

/// No blurring: `convolve` returns its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityBlur {
    pixel_count: usize,
}

impl IdentityBlur {
    pub fn new(pixel_count: usize) -> Self {
        Self { pixel_count }
    }
}

impl BlurringOperator for IdentityBlur {
    fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    fn convolve(&self, values: &[f64]) -> Vec<f64> {
        debug_assert_eq!(values.len(), self.pixel_count, "identity blur input length");
        values.to_vec()
    }
}

/// Odd-sized kernel convolution over the unmasked pixels of a 2D grid.
///
/// Masked pixels are numbered in row-major order. Each pixel scatters its
/// value into its neighborhood:
///
/// ```text
/// out[r + ky − hy][c + kx − hx] += kernel[ky][kx] · value[r][c]
/// ```
///
/// Flux landing outside the grid or on a masked-out pixel is discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConvolver {
    rows: usize,
    cols: usize,
    kernel: Vec<Vec<f64>>,
    /// Grid position (row, col) of each masked pixel.
    positions: Vec<(usize, usize)>,
    /// Masked-pixel index at each grid position.
    grid_to_pixel: Vec<Option<usize>>,
}

impl KernelConvolver {
    /// `mask` is row-major `rows × cols`; `true` marks pixels that are
    /// part of the fit.
    pub fn new(rows: usize, cols: usize, mask: &[bool], kernel: Vec<Vec<f64>>) -> Result<Self> {
        if mask.len() != rows * cols {
            return Err(ReconError::Geometry(format!(
                "mask has {} entries for a {}x{} grid",
                mask.len(),
                rows,
                cols
            )));
        }
        let kh = kernel.len();
        let kw = kernel.first().map_or(0, Vec::len);
        if kh % 2 == 0 || kw % 2 == 0 || kernel.iter().any(|row| row.len() != kw) {
            return Err(ReconError::Geometry(format!(
                "kernel must be rectangular with odd dimensions, got {} rows",
                kh
            )));
        }

        let mut positions = Vec::new();
        let mut grid_to_pixel = vec![None; rows * cols];
        for (g, &m) in mask.iter().enumerate() {
            if m {
                grid_to_pixel[g] = Some(positions.len());
                positions.push((g / cols, g % cols));
            }
        }

        Ok(Self {
            rows,
            cols,
            kernel,
            positions,
            grid_to_pixel,
        })
    }

    pub fn kernel(&self) -> &[Vec<f64>] {
        &self.kernel
    }
}

impl BlurringOperator for KernelConvolver {
    fn pixel_count(&self) -> usize {
        self.positions.len()
    }

    fn convolve(&self, values: &[f64]) -> Vec<f64> {
        debug_assert_eq!(
            values.len(),
            self.positions.len(),
            "kernel convolver input length"
        );
        let hy = self.kernel.len() / 2;
        let hx = self.kernel[0].len() / 2;
        let mut out = vec![0.0; self.positions.len()];

        for (&(r, c), &v) in self.positions.iter().zip(values) {
            if v == 0.0 {
                continue;
            }
            for (ky, krow) in self.kernel.iter().enumerate() {
                let Some(tr) = (r + ky).checked_sub(hy).filter(|&t| t < self.rows) else {
                    continue;
                };
                for (kx, &k) in krow.iter().enumerate() {
                    let Some(tc) = (c + kx).checked_sub(hx).filter(|&t| t < self.cols) else {
                        continue;
                    };
                    if let Some(p) = self.grid_to_pixel[tr * self.cols + tc] {
                        out[p] += k * v;
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let blur = IdentityBlur::new(3);
        assert_eq!(blur.convolve(&[1.0, 2.0, 3.0]), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "kernel convolver input length")]
    fn test_short_input_panics_in_debug() {
        let conv = KernelConvolver::new(2, 2, &[true; 4], vec![vec![1.0]]).unwrap();
        conv.convolve(&[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_single_pixel_spreads_kernel() {
        // 3x3 grid, only the center lit.
        let kernel = vec![
            vec![0.0, 3.0, 0.0],
            vec![0.0, 2.0, 1.0],
            vec![0.0, 0.0, 0.0],
        ];
        let conv = KernelConvolver::new(3, 3, &[true; 9], kernel).unwrap();
        let mut image = vec![0.0; 9];
        image[4] = 1.0;
        let out = conv.convolve(&image);
        assert_eq!(out, vec![0.0, 3.0, 0.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_edge_flux_discarded() {
        let kernel = vec![
            vec![0.0, 3.0, 0.0],
            vec![0.0, 2.0, 1.0],
            vec![0.0, 0.0, 0.0],
        ];
        let conv = KernelConvolver::new(3, 3, &[true; 9], kernel).unwrap();
        let mut image = vec![0.0; 9];
        image[2] = 1.0;
        let out = conv.convolve(&image);
        // Up and right of the top-right corner fall off the grid.
        assert_eq!(out, vec![0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_masked_pixels() {
        // Row-major 2x2, bottom-left masked out: pixels are (0,0), (0,1), (1,1).
        let kernel = vec![
            vec![0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.5, 0.0, 0.0],
        ];
        let conv = KernelConvolver::new(2, 2, &[true, true, false, true], kernel).unwrap();
        assert_eq!(conv.pixel_count(), 3);
        // (0,1) scatters 0.5 down-left onto the masked (1,0) and loses it.
        let out = conv.convolve(&[0.0, 1.0, 0.0]);
        assert_eq!(out, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_even_kernel_rejected() {
        let err = KernelConvolver::new(2, 2, &[true; 4], vec![vec![1.0, 1.0]; 2]).unwrap_err();
        assert!(matches!(err, ReconError::Geometry(_)));
        assert!(KernelConvolver::new(2, 2, &[true; 3], vec![vec![1.0]]).is_err());
    }
}
