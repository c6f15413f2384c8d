//! Source-plane border: a polynomial fit of radius against angle.
//!
//! The border is built from the traced coordinates of the image pixels that lie
//! on the edge of the mask. Traced coordinates that land outside this curve are
//! pulled back onto it so that demagnified central pixels cannot drag the
//! pixelization out to huge radii.
//!
//! ```text
//! r_border(θ) = Σ c_k · (θ / 360)^k        (0 ≤ k ≤ degree)
//! ```
//!
//! The angle is normalized to `[0, 1)` before fitting so the Vandermonde
//! system stays well conditioned at higher degrees.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::coordinate::{angle_from_x, radius, Coordinate};
use crate::error::{ReconError, Result};

/// Singular values below this (relative to the largest) count as rank loss.
const FIT_RANK_TOLERANCE: f64 = 1e-12;

/// Border coordinates and their fitted radius(θ) polynomial.
#[derive(Debug, Clone)]
pub struct SourcePlaneBorder {
    center: Coordinate,
    coordinates: Vec<Coordinate>,
    thetas: Vec<f64>,
    radii: Vec<f64>,
    /// Polynomial coefficients in increasing power of θ/360.
    coefficients: Vec<f64>,
}

impl SourcePlaneBorder {
    /// Fit a border polynomial of `polynomial_degree` through `coordinates`.
    ///
    /// The fit is least squares, so the border coordinates do not need to be
    /// sorted by angle and may over-determine the polynomial.
    pub fn fit(
        coordinates: Vec<Coordinate>,
        polynomial_degree: usize,
        center: Coordinate,
    ) -> Result<Self> {
        if polynomial_degree == 0 {
            return Err(ReconError::Fit(
                "border polynomial degree must be at least 1".into(),
            ));
        }
        let n_coeffs = polynomial_degree + 1;
        if coordinates.len() < n_coeffs {
            return Err(ReconError::Fit(format!(
                "{} border coordinates cannot constrain a degree-{} polynomial",
                coordinates.len(),
                polynomial_degree
            )));
        }
        if let Some(bad) = coordinates.iter().position(|c| !c.is_finite()) {
            return Err(ReconError::Fit(format!(
                "border coordinate {} is not finite",
                bad
            )));
        }

        let thetas: Vec<f64> = coordinates
            .iter()
            .map(|c| angle_from_x(&center, c))
            .collect();
        let radii: Vec<f64> = coordinates.iter().map(|c| radius(&center, c)).collect();

        let coefficients = fit_polynomial_ls(&thetas, &radii, polynomial_degree)?;

        debug!(
            "Border fit: {} points, degree {}, coefficients {:?}",
            coordinates.len(),
            polynomial_degree,
            coefficients
        );

        Ok(Self {
            center,
            coordinates,
            thetas,
            radii,
            coefficients,
        })
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// Angle of each border coordinate (degrees).
    pub fn thetas(&self) -> &[f64] {
        &self.thetas
    }

    /// Radius of each border coordinate.
    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    pub fn polynomial_degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Coefficients in increasing power of the normalized angle `θ / 360`.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Border radius at angle `theta` (degrees), via the fitted polynomial.
    pub fn border_radius_at(&self, theta: f64) -> f64 {
        let u = theta / 360.0;
        // Horner
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * u + c)
    }

    /// Factor by which a coordinate must be scaled to land on the border.
    ///
    /// Coordinates on or inside the border return 1.0. Outside coordinates
    /// return `border_radius / radius`, clamped at zero where the polynomial
    /// dips below the center.
    pub fn move_factor(&self, coordinate: &Coordinate) -> f64 {
        let theta = angle_from_x(&self.center, coordinate);
        let r = radius(&self.center, coordinate);
        let border_r = self.border_radius_at(theta);

        if r > border_r {
            (border_r / r).max(0.0)
        } else {
            1.0
        }
    }

    /// The coordinate moved onto the border if it was outside, else unchanged.
    ///
    /// Scaling is about the border center, so for a center at the origin this
    /// is simply `(x·f, y·f)`.
    pub fn relocated_coordinate(&self, coordinate: &Coordinate) -> Coordinate {
        let f = self.move_factor(coordinate);
        if f == 1.0 {
            return *coordinate;
        }
        Coordinate::new(
            self.center.x + (coordinate.x - self.center.x) * f,
            self.center.y + (coordinate.y - self.center.y) * f,
        )
    }
}

/// Least-squares polynomial fit of `radii` against `thetas` (degrees).
///
/// Returns coefficients in increasing power of `θ / 360`.
fn fit_polynomial_ls(thetas: &[f64], radii: &[f64], degree: usize) -> Result<Vec<f64>> {
    let n_coeffs = degree + 1;
    let nrows = thetas.len();

    let mut a_mat = DMatrix::<f64>::zeros(nrows, n_coeffs);
    let b_vec = DVector::<f64>::from_column_slice(radii);

    for (row, &theta) in thetas.iter().enumerate() {
        let u = theta / 360.0;
        let mut p = 1.0;
        for col in 0..n_coeffs {
            a_mat[(row, col)] = p;
            p *= u;
        }
    }

    let svd = a_mat.svd(true, true);
    let max_sv = svd.singular_values.max();
    if max_sv <= 0.0 || svd.rank(FIT_RANK_TOLERANCE * max_sv) < n_coeffs {
        return Err(ReconError::Fit(format!(
            "border polynomial of degree {} is singular for the given angles",
            degree
        )));
    }

    let coeffs = svd
        .solve(&b_vec, FIT_RANK_TOLERANCE * max_sv)
        .map_err(|e| ReconError::Fit(format!("border least-squares solve failed: {}", e)))?;

    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(ReconError::Fit(
            "border polynomial coefficients are not finite".into(),
        ));
    }

    Ok(coeffs.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(n: usize, r: f64) -> Vec<Coordinate> {
        (0..n)
            .map(|i| {
                let t = (i as f64 / n as f64) * std::f64::consts::TAU;
                Coordinate::new(r * t.cos(), r * t.sin())
            })
            .collect()
    }

    #[test]
    fn test_circle_fits_constant_radius() {
        let border = SourcePlaneBorder::fit(circle(32, 2.0), 3, Coordinate::default()).unwrap();
        for theta in [0.0, 45.0, 133.0, 270.0, 359.0] {
            assert!(
                (border.border_radius_at(theta) - 2.0).abs() < 1e-9,
                "radius at {}: {}",
                theta,
                border.border_radius_at(theta)
            );
        }
        assert_eq!(border.polynomial_degree(), 3);
        assert_eq!(border.thetas().len(), 32);
    }

    #[test]
    fn test_inside_point_unchanged() {
        let border = SourcePlaneBorder::fit(circle(16, 1.0), 2, Coordinate::default()).unwrap();
        let c = Coordinate::new(0.3, -0.4);
        assert_eq!(border.move_factor(&c), 1.0);
        assert_eq!(border.relocated_coordinate(&c), c);
    }

    #[test]
    fn test_outside_point_moved_onto_border() {
        let border = SourcePlaneBorder::fit(circle(16, 1.0), 2, Coordinate::default()).unwrap();
        let c = Coordinate::new(3.0, 4.0);
        let f = border.move_factor(&c);
        assert!((f - 0.2).abs() < 1e-9, "move factor {}", f);
        let moved = border.relocated_coordinate(&c);
        assert!((moved.x - 0.6).abs() < 1e-9);
        assert!((moved.y - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_relocation_idempotent() {
        let border = SourcePlaneBorder::fit(circle(24, 1.5), 4, Coordinate::default()).unwrap();
        for c in [
            Coordinate::new(10.0, 0.1),
            Coordinate::new(-3.0, 2.0),
            Coordinate::new(0.5, 0.5),
        ] {
            let once = border.relocated_coordinate(&c);
            let twice = border.relocated_coordinate(&once);
            assert!((once.x - twice.x).abs() < 1e-12);
            assert!((once.y - twice.y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_offset_center() {
        let center = Coordinate::new(1.0, 1.0);
        let coords: Vec<Coordinate> = circle(20, 1.0)
            .into_iter()
            .map(|c| Coordinate::new(c.x + 1.0, c.y + 1.0))
            .collect();
        let border = SourcePlaneBorder::fit(coords, 2, center).unwrap();
        let moved = border.relocated_coordinate(&Coordinate::new(5.0, 1.0));
        assert!((moved.x - 2.0).abs() < 1e-9);
        assert!((moved.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_points() {
        let err = SourcePlaneBorder::fit(circle(3, 1.0), 3, Coordinate::default()).unwrap_err();
        assert!(matches!(err, ReconError::Fit(_)));
    }

    #[test]
    fn test_zero_degree_rejected() {
        let err = SourcePlaneBorder::fit(circle(8, 1.0), 0, Coordinate::default()).unwrap_err();
        assert!(matches!(err, ReconError::Fit(_)));
    }

    #[test]
    fn test_repeated_angle_is_singular() {
        // Every point at the same angle: the Vandermonde matrix has rank 1.
        let coords = vec![
            Coordinate::new(1.0, 1.0),
            Coordinate::new(2.0, 2.0),
            Coordinate::new(3.0, 3.0),
        ];
        let err = SourcePlaneBorder::fit(coords, 2, Coordinate::default()).unwrap_err();
        assert!(matches!(err, ReconError::Fit(_)));
    }
}
