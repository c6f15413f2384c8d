//! Define a coordinate (a traced sub-pixel position) in the source plane,
//! plus the polar helpers used by border relocation.
//!
//! Coordinates are produced by ray-tracing image-plane sub-pixels through the
//! lens model. Their order encodes pixel identity and is never changed.
//!

/// A 2D source-plane position in arc-seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    /// Position along the x-axis.
    pub x: f64,
    /// Position along the y-axis.
    pub y: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean separation (no square root).
    #[inline]
    pub fn squared_distance(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Scale both components by `factor`.
    #[inline]
    pub fn scaled(&self, factor: f64) -> Coordinate {
        Coordinate::new(self.x * factor, self.y * factor)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Coordinate::new(x, y)
    }
}

/// Angle of `point` about `center`, counter-clockwise from the +x axis,
/// in degrees within `[0, 360)`.
pub fn angle_from_x(center: &Coordinate, point: &Coordinate) -> f64 {
    let theta = (point.y - center.y).atan2(point.x - center.x).to_degrees();
    if theta < 0.0 {
        // A tiny negative angle folds to exactly 360.0 in f64.
        let folded = theta + 360.0;
        if folded >= 360.0 {
            0.0
        } else {
            folded
        }
    } else {
        theta
    }
}

/// Distance of `point` from `center`.
pub fn radius(center: &Coordinate, point: &Coordinate) -> f64 {
    center.squared_distance(point).sqrt()
}
