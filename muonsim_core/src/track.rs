//! Straight-line muon trajectories.
//!
//! A track is a parametrized 3D line through the monitor. Directions use
//! spherical coordinates with `theta` as the elevation angle above the
//! horizontal plane and `phi` as the azimuth, matching the convention of
//! the monitor's angular flux maps.

use nalgebra::{Point3, Vector3};

use crate::constants::CENTRAL_LAYER_Z;

/// An immutable straight-line trajectory: base point plus unit direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    base: Point3<f64>,
    direction: Vector3<f64>,
}

impl Track {
    /// Creates a track from a base point and a (not necessarily unit)
    /// direction vector.
    pub fn new(base: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            base,
            direction: direction.normalize(),
        }
    }

    /// Creates a track crossing the central detector plane at `(x, y)`
    /// with elevation `theta` and azimuth `phi` (radians).
    pub fn from_angles(x: f64, y: f64, theta: f64, phi: f64) -> Self {
        let direction = Vector3::new(
            theta.cos() * phi.cos(),
            theta.cos() * phi.sin(),
            theta.sin(),
        );
        Self::new(Point3::new(x, y, CENTRAL_LAYER_Z), direction)
    }

    /// Base point of the track.
    pub fn base(&self) -> &Point3<f64> {
        &self.base
    }

    /// Unit direction of the track.
    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }

    /// Elevation angle above the horizontal plane, in (-pi/2, pi/2].
    pub fn theta(&self) -> f64 {
        self.direction.z.asin()
    }

    /// Azimuthal angle, in (-pi, pi].
    pub fn phi(&self) -> f64 {
        self.direction.y.atan2(self.direction.x)
    }

    /// Intersection of the line with the horizontal plane at `z`.
    ///
    /// Returns `None` for horizontal tracks, which never cross the plane.
    pub fn point_at_z(&self, z: f64) -> Option<Point3<f64>> {
        if self.direction.z.abs() < f64::EPSILON {
            return None;
        }
        let t = (z - self.base.z) / self.direction.z;
        Some(self.base + self.direction * t)
    }

    /// `(x, y)` intercept with the central detector plane.
    ///
    /// Horizontal tracks fall back to the base point coordinates.
    pub fn intercept(&self) -> (f64, f64) {
        match self.point_at_z(CENTRAL_LAYER_Z) {
            Some(p) => (p.x, p.y),
            None => (self.base.x, self.base.y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_angles_round_trip() {
        let track = Track::from_angles(10.0, -20.0, 0.7, -2.1);

        assert_relative_eq!(track.theta(), 0.7, epsilon = 1e-12);
        assert_relative_eq!(track.phi(), -2.1, epsilon = 1e-12);
    }

    #[test]
    fn test_central_plane_intercept() {
        let track = Track::from_angles(12.5, -3.0, 1.2, 0.4);
        let (x, y) = track.intercept();

        assert_relative_eq!(x, 12.5, epsilon = 1e-12);
        assert_relative_eq!(y, -3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_intercept_from_offset_base() {
        // Vertical track starting above the central plane
        let track = Track::new(Point3::new(5.0, 7.0, 100.0), Vector3::new(0.0, 0.0, 1.0));
        let (x, y) = track.intercept();

        assert_relative_eq!(x, 5.0, epsilon = 1e-12);
        assert_relative_eq!(y, 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_horizontal_track_has_no_plane_crossing() {
        let track = Track::new(Point3::new(0.0, 0.0, 50.0), Vector3::new(1.0, 1.0, 0.0));

        assert!(track.point_at_z(0.0).is_none());
    }

    proptest! {
        #[test]
        fn prop_angles_round_trip(
            theta in -1.5f64..1.5,
            phi in -3.1f64..3.1,
            x in -500.0f64..500.0,
            y in -500.0f64..500.0,
        ) {
            let track = Track::from_angles(x, y, theta, phi);
            prop_assert!((track.theta() - theta).abs() < 1e-9);
            prop_assert!((track.phi() - phi).abs() < 1e-9);
        }
    }
}
