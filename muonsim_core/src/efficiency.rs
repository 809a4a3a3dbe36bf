//! Directional detection efficiency scans.
//!
//! Efficiency here is the fraction of tracks from a fixed direction
//! whose events pass a counter predicate, by default a multiplicity cut
//! selecting full stack crossings.

use tracing::debug;

use crate::error::SimError;
use crate::generator::TrackGenerator;
use crate::geometry::Geometry;
use crate::simulation::{Counter, SimulationRun};

/// One grid point of an efficiency scan. Angles in degrees, zenith
/// convention.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyPoint {
    /// Zenith angle, degrees.
    pub theta_deg: u32,

    /// Azimuth, degrees.
    pub phi_deg: u32,

    /// Fraction of tracks whose events passed the predicate.
    pub efficiency: f64,
}

/// Simulates `n` tracks from one fixed direction and returns the
/// fraction of events whose counters satisfy `predicate`.
pub fn simulate_direction(
    geometry: &Geometry,
    theta: f64,
    phi: f64,
    n: u64,
    seed: u64,
    predicate: impl Fn(&Counter) -> bool,
) -> Result<f64, SimError> {
    let generator = TrackGenerator::fixed_angle(theta, phi);
    let run = SimulationRun::new(geometry, &generator, seed);
    let registry = run.simulate_n(n)?;

    let passed: u64 = registry
        .values()
        .filter(|counter| predicate(counter))
        .map(|counter| counter.count)
        .sum();
    Ok(passed as f64 / n as f64)
}

/// Scans the upper hemisphere in 10-degree steps, counting events with
/// at least `min_multiplicity` hit pixels.
pub fn efficiency_scan(
    geometry: &Geometry,
    n: u64,
    seed: u64,
    min_multiplicity: usize,
) -> Result<Vec<EfficiencyPoint>, SimError> {
    let mut points = Vec::new();
    for theta_deg in (0u32..90).step_by(10) {
        for phi_deg in (0u32..=360).step_by(10) {
            let theta = (90.0 - f64::from(theta_deg)).to_radians();
            let phi = (f64::from(phi_deg) - 180.0).to_radians();
            let efficiency = simulate_direction(geometry, theta, phi, n, seed, |counter| {
                counter.multiplicity >= min_multiplicity
            })?;
            points.push(EfficiencyPoint {
                theta_deg,
                phi_deg,
                efficiency,
            });
        }
        debug!(theta_deg, "efficiency scan row done");
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::f64::consts::FRAC_PI_2;

    fn stacked_geometry() -> Geometry {
        let mut pixels = std::collections::BTreeMap::new();
        for (name, z) in [("SC01_0", 0.0), ("SC02_0", 166.0), ("SC03_0", -180.0)] {
            let pixel = crate::geometry::Pixel::new(name, Point3::new(0.0, 0.0, z));
            pixels.insert(pixel.name.clone(), pixel);
        }
        Geometry::new(pixels, crate::geometry::monitor_layers())
    }

    #[test]
    fn test_simulate_direction_bounds() {
        let geometry = stacked_geometry();

        let eff = simulate_direction(&geometry, FRAC_PI_2, 0.0, 500, 2, |c| {
            c.multiplicity >= 3
        })
        .unwrap();

        assert!((0.0..=1.0).contains(&eff));
    }

    #[test]
    fn test_simulate_direction_is_deterministic() {
        let geometry = stacked_geometry();
        let predicate = |c: &Counter| c.multiplicity >= 1;

        let a = simulate_direction(&geometry, 1.0, 0.5, 300, 4, predicate).unwrap();
        let b = simulate_direction(&geometry, 1.0, 0.5, 300, 4, predicate).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_trivial_predicate_counts_everything() {
        let geometry = stacked_geometry();

        let eff = simulate_direction(&geometry, FRAC_PI_2, 0.0, 200, 1, |_| true).unwrap();
        assert_eq!(eff, 1.0);
    }
}
