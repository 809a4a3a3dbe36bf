//! Empirical angular flux reconstruction (sky map).
//!
//! A sky map is a 2D histogram over (theta, phi) in degrees. It is
//! reconstructed by simulating a batch, reweighting each identity by the
//! ratio of experimentally observed to simulated counts, and binning the
//! per-event directions. An optional second pass feeds the first map
//! back in as the generating distribution.

use std::collections::HashMap;
use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SimError;
use crate::generator::{EmpiricalDistribution, TrackGenerator};
use crate::geometry::Geometry;
use crate::simulation::SimulationRun;

/// One angular bin of the reconstructed flux map. Angles are in degrees;
/// `theta` is the zenith angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyMapEntry {
    /// Zenith angle of the bin center, degrees.
    pub theta: f64,

    /// Azimuth of the bin center, degrees.
    pub phi: f64,

    /// Accumulated weight of the bin.
    pub value: f64,

    /// Bin extent in theta, degrees.
    pub theta_size: f64,

    /// Bin extent in phi, degrees.
    pub phi_size: f64,
}

impl SkyMapEntry {
    /// Creates an entry with one-degree bins.
    pub fn new(theta: f64, phi: f64, value: f64) -> Self {
        Self::with_bin(theta, phi, value, 1.0)
    }

    /// Creates an entry with square bins of `bin_size` degrees.
    pub fn with_bin(theta: f64, phi: f64, value: f64, bin_size: f64) -> Self {
        Self {
            theta,
            phi,
            value,
            theta_size: bin_size,
            phi_size: bin_size,
        }
    }
}

/// Loads a sky map from its text form: `#` comment lines, then
/// whitespace-separated `theta phi value` rows.
pub fn load_map(reader: impl BufRead) -> Result<Vec<SkyMapEntry>, SimError> {
    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(SimError::data(format!(
                "sky map line {}: expected `theta phi value`",
                line_no + 1
            )));
        }
        let parse = |field: &str| {
            field.parse::<f64>().map_err(|_| {
                SimError::data(format!("sky map line {}: bad number {:?}", line_no + 1, field))
            })
        };
        rows.push(SkyMapEntry::new(
            parse(fields[0])?,
            parse(fields[1])?,
            parse(fields[2])?,
        ));
    }
    Ok(rows)
}

/// Reconstructs the angular flux map from `n` simulated trials.
///
/// Each identity gets the weight `(observed count | 1) / simulated
/// count`; when experiment data is supplied, identities it does not
/// mention are skipped entirely. Every retained event then deposits the
/// weight into its (theta, phi) bin.
pub fn generate_map(
    geometry: &Geometry,
    generator: &TrackGenerator,
    n: u64,
    seed: u64,
    experiment_data: Option<&HashMap<String, u32>>,
    bin_size_deg: f64,
) -> Result<Vec<SkyMapEntry>, SimError> {
    let run = SimulationRun::new(geometry, generator, seed).retain_events(true);
    let registry = run.simulate_n(n)?;

    let mut bins: HashMap<(i64, i64), f64> = HashMap::new();
    for counter in registry.values() {
        let observed = match experiment_data {
            Some(data) => match data.get(&counter.id) {
                Some(count) => *count as f64,
                // Never-observed patterns carry no weight.
                None => continue,
            },
            None => 1.0,
        };
        let weight = observed / counter.count as f64;
        if weight <= 0.0 {
            continue;
        }

        // Retention is enabled above; the list is always present.
        let events = counter.events().unwrap_or(&[]);
        for event in events {
            let key = (
                bin_index(event.track.theta().to_degrees(), bin_size_deg),
                bin_index(event.track.phi().to_degrees(), bin_size_deg),
            );
            *bins.entry(key).or_insert(0.0) += weight;
        }
    }

    let mut entries: Vec<SkyMapEntry> = bins
        .into_iter()
        .map(|((theta_bin, phi_bin), value)| {
            SkyMapEntry::with_bin(
                90.0 - bin_center(theta_bin, bin_size_deg),
                bin_center(phi_bin, bin_size_deg),
                value,
                bin_size_deg,
            )
        })
        .collect();
    entries.sort_by(|a, b| a.theta.total_cmp(&b.theta).then(a.phi.total_cmp(&b.phi)));
    Ok(entries)
}

/// Full reconstruction starting from an isotropic distribution, with an
/// optional self-consistent second pass driven by the first map.
pub fn reconstruct(
    geometry: &Geometry,
    n: u64,
    seed: u64,
    experiment_data: Option<&HashMap<String, u32>>,
    bin_size_deg: f64,
    second_iteration: bool,
) -> Result<Vec<SkyMapEntry>, SimError> {
    let uniform = TrackGenerator::uniform();
    let map = generate_map(geometry, &uniform, n, seed, experiment_data, bin_size_deg)?;

    if !second_iteration {
        return Ok(map);
    }

    info!("starting second sky-map iteration");
    let empirical = TrackGenerator::Empirical(EmpiricalDistribution::new(map, bin_size_deg)?);
    generate_map(
        geometry,
        &empirical,
        n,
        seed.wrapping_add(1),
        experiment_data,
        bin_size_deg,
    )
}

fn bin_index(degrees: f64, bin_size: f64) -> i64 {
    (degrees / bin_size).floor() as i64
}

fn bin_center(index: i64, bin_size: f64) -> f64 {
    index as f64 * bin_size + bin_size / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn stacked_geometry() -> Geometry {
        let mut pixels = std::collections::BTreeMap::new();
        for (name, z) in [("SC01_0", 0.0), ("SC02_0", 166.0), ("SC03_0", -180.0)] {
            let pixel = crate::geometry::Pixel::new(name, Point3::new(0.0, 0.0, z));
            pixels.insert(pixel.name.clone(), pixel);
        }
        Geometry::new(pixels, crate::geometry::monitor_layers())
    }

    #[test]
    fn test_load_map() {
        let input = "# header\n30.0 100.0 0.5\n60.0 -50.0 0.25\n";
        let rows = load_map(input.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].theta, 30.0);
        assert_eq!(rows[1].value, 0.25);
    }

    #[test]
    fn test_load_map_rejects_short_row() {
        let input = "30.0 100.0\n";

        assert!(matches!(
            load_map(input.as_bytes()),
            Err(SimError::MalformedData(_))
        ));
    }

    #[test]
    fn test_bin_center_matches_floor() {
        assert_eq!(bin_index(30.7, 1.0), 30);
        assert_eq!(bin_center(30, 1.0), 30.5);
        assert_eq!(bin_index(-0.2, 1.0), -1);
        assert_eq!(bin_center(-1, 1.0), -0.5);
        assert_eq!(bin_index(37.0, 5.0), 7);
        assert_eq!(bin_center(7, 5.0), 37.5);
    }

    #[test]
    fn test_unit_weight_per_identity_without_data() {
        let geometry = stacked_geometry();
        let generator = TrackGenerator::uniform();

        let run = SimulationRun::new(&geometry, &generator, 21).retain_events(true);
        let identities = run.simulate_n(2000).unwrap().len();

        let map = generate_map(&geometry, &generator, 2000, 21, None, 1.0).unwrap();
        let total: f64 = map.iter().map(|e| e.value).sum();

        // Each identity contributes count * (1 / count) = 1 in total.
        assert_relative_eq!(total, identities as f64, epsilon = 1e-9);
    }

    #[test]
    fn test_experiment_data_reweights_and_filters() {
        let geometry = stacked_geometry();
        let generator = TrackGenerator::uniform();

        // Weight everything onto the empty pattern only.
        let mut data = HashMap::new();
        data.insert("[]".to_string(), 500u32);

        let map = generate_map(&geometry, &generator, 1000, 8, Some(&data), 1.0).unwrap();
        let total: f64 = map.iter().map(|e| e.value).sum();

        // All retained weight comes from the one matched identity:
        // count * (500 / count) = 500.
        assert_relative_eq!(total, 500.0, epsilon = 1e-6);
    }

    #[test]
    fn test_reconstruct_second_iteration() {
        let geometry = stacked_geometry();

        let map = reconstruct(&geometry, 1000, 17, None, 1.0, true).unwrap();
        assert!(!map.is_empty());
        // Zenith bins stay in the upper hemisphere the generators cover.
        for entry in &map {
            assert!(entry.theta <= 90.0 + 1e-9);
            assert!(entry.value >= 0.0);
        }
    }
}
