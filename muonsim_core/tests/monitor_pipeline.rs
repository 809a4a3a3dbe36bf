//! End-to-end pipeline tests on a three-detector monitor built from the
//! standard pixel grid.

use std::collections::HashMap;

use approx::assert_relative_eq;
use nalgebra::Point3;

use muonsim_core::constants::{CENTRAL_LAYER_Z, LOWER_LAYER_Z, UPPER_LAYER_Z};
use muonsim_core::experiment::{compare, read_data};
use muonsim_core::skymap::generate_map;
use muonsim_core::{Geometry, SimulationRun, TrackGenerator};

/// Three full 16-pixel detectors stacked on the monitor axis.
fn monitor() -> Geometry {
    Geometry::from_detectors([
        ("SC01", Point3::new(0.0, 0.0, CENTRAL_LAYER_Z)),
        ("SC02", Point3::new(0.0, 0.0, UPPER_LAYER_Z)),
        ("SC03", Point3::new(0.0, 0.0, LOWER_LAYER_Z)),
    ])
}

#[test]
fn uniform_batch_statistics_are_stable() {
    let geometry = monitor();
    let generator = TrackGenerator::uniform();
    let run = SimulationRun::new(&geometry, &generator, 42);

    let n = 20_000u64;
    let registry = run.simulate_n(n).unwrap();

    let total: u64 = registry.values().map(|c| c.count).sum();
    assert_eq!(total, n);

    // A sizeable fraction of uniform tracks crosses at least one pixel:
    // the detector footprint covers roughly a quarter of the base square.
    let hit: u64 = registry
        .values()
        .filter(|c| c.multiplicity >= 1)
        .map(|c| c.count)
        .sum();
    let fraction = hit as f64 / n as f64;
    assert!(
        (0.08..0.6).contains(&fraction),
        "hit fraction {fraction} outside expected band"
    );

    // Steep tracks can cross all three planes.
    assert!(registry.values().any(|c| c.multiplicity >= 3));
}

#[test]
fn fixed_seed_batches_are_identical() {
    let geometry = monitor();
    let generator = TrackGenerator::cos_power(2.0);

    let first = SimulationRun::new(&geometry, &generator, 7)
        .simulate_n(5_000)
        .unwrap();
    let second = SimulationRun::new(&geometry, &generator, 7)
        .simulate_n(5_000)
        .unwrap();

    assert_eq!(first.len(), second.len());
    for (id, counter) in &first {
        assert_eq!(counter.count, second[id].count);
    }
}

#[test]
fn experiment_comparison_joins_identities() {
    let geometry = monitor();
    let generator = TrackGenerator::uniform();
    let run = SimulationRun::new(&geometry, &generator, 99);
    let registry = run.simulate_n(10_000).unwrap();

    // Fabricate experiment data from the two most common simulated
    // patterns plus one pattern that was never simulated.
    let mut counters: Vec<_> = registry.values().collect();
    counters.sort_by(|a, b| b.count.cmp(&a.count));
    let mut data = HashMap::new();
    data.insert(counters[0].id.clone(), 300u32);
    data.insert(counters[1].id.clone(), 200u32);
    data.insert("[SC99_0]".to_string(), 50u32);

    let (rows, sim_total, data_total) = compare(&data, &registry, None);

    // The never-simulated identity is dropped silently.
    assert_eq!(rows.len(), 2);
    assert_eq!(data_total, 500);
    assert_eq!(
        sim_total,
        counters[0].count + counters[1].count
    );
    assert!(rows[0].sim_count >= rows[1].sim_count);
}

#[test]
fn sky_map_weights_sum_to_identity_count() {
    let geometry = monitor();
    let generator = TrackGenerator::uniform();

    let identities = SimulationRun::new(&geometry, &generator, 5)
        .simulate_n(5_000)
        .unwrap()
        .len();

    let map = generate_map(&geometry, &generator, 5_000, 5, None, 1.0).unwrap();
    let total: f64 = map.iter().map(|e| e.value).sum();

    assert_relative_eq!(total, identities as f64, epsilon = 1e-8);
}

#[test]
fn experiment_data_round_trips_into_comparison() {
    let geometry = monitor();
    let generator = TrackGenerator::fixed_angle(std::f64::consts::FRAC_PI_2, 0.0);
    let run = SimulationRun::new(&geometry, &generator, 3);
    let registry = run.simulate_n(2_000).unwrap();

    // Vertical tracks produce single-column patterns; pick one and feed
    // it back through the experiment-data text format.
    let column = registry
        .values()
        .find(|c| c.multiplicity == 3)
        .expect("vertical tracks cross all three planes");
    let channels: Vec<String> = column
        .id
        .trim_matches(|c| c == '[' || c == ']')
        .split(", ")
        .map(|name| name.trim_start_matches("SC").to_string())
        .collect();

    let mut text = String::from("total 111\n");
    for channel in &channels {
        text.push_str(channel);
        text.push_str(" 0 0\n");
    }
    text.push_str("#\n");

    let data = read_data(text.as_bytes()).unwrap();
    assert_eq!(data.get(&column.id), Some(&111));

    let (rows, _, data_total) = compare(&data, &registry, Some(3));
    assert_eq!(rows.len(), 1);
    assert_eq!(data_total, 111);
    assert_eq!(rows[0].sim_count, column.count);
}
