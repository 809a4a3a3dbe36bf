//! Concurrent event simulation and identity-keyed aggregation.
//!
//! Trials are embarrassingly parallel: each one derives its own RNG
//! stream from the master seed, so a batch produces identical results
//! for any worker count. Workers fold events into private registries
//! which are merged by a deterministic reduction at the end.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::SimError;
use crate::event::{build_event, Event};
use crate::generator::TrackGenerator;
use crate::geometry::Geometry;

// ============================================================================
// COUNTER
// ============================================================================

/// Per-identity accumulator: hit count plus the running vector sum of
/// event directions.
#[derive(Debug, Clone)]
pub struct Counter {
    /// Identity string this counter aggregates.
    pub id: String,

    /// Hit-set size, fixed at creation. Every event folded into this
    /// counter shares it by construction.
    pub multiplicity: usize,

    /// Number of aggregated events.
    pub count: u64,

    sum: Vector3<f64>,
    events: Option<Vec<Event>>,
}

impl Counter {
    fn new(id: String, multiplicity: usize, retain_events: bool) -> Self {
        Self {
            id,
            multiplicity,
            count: 0,
            sum: Vector3::zeros(),
            events: retain_events.then(Vec::new),
        }
    }

    /// Folds one event into the accumulator.
    fn put_event(&mut self, event: Event) {
        self.count += 1;
        self.sum += *event.track.direction();
        if let Some(events) = &mut self.events {
            events.push(event);
        }
    }

    /// Merges a partial accumulator produced by another worker.
    fn merge(&mut self, other: Counter) {
        debug_assert_eq!(self.multiplicity, other.multiplicity);
        self.count += other.count;
        self.sum += other.sum;
        if let (Some(events), Some(other_events)) = (&mut self.events, other.events) {
            events.extend(other_events);
        }
    }

    /// Center-of-mass direction estimate: vector sum divided by count.
    /// Not renormalized to unit length.
    pub fn mean_direction(&self) -> Vector3<f64> {
        self.sum / self.count as f64
    }

    /// Angular dispersion estimate, `sqrt(1 - |sum/count|^2)`.
    ///
    /// Small-angle RMS approximation; the formula is kept exactly as the
    /// monitor's downstream analysis expects it.
    pub fn angle_err(&self) -> f64 {
        (1.0 - self.mean_direction().norm_squared()).max(0.0).sqrt()
    }

    /// Azimuth of the direction sum. Equals the circular mean azimuth.
    pub fn mean_phi(&self) -> f64 {
        self.sum.y.atan2(self.sum.x)
    }

    /// Elevation of the direction sum.
    pub fn mean_theta(&self) -> f64 {
        let norm = self.sum.norm();
        if norm == 0.0 {
            return 0.0;
        }
        (self.sum.z / norm).asin()
    }

    /// Retained events, when the run was configured to keep them.
    pub fn events(&self) -> Option<&[Event]> {
        self.events.as_deref()
    }
}

// ============================================================================
// SIMULATION RUN
// ============================================================================

/// A fixed-size batch simulation over one geometry and generator.
#[derive(Debug, Clone)]
pub struct SimulationRun<'a> {
    geometry: &'a Geometry,
    generator: &'a TrackGenerator,
    seed: u64,
    retain_events: bool,
}

impl<'a> SimulationRun<'a> {
    /// Creates a run with the given master seed.
    pub fn new(geometry: &'a Geometry, generator: &'a TrackGenerator, seed: u64) -> Self {
        Self {
            geometry,
            generator,
            seed,
            retain_events: false,
        }
    }

    /// Keeps every event inside its counter, as required by sky-map
    /// reconstruction.
    pub fn retain_events(mut self, retain: bool) -> Self {
        self.retain_events = retain;
        self
    }

    /// RNG for a single trial: one ChaCha stream per trial index under
    /// the master seed. Trial outcomes are independent of scheduling.
    fn trial_rng(&self, trial: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(trial);
        rng
    }

    /// Simulates one trial: generate a track and resolve it against the
    /// full pixel set.
    pub fn simulate_one(&self, trial: u64) -> Result<Event, SimError> {
        let mut rng = self.trial_rng(trial);
        let track = self.generator.generate(&mut rng)?;
        Ok(build_event(self.geometry, track, &mut rng))
    }

    /// Simulates `n` independent trials and groups them by identity.
    ///
    /// A generation failure in any trial aborts the whole batch.
    pub fn simulate_n(&self, n: u64) -> Result<HashMap<String, Counter>, SimError> {
        let registry = (0..n)
            .into_par_iter()
            .map(|trial| self.simulate_one(trial))
            .try_fold(HashMap::new, |mut acc: HashMap<String, Counter>, event| {
                let event = event?;
                let id = event.identity();
                acc.entry(id.clone())
                    .or_insert_with(|| Counter::new(id, event.multiplicity(), self.retain_events))
                    .put_event(event);
                Ok::<_, SimError>(acc)
            })
            .try_reduce(HashMap::new, |mut left, right| {
                for (id, counter) in right {
                    match left.entry(id) {
                        std::collections::hash_map::Entry::Occupied(mut entry) => {
                            entry.get_mut().merge(counter);
                        }
                        std::collections::hash_map::Entry::Vacant(entry) => {
                            entry.insert(counter);
                        }
                    }
                }
                Ok(left)
            })?;

        debug!(trials = n, identities = registry.len(), "batch complete");
        Ok(registry)
    }

    /// Simulates `n` trials and returns the raw events in trial order.
    pub fn simulate_events(&self, n: u64) -> Result<Vec<Event>, SimError> {
        (0..n)
            .into_par_iter()
            .map(|trial| self.simulate_one(trial))
            .collect()
    }
}

// ============================================================================
// DIRECTION-MAP CACHE
// ============================================================================

/// Identity to mean-direction map with a JSON disk cache.
///
/// A missing or corrupt cache file is never fatal: the map is recomputed
/// from `n` fresh trials and persisted again. Persistence failures are
/// logged and ignored.
pub fn direction_map(
    path: &Path,
    run: &SimulationRun<'_>,
    n: u64,
) -> Result<HashMap<String, Vector3<f64>>, SimError> {
    if let Some(cached) = load_direction_map(path) {
        return Ok(cached);
    }

    let map: HashMap<String, Vector3<f64>> = run
        .simulate_n(n)?
        .into_iter()
        .map(|(id, counter)| (id, counter.mean_direction()))
        .collect();

    let raw: HashMap<&String, [f64; 3]> = map
        .iter()
        .map(|(id, v)| (id, [v.x, v.y, v.z]))
        .collect();
    match serde_json::to_string(&raw) {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                warn!(path = %path.display(), error = %e, "failed to persist direction map");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize direction map"),
    }

    Ok(map)
}

fn load_direction_map(path: &Path) -> Option<HashMap<String, Vector3<f64>>> {
    if !path.exists() {
        return None;
    }
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read direction map, recalculating");
            return None;
        }
    };
    match serde_json::from_str::<HashMap<String, [f64; 3]>>(&contents) {
        Ok(raw) => Some(
            raw.into_iter()
                .map(|(id, [x, y, z])| (id, Vector3::new(x, y, z)))
                .collect(),
        ),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt direction map, recalculating");
            None
        }
    }
}
