//! Events: a track paired with the set of pixels it hit.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;

use crate::geometry::{split_pixel_name, Geometry};
use crate::track::Track;

/// One simulated detector response: the generating track plus the names
/// of all pixels that registered. Hit names are kept sorted so that the
/// identity is independent of discovery order.
#[derive(Debug, Clone)]
pub struct Event {
    /// The generating track.
    pub track: Track,

    /// Sorted names of the hit pixels. May be empty.
    pub hits: Vec<String>,
}

impl Event {
    /// Creates an event, sorting the hit names.
    pub fn new(track: Track, mut hits: Vec<String>) -> Self {
        hits.sort_unstable();
        Self { track, hits }
    }

    /// Canonical string key of the hit pattern, e.g. `[SC85_0, SC87_5]`.
    ///
    /// Distinct tracks share an identity whenever they light up the same
    /// pixel set; aggregation is keyed on exactly this string.
    pub fn identity(&self) -> String {
        format!("[{}]", self.hits.join(", "))
    }

    /// Number of distinct pixels hit.
    pub fn multiplicity(&self) -> usize {
        self.hits.len()
    }

    /// Serializable view of the event for JSON output.
    pub fn record(&self) -> EventRecord {
        let (x, y) = self.track.intercept();
        EventRecord {
            track: TrackRecord {
                x,
                y,
                theta: self.track.theta(),
                phi: self.track.phi(),
            },
            hits: self.hits.clone(),
        }
    }

    /// Renders the event in the raw experiment-data format: a header
    /// line followed by one line per hit detector carrying a 16-channel
    /// bitmask.
    pub fn raw_lines(&self) -> Vec<String> {
        let mut by_detector: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for name in &self.hits {
            if let Some((detector, index)) = split_pixel_name(name) {
                by_detector.entry(detector).or_default().push(index);
            }
        }

        let mut lines = vec!["0 -1 -1 -1 -1 xxxxxxxxxxxxxxxx".to_string()];
        for (detector, indices) in by_detector {
            let mask: String = (0u32..16)
                .map(|i| if indices.contains(&i) { '1' } else { '0' })
                .collect();
            lines.push(format!("1 {detector} -1 -1 -1 {mask}"));
        }
        lines
    }
}

/// Flat serializable track view.
#[derive(Debug, Clone, Serialize)]
pub struct TrackRecord {
    /// x intercept with the central plane.
    pub x: f64,

    /// y intercept with the central plane.
    pub y: f64,

    /// Elevation angle, radians.
    pub theta: f64,

    /// Azimuth, radians.
    pub phi: f64,
}

/// Flat serializable event view.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// Generating track.
    pub track: TrackRecord,

    /// Sorted hit pixel names.
    pub hits: Vec<String>,
}

/// Resolves a track against every pixel of the geometry.
///
/// Pixels are evaluated independently in name order; the only state
/// touched is the injected RNG through the per-pixel efficiency gates.
pub fn build_event(geometry: &Geometry, track: Track, rng: &mut impl Rng) -> Event {
    let hits: Vec<String> = geometry
        .pixels()
        .filter(|pixel| pixel.is_hit(&track, rng))
        .map(|pixel| pixel.name.clone())
        .collect();
    Event::new(track, hits)
}
