//! Detector geometry: layers, pixels and hit resolution.
//!
//! The monitor is an immutable snapshot built once at startup: a set of
//! named z-planes plus a map of named rectangular pixel volumes. All
//! simulation components receive the geometry explicitly; there is no
//! process-wide detector state.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nalgebra::{Point3, Vector3};
use rand::Rng;
use tracing::debug;

use crate::constants::{
    CENTRAL_LAYER_Z, GEOMETRY_TOLERANCE, LOWER_LAYER_Z, MINIMAL_TRACK_LENGTH, PIXEL_XY_SIZE,
    PIXEL_XY_SPACING, PIXEL_Z_SIZE, SIDE_TOLERANCE_FACTOR, UPPER_LAYER_Z,
};
use crate::error::SimError;
use crate::track::Track;

// ============================================================================
// LAYER
// ============================================================================

/// A named infinite horizontal plane at fixed z.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Layer name, e.g. `center+`.
    pub name: String,

    /// Height of the plane.
    pub z: f64,
}

impl Layer {
    /// Creates a named layer at height `z`.
    pub fn new(name: impl Into<String>, z: f64) -> Self {
        Self {
            name: name.into(),
            z,
        }
    }

    /// Intersection of a track with this plane, `None` for horizontal
    /// tracks.
    pub fn intersect(&self, track: &Track) -> Option<Point3<f64>> {
        track.point_at_z(self.z)
    }
}

/// The nine named planes of the three-detector monitor stack: each
/// detector plane plus its pixel top/bottom faces.
pub fn monitor_layers() -> Vec<Layer> {
    let half = PIXEL_Z_SIZE / 2.0;
    vec![
        Layer::new("center", CENTRAL_LAYER_Z),
        Layer::new("center+", CENTRAL_LAYER_Z + half),
        Layer::new("center-", CENTRAL_LAYER_Z - half),
        Layer::new("up", UPPER_LAYER_Z),
        Layer::new("up+", UPPER_LAYER_Z + half),
        Layer::new("up-", UPPER_LAYER_Z - half),
        Layer::new("bottom", LOWER_LAYER_Z),
        Layer::new("bottom+", LOWER_LAYER_Z + half),
        Layer::new("bottom-", LOWER_LAYER_Z - half),
    ]
}

// ============================================================================
// PIXEL
// ============================================================================

/// A named rectangular scintillator volume.
///
/// The name encodes the detector number (digits between the `SC` prefix
/// and the underscore) and the sub-pixel index (digits after the
/// underscore), e.g. `SC85_12`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixel {
    /// Unique pixel name.
    pub name: String,

    /// Geometric center of the volume.
    pub center: Point3<f64>,

    /// Extent in x.
    pub x_size: f64,

    /// Extent in y.
    pub y_size: f64,

    /// Extent in z.
    pub z_size: f64,

    /// Probability that a geometrically qualifying crossing registers.
    pub efficiency: f64,
}

impl Pixel {
    /// Creates a pixel with the standard monitor extents and full
    /// efficiency.
    pub fn new(name: impl Into<String>, center: Point3<f64>) -> Self {
        Self::with_sizes(name, center, PIXEL_XY_SIZE, PIXEL_XY_SIZE, PIXEL_Z_SIZE)
    }

    /// Creates a pixel with explicit extents.
    pub fn with_sizes(
        name: impl Into<String>,
        center: Point3<f64>,
        x_size: f64,
        y_size: f64,
        z_size: f64,
    ) -> Self {
        Self {
            name: name.into(),
            center,
            x_size,
            y_size,
            z_size,
            efficiency: 1.0,
        }
    }

    /// z of the top face.
    pub fn top_z(&self) -> f64 {
        self.center.z + self.z_size / 2.0
    }

    /// z of the bottom face.
    pub fn bottom_z(&self) -> f64 {
        self.center.z - self.z_size / 2.0
    }

    /// Checks containment in the pixel volume with a symmetric tolerance
    /// on every bound.
    pub fn contains_point(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        point.x <= self.center.x + self.x_size / 2.0 + tolerance
            && point.x >= self.center.x - self.x_size / 2.0 - tolerance
            && point.y <= self.center.y + self.y_size / 2.0 + tolerance
            && point.y >= self.center.y - self.y_size / 2.0 - tolerance
            && point.z <= self.center.z + self.z_size / 2.0 + tolerance
            && point.z >= self.center.z - self.z_size / 2.0 - tolerance
    }

    /// Decides whether a track registers a hit in this pixel.
    ///
    /// The track is intersected with the top and bottom faces. If both
    /// crossings lie inside the volume the track traverses the full
    /// thickness and only the efficiency gate applies. If exactly one
    /// crossing is contained, the track clips the pixel through a side
    /// face: the in-pixel path length is measured against the crossed
    /// side plane and short grazes are rejected. A one-sided crossing
    /// with no side-plane match clips a corner and is accepted as-is.
    pub fn is_hit(&self, track: &Track, rng: &mut impl Rng) -> bool {
        let top = match track.point_at_z(self.top_z()) {
            Some(p) => p,
            None => return false,
        };
        let bottom = match track.point_at_z(self.bottom_z()) {
            Some(p) => p,
            None => return false,
        };

        let top_inside = self.contains_point(&top, GEOMETRY_TOLERANCE);
        let bottom_inside = self.contains_point(&bottom, GEOMETRY_TOLERANCE);

        match (top_inside, bottom_inside) {
            (false, false) => false,
            (true, true) => self.efficiency_gate(rng),
            (true, false) | (false, true) => {
                let inside = if top_inside { top } else { bottom };
                match self.side_crossing(track) {
                    // Corner or edge clip: no side plane matched, the
                    // segment is assumed long enough.
                    None => self.efficiency_gate(rng),
                    Some(side) => {
                        let length = (inside - side).norm();
                        length >= MINIMAL_TRACK_LENGTH && self.efficiency_gate(rng)
                    }
                }
            }
        }
    }

    /// Finds the crossing of the track with one of the four vertical
    /// side planes, tested with a widened tolerance.
    fn side_crossing(&self, track: &Track) -> Option<Point3<f64>> {
        let tolerance = GEOMETRY_TOLERANCE * SIDE_TOLERANCE_FACTOR;
        let base = track.base();
        let dir = track.direction();

        let x_planes = [
            self.center.x - self.x_size / 2.0,
            self.center.x + self.x_size / 2.0,
        ];
        for plane_x in x_planes {
            if dir.x.abs() > f64::EPSILON {
                let t = (plane_x - base.x) / dir.x;
                let point = base + dir * t;
                if self.contains_point(&point, tolerance) {
                    return Some(point);
                }
            }
        }

        let y_planes = [
            self.center.y - self.y_size / 2.0,
            self.center.y + self.y_size / 2.0,
        ];
        for plane_y in y_planes {
            if dir.y.abs() > f64::EPSILON {
                let t = (plane_y - base.y) / dir.y;
                let point = base + dir * t;
                if self.contains_point(&point, tolerance) {
                    return Some(point);
                }
            }
        }

        None
    }

    /// Stochastic detection gate: an independent draw per evaluation.
    fn efficiency_gate(&self, rng: &mut impl Rng) -> bool {
        self.efficiency >= 1.0 || rng.gen::<f64>() < self.efficiency
    }

    /// Detector number encoded in the pixel name.
    pub fn detector_number(&self) -> Option<u32> {
        split_pixel_name(&self.name).map(|(detector, _)| detector)
    }

    /// Sub-pixel index encoded in the pixel name.
    pub fn pixel_number(&self) -> Option<u32> {
        split_pixel_name(&self.name).map(|(_, index)| index)
    }
}

/// Splits a pixel name like `SC85_12` into detector number and pixel
/// index.
pub fn split_pixel_name(name: &str) -> Option<(u32, u32)> {
    let trimmed = name.strip_prefix("SC").unwrap_or(name);
    let (detector, index) = trimmed.split_once('_')?;
    Some((detector.parse().ok()?, index.parse().ok()?))
}

// ============================================================================
// GEOMETRY SNAPSHOT
// ============================================================================

/// Immutable snapshot of the full monitor: pixel map plus layer list.
///
/// Pixels are kept in name order so that every traversal (and thus every
/// efficiency-gate RNG draw sequence) is deterministic.
#[derive(Debug, Clone)]
pub struct Geometry {
    pixels: BTreeMap<String, Pixel>,
    layers: Vec<Layer>,
}

impl Geometry {
    /// Wraps a prebuilt pixel map and layer list.
    pub fn new(pixels: BTreeMap<String, Pixel>, layers: Vec<Layer>) -> Self {
        Self { pixels, layers }
    }

    /// Builds a monitor from detector positions, expanding each detector
    /// into its 16-pixel grid.
    pub fn from_detectors<'a>(
        detectors: impl IntoIterator<Item = (&'a str, Point3<f64>)>,
    ) -> Self {
        let mut pixels = BTreeMap::new();
        for (name, position) in detectors {
            for pixel in build_detector(name, position) {
                pixels.insert(pixel.name.clone(), pixel);
            }
        }
        Self::new(pixels, monitor_layers())
    }

    /// Loads the geometry from a detector map file and an optional
    /// efficiency calibration file.
    pub fn from_files(map_path: &Path, eff_path: Option<&Path>) -> Result<Self, SimError> {
        let map_reader = BufReader::new(File::open(map_path)?);
        match eff_path {
            Some(path) => Self::from_readers(map_reader, Some(BufReader::new(File::open(path)?))),
            None => Self::from_readers(map_reader, None::<BufReader<File>>),
        }
    }

    /// Loads the geometry from open readers.
    pub fn from_readers(
        map: impl BufRead,
        efficiencies: Option<impl BufRead>,
    ) -> Result<Self, SimError> {
        let mut pixels = parse_detector_map(map)?;
        if let Some(reader) = efficiencies {
            let effs = parse_efficiencies(reader)?;
            apply_efficiencies(&mut pixels, &effs);
        }
        debug!(pixels = pixels.len(), "geometry loaded");
        Ok(Self::new(pixels, monitor_layers()))
    }

    /// Pixels in name order.
    pub fn pixels(&self) -> impl Iterator<Item = &Pixel> {
        self.pixels.values()
    }

    /// Looks up a pixel by name.
    pub fn pixel(&self, name: &str) -> Result<&Pixel, SimError> {
        self.pixels
            .get(name)
            .ok_or_else(|| SimError::PixelNotFound(name.to_string()))
    }

    /// Number of pixels in the monitor.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Whether the monitor holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Named detector planes.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

// ============================================================================
// DETECTOR CONSTRUCTION
// ============================================================================

/// Pixel grid offsets within a detector, in spacing units, indexed by
/// sub-pixel number. Matches the monitor's channel numbering.
const PIXEL_GRID: [(f64, f64); 16] = [
    (-0.5, 1.5),
    (-0.5, 0.5),
    (-1.5, 0.5),
    (-1.5, 1.5),
    (0.5, 1.5),
    (0.5, 0.5),
    (1.5, 0.5),
    (1.5, 1.5),
    (-0.5, -1.5),
    (-0.5, -0.5),
    (-1.5, -0.5),
    (-1.5, -1.5),
    (0.5, -1.5),
    (0.5, -0.5),
    (1.5, -0.5),
    (1.5, -1.5),
];

/// Expands one detector into its 16 pixels around `position`.
pub fn build_detector(name: &str, position: Point3<f64>) -> Vec<Pixel> {
    PIXEL_GRID
        .iter()
        .enumerate()
        .map(|(index, &(gx, gy))| {
            let offset = rotate_detector(Vector3::new(
                gx * PIXEL_XY_SPACING,
                gy * PIXEL_XY_SPACING,
                0.0,
            ));
            Pixel::new(format!("{name}_{index}"), position + offset)
        })
        .collect()
}

/// Detector mounting rotation: a quarter turn around z.
fn rotate_detector(v: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(-v.y, v.x, v.z)
}

// ============================================================================
// INPUT PARSERS
// ============================================================================

/// Parses the fixed-format detector map.
///
/// Data lines start with a space and carry the detector name in field 1
/// and its raw coordinates in fields 4-6. Raw coordinates are offset to
/// the monitor frame.
pub fn parse_detector_map(reader: impl BufRead) -> Result<BTreeMap<String, Pixel>, SimError> {
    let mut pixels = BTreeMap::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.starts_with(' ') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            return Err(SimError::geometry(format!(
                "detector map line {}: expected at least 7 fields, got {}",
                line_no + 1,
                fields.len()
            )));
        }
        let name = fields[1];
        let x = parse_coordinate(fields[4], line_no)? - 500.0;
        let y = parse_coordinate(fields[5], line_no)? - 500.0;
        let z = parse_coordinate(fields[6], line_no)? - 180.0;

        for pixel in build_detector(name, Point3::new(x, y, z)) {
            pixels.insert(pixel.name.clone(), pixel);
        }
    }

    Ok(pixels)
}

fn parse_coordinate(field: &str, line_no: usize) -> Result<f64, SimError> {
    field.parse().map_err(|_| {
        SimError::geometry(format!(
            "detector map line {}: bad coordinate {:?}",
            line_no + 1,
            field
        ))
    })
}

/// Parses the efficiency calibration table.
///
/// Block format: an `SC` header line names the detector (field 2), a
/// `pixel` line resets the channel index, and every following data line
/// carries one efficiency in field 1.
pub fn parse_efficiencies(reader: impl BufRead) -> Result<HashMap<String, f64>, SimError> {
    let mut effs = HashMap::new();
    let mut detector = String::new();
    let mut index = 0u32;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.starts_with("SC") {
            detector = trimmed
                .split_whitespace()
                .nth(2)
                .ok_or_else(|| {
                    SimError::geometry(format!(
                        "efficiency table line {}: missing detector name",
                        line_no + 1
                    ))
                })?
                .to_string();
        } else if trimmed.starts_with("pixel") {
            index = 0;
        } else if !trimmed.is_empty() {
            let field = trimmed.split_whitespace().nth(1).ok_or_else(|| {
                SimError::geometry(format!(
                    "efficiency table line {}: missing efficiency value",
                    line_no + 1
                ))
            })?;
            let eff: f64 = field.parse().map_err(|_| {
                SimError::geometry(format!(
                    "efficiency table line {}: bad efficiency {:?}",
                    line_no + 1,
                    field
                ))
            })?;
            effs.insert(format!("SC{detector}_{index}"), eff);
            index += 1;
        }
    }

    Ok(effs)
}

/// Patches calibrated efficiencies into a pixel map. Names missing from
/// the map are skipped.
pub fn apply_efficiencies(pixels: &mut BTreeMap<String, Pixel>, effs: &HashMap<String, f64>) {
    for (name, eff) in effs {
        if let Some(pixel) = pixels.get_mut(name) {
            pixel.efficiency = *eff;
        }
    }
}
