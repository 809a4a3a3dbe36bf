//! Fixed geometry constants of the muon monitor.
//!
//! All lengths are in millimeters. The monitor is a stack of three
//! detector planes; each detector carries a 4x4 grid of square
//! scintillator pixels.

/// Symmetric tolerance applied to all containment checks.
pub const GEOMETRY_TOLERANCE: f64 = 0.01;

/// Side planes are tested with a widened tolerance to survive
/// edge-grazing numerical error.
pub const SIDE_TOLERANCE_FACTOR: f64 = 100.0;

/// Pixel extent in x and y.
pub const PIXEL_XY_SIZE: f64 = 122.0;

/// Center-to-center pixel spacing inside a detector.
pub const PIXEL_XY_SPACING: f64 = 125.0;

/// Pixel extent in z.
pub const PIXEL_Z_SIZE: f64 = 30.0;

/// z of the central detector plane. Track base points are sampled here.
pub const CENTRAL_LAYER_Z: f64 = 0.0;

/// z of the upper detector plane.
pub const UPPER_LAYER_Z: f64 = 166.0;

/// z of the lower detector plane.
pub const LOWER_LAYER_Z: f64 = -180.0;

/// Tracks crossing a single z-face must travel at least this far inside
/// the pixel to register. Shorter grazes are treated as misses.
pub const MINIMAL_TRACK_LENGTH: f64 = 10.0;

/// Retry budget of the accept-reject zenith sampler.
pub const MAX_REJECTION_ATTEMPTS: u32 = 500;

/// Default half-width of the square from which track base points are
/// drawn, centered on the central detector plane.
pub const DEFAULT_BASE_HALF_WIDTH: f64 = 4.0 * PIXEL_XY_SIZE;
