//! Cosmic-ray muon simulation for a multi-layer pixelated monitor.
//!
//! The pipeline: a track generator draws straight-line trajectories from
//! a physical angular distribution, the geometry resolves each track
//! into the set of pixels it lights up, and a batch of independent
//! trials is aggregated per hit-pattern identity. On top of that sits
//! the sky-map reconstruction, which reweights simulated identities by
//! experimental frequencies to recover an empirical angular flux map.

pub mod constants;
pub mod efficiency;
pub mod error;
pub mod event;
pub mod experiment;
pub mod generator;
pub mod geometry;
pub mod simulation;
pub mod skymap;
pub mod track;

// Re-export key types for convenience
pub use error::SimError;
pub use event::{build_event, Event};
pub use generator::{EmpiricalDistribution, TrackGenerator};
pub use geometry::{Geometry, Layer, Pixel};
pub use simulation::{direction_map, Counter, SimulationRun};
pub use skymap::SkyMapEntry;
pub use track::Track;
