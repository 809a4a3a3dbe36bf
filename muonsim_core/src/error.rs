//! Error types for the simulation core.

use thiserror::Error;

/// Errors that can occur while loading geometry or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// The accept-reject sampler exhausted its retry budget.
    #[error("distribution sampling exhausted after {attempts} rejection attempts")]
    SamplingExhausted { attempts: u32 },

    /// Detector map or efficiency calibration input could not be parsed.
    #[error("malformed geometry input: {0}")]
    MalformedGeometry(String),

    /// Experiment data or sky-map input could not be parsed.
    #[error("malformed data input: {0}")]
    MalformedData(String),

    /// A pixel name was looked up that the geometry does not contain.
    #[error("pixel not found: {0}")]
    PixelNotFound(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Creates a malformed-geometry error.
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::MalformedGeometry(msg.into())
    }

    /// Creates a malformed-data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Self::MalformedData(msg.into())
    }
}
