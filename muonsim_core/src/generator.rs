//! Randomized track generation.
//!
//! A closed set of angular/spatial distributions produces straight-line
//! trajectories for the simulation. The random source is always injected
//! so every variant is seedable and reproducible.

use std::f64::consts::{FRAC_PI_2, PI};

use rand::Rng;
use rand_distr::weighted_alias::WeightedAliasIndex;
use rand_distr::Distribution;

use crate::constants::{DEFAULT_BASE_HALF_WIDTH, MAX_REJECTION_ATTEMPTS};
use crate::error::SimError;
use crate::skymap::SkyMapEntry;
use crate::track::Track;

/// Track-generating distribution.
#[derive(Debug, Clone)]
pub enum TrackGenerator {
    /// Base point uniform in a square, azimuth uniform, cos(zenith)
    /// uniform: isotropic flux in solid angle down to the plane.
    Uniform {
        /// Half-width of the base square in x.
        max_x: f64,
        /// Half-width of the base square in y.
        max_y: f64,
    },

    /// Fixed direction with uniformly sampled base point; used for
    /// directional efficiency scans.
    FixedAngle {
        /// Elevation angle, radians.
        theta: f64,
        /// Azimuth, radians.
        phi: f64,
        /// Half-width of the base square in x.
        max_x: f64,
        /// Half-width of the base square in y.
        max_y: f64,
    },

    /// Accept-reject sampling against a cos^power zenith flux law.
    CosPower {
        /// Exponent of the flux law.
        power: f64,
        /// Half-width of the base square in x.
        max_x: f64,
        /// Half-width of the base square in y.
        max_y: f64,
    },

    /// Weighted discrete sampling from a measured angular distribution.
    Empirical(EmpiricalDistribution),
}

impl TrackGenerator {
    /// Uniform generator with the default base square.
    pub fn uniform() -> Self {
        Self::Uniform {
            max_x: DEFAULT_BASE_HALF_WIDTH,
            max_y: DEFAULT_BASE_HALF_WIDTH,
        }
    }

    /// Fixed-angle generator with the default base square.
    pub fn fixed_angle(theta: f64, phi: f64) -> Self {
        Self::FixedAngle {
            theta,
            phi,
            max_x: DEFAULT_BASE_HALF_WIDTH,
            max_y: DEFAULT_BASE_HALF_WIDTH,
        }
    }

    /// cos^power generator with the default base square.
    pub fn cos_power(power: f64) -> Self {
        Self::CosPower {
            power,
            max_x: DEFAULT_BASE_HALF_WIDTH,
            max_y: DEFAULT_BASE_HALF_WIDTH,
        }
    }

    /// Draws one track.
    pub fn generate(&self, rng: &mut impl Rng) -> Result<Track, SimError> {
        match self {
            Self::Uniform { max_x, max_y } => {
                let (x, y) = sample_base(rng, *max_x, *max_y);
                let phi = (1.0 - rng.gen::<f64>() * 2.0) * PI;
                let theta = FRAC_PI_2 - rng.gen::<f64>().acos();
                Ok(Track::from_angles(x, y, theta, phi))
            }
            Self::FixedAngle {
                theta,
                phi,
                max_x,
                max_y,
            } => {
                let (x, y) = sample_base(rng, *max_x, *max_y);
                Ok(Track::from_angles(x, y, *theta, *phi))
            }
            Self::CosPower {
                power,
                max_x,
                max_y,
            } => {
                let (x, y) = sample_base(rng, *max_x, *max_y);
                let phi = (1.0 - rng.gen::<f64>() * 2.0) * PI;
                let theta = sample_cos_power(rng, *power)?;
                Ok(Track::from_angles(x, y, theta, phi))
            }
            Self::Empirical(distribution) => distribution.generate(rng),
        }
    }
}

/// Uniform base point in a centered square of half-widths `max_x`,
/// `max_y` on the central detector plane.
fn sample_base(rng: &mut impl Rng, max_x: f64, max_y: f64) -> (f64, f64) {
    let x = (1.0 - rng.gen::<f64>() * 2.0) * max_x;
    let y = (1.0 - rng.gen::<f64>() * 2.0) * max_y;
    (x, y)
}

/// Accept-reject sampler for the cos^power zenith law.
///
/// Proposes theta = arccos(u) and accepts with probability
/// sin(theta)^(power - 1). The attempt budget guards against exponents
/// where the acceptance ratio collapses.
fn sample_cos_power(rng: &mut impl Rng, power: f64) -> Result<f64, SimError> {
    for _ in 0..MAX_REJECTION_ATTEMPTS {
        let candidate = rng.gen::<f64>().acos();
        let sin = candidate.sin();
        if sin <= 0.0 {
            continue;
        }
        if rng.gen::<f64>() < sin.powf(power - 1.0) {
            return Ok(candidate);
        }
    }
    Err(SimError::SamplingExhausted {
        attempts: MAX_REJECTION_ATTEMPTS,
    })
}

// ============================================================================
// EMPIRICAL DISTRIBUTION
// ============================================================================

/// Table-driven angular distribution built from sky-map rows.
///
/// A row is drawn with probability proportional to its weight, then the
/// direction is jittered uniformly within the row's angular bin.
#[derive(Debug, Clone)]
pub struct EmpiricalDistribution {
    rows: Vec<SkyMapEntry>,
    index: WeightedAliasIndex<f64>,
    angle_step: f64,
    max_x: f64,
    max_y: f64,
}

impl EmpiricalDistribution {
    /// Builds the sampler from sky-map rows with a bin size of
    /// `angle_step` degrees.
    pub fn new(rows: Vec<SkyMapEntry>, angle_step: f64) -> Result<Self, SimError> {
        let weights: Vec<f64> = rows.iter().map(|row| row.value).collect();
        let index = WeightedAliasIndex::new(weights)
            .map_err(|e| SimError::data(format!("empirical distribution weights: {e}")))?;
        Ok(Self {
            rows,
            index,
            angle_step,
            max_x: DEFAULT_BASE_HALF_WIDTH,
            max_y: DEFAULT_BASE_HALF_WIDTH,
        })
    }

    fn generate(&self, rng: &mut impl Rng) -> Result<Track, SimError> {
        let (x, y) = sample_base(rng, self.max_x, self.max_y);

        let row = &self.rows[self.index.sample(rng)];
        let theta = (90.0 - row.theta).to_radians();
        let phi = row.phi.to_radians();

        // Uniform jitter within the angular bin
        let half_step = (self.angle_step / 2.0).to_radians();
        let d_theta = half_step * (1.0 - 2.0 * rng.gen::<f64>());
        let d_phi = half_step * (1.0 - 2.0 * rng.gen::<f64>());

        Ok(Track::from_angles(x, y, theta + d_theta, phi + d_phi))
    }
}
