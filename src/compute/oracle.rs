//! Fitness oracle interface and a constant-field stand-in implementation.
//!
//! The search engine treats the oracle as a black box: geometry and a
//! current mode go in, a force vector (plus auxiliary samples the engine
//! never inspects) comes out. Ephemeris, field model and material tables
//! are state of the oracle implementation.

use crate::schema::{CurrentMode, UniformFieldConfig};

use super::geometry::{Vec3, add, cross, dot, norm, scale, sub};

/// Output of a single oracle evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleOutput {
    /// Resultant force on the structure.
    pub force: Vec3,
    /// Auxiliary samples (per-segment forces, field values, ...).
    pub samples: Vec<Vec3>,
}

/// Error reported by an oracle implementation.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Structure has no segments")]
    EmptyStructure,
    #[error("Degenerate conductor: {0}")]
    DegenerateConductor(String),
    #[error("{0}")]
    Other(String),
}

/// Force evaluator for a polyline conductor.
///
/// Implementations must be pure functions of geometry and mode, since the
/// population may be evaluated in parallel.
pub trait FitnessOracle: Send + Sync {
    /// Compute the force on the conductor through `points` (node 0 first).
    fn evaluate(&self, points: &[Vec3], mode: CurrentMode) -> Result<OracleOutput, OracleError>;
}

impl<F> FitnessOracle for F
where
    F: Fn(&[Vec3], CurrentMode) -> Result<OracleOutput, OracleError> + Send + Sync,
{
    fn evaluate(&self, points: &[Vec3], mode: CurrentMode) -> Result<OracleOutput, OracleError> {
        self(points, mode)
    }
}

/// Lorentz force on a polyline conductor moving through a uniform field.
///
/// Imposed mode drives `current` through every segment: `Fᵢ = I·Lᵢ × B`.
/// Induced mode derives the current from the motional EMF
/// `U = Σ (v × B)·Lᵢ` and the wire resistance `R = ρ·L/S`, then applies
/// `Fᵢ = (U/R)·Lᵢ × B`. This is a constant-field approximation, not a
/// geomagnetic model.
#[derive(Debug, Clone)]
pub struct UniformFieldOracle {
    config: UniformFieldConfig,
}

impl UniformFieldOracle {
    /// Create an oracle for the given field environment.
    pub fn new(config: UniformFieldConfig) -> Self {
        Self { config }
    }

    /// Field environment.
    pub fn config(&self) -> &UniformFieldConfig {
        &self.config
    }

    fn current(&self, segments: &[Vec3], mode: CurrentMode) -> Result<f64, OracleError> {
        match mode {
            CurrentMode::Imposed => Ok(self.config.current),
            CurrentMode::Induced => {
                let length: f64 = segments.iter().map(|s| norm(*s)).sum();
                let resistance = self.config.conductor.resistance(length);
                if !(resistance > 0.0 && resistance.is_finite()) {
                    return Err(OracleError::DegenerateConductor(format!(
                        "resistance {resistance} for length {length}"
                    )));
                }
                let electric = cross(self.config.velocity, self.config.field);
                let emf: f64 = segments.iter().map(|s| dot(electric, *s)).sum();
                Ok(emf / resistance)
            }
        }
    }
}

impl Default for UniformFieldOracle {
    fn default() -> Self {
        Self::new(UniformFieldConfig::default())
    }
}

impl FitnessOracle for UniformFieldOracle {
    fn evaluate(&self, points: &[Vec3], mode: CurrentMode) -> Result<OracleOutput, OracleError> {
        if points.len() < 2 {
            return Err(OracleError::EmptyStructure);
        }

        let segments: Vec<Vec3> = points.windows(2).map(|w| sub(w[1], w[0])).collect();
        let current = self.current(&segments, mode)?;

        let samples: Vec<Vec3> = segments
            .iter()
            .map(|s| scale(cross(*s, self.config.field), current))
            .collect();
        let force = samples.iter().fold([0.0; 3], |acc, f| add(acc, *f));

        Ok(OracleOutput { force, samples })
    }
}
