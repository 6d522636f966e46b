//! Configuration types for cable structure search and refinement.
//!
//! Every struct here deserializes from JSON with sensible defaults for
//! missing fields, and exposes a `validate` method that is called by the
//! engines before any work starts.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Current flowing through the cable when the oracle computes the force.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CurrentMode {
    /// Current induced by the motion of the conductor through the field.
    Induced,
    /// Fixed current driven through the conductor.
    #[default]
    Imposed,
}

/// Order in which target-envelope rescaling and length bound enforcement
/// are applied when a structure is generated or mutated.
///
/// Rescaling every length by the same factor so the envelope hits a target
/// couples mass to envelope. The two orders trade exactness of the envelope
/// against exactness of the length bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EnvelopeOrdering {
    /// Enforce length bounds, then rescale. Envelope equals the target
    /// exactly; lengths carry the scale factor.
    #[default]
    EnforceThenRescale,
    /// Rescale, then enforce length bounds. Lengths stay in bounds; the
    /// envelope only approximates the target.
    RescaleThenEnforce,
}

/// Shape parameters shared by every structure of a population.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructureSpec {
    /// Number of nodes (segments + 1). Node 0 is anchored at the origin.
    #[serde(default = "default_node_count")]
    pub node_count: usize,
    /// Minimum segment length.
    #[serde(default = "default_segment_len_min")]
    pub segment_len_min: f64,
    /// Maximum segment length.
    #[serde(default = "default_segment_len_max")]
    pub segment_len_max: f64,
    /// Optional envelope the structure is uniformly rescaled to.
    #[serde(default)]
    pub target_envelope: Option<f64>,
    /// Ordering of rescaling and bound enforcement.
    #[serde(default)]
    pub envelope_ordering: EnvelopeOrdering,
    /// Whether segments may leave the x/z plane.
    #[serde(default = "default_true")]
    pub three_dimensional: bool,
}

impl Default for StructureSpec {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
            segment_len_min: default_segment_len_min(),
            segment_len_max: default_segment_len_max(),
            target_envelope: None,
            envelope_ordering: EnvelopeOrdering::default(),
            three_dimensional: true,
        }
    }
}

fn default_node_count() -> usize {
    20
}
fn default_segment_len_min() -> f64 {
    100.0
}
fn default_segment_len_max() -> f64 {
    1000.0
}
fn default_true() -> bool {
    true
}

impl StructureSpec {
    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.node_count.saturating_sub(1)
    }

    /// Segment length bounds as `(min, max)`.
    pub fn length_bounds(&self) -> (f64, f64) {
        (self.segment_len_min, self.segment_len_max)
    }

    /// Validate node count, length bounds and target envelope.
    pub fn validate(&self) -> Result<()> {
        if self.node_count < 2 {
            return Err(SearchError::InvalidArgument(format!(
                "node count must be at least 2, got {}",
                self.node_count
            )));
        }
        let (min, max) = self.length_bounds();
        if min.is_nan() || min <= 0.0 || max.is_nan() || min > max || !max.is_finite() {
            return Err(SearchError::InvalidBounds { min, max });
        }
        if let Some(target) = self.target_envelope
            && !(target > 0.0 && target.is_finite())
        {
            return Err(SearchError::InvalidArgument(format!(
                "target envelope must be positive, got {target}"
            )));
        }
        Ok(())
    }
}

/// Exponents combining force, mass and envelope into a score:
/// `force / (mass^mass_exponent * envelope^envelope_exponent)`.
///
/// `envelope_exponent = 0` gives the plain force-to-mass figure of merit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeights {
    #[serde(default)]
    pub mass_exponent: f64,
    #[serde(default)]
    pub envelope_exponent: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            mass_exponent: 0.0,
            envelope_exponent: 0.0,
        }
    }
}

impl ScoreWeights {
    /// Combine a force magnitude with mass and envelope.
    pub fn score(&self, force: f64, mass: f64, envelope: f64) -> f64 {
        force / (mass.powf(self.mass_exponent) * envelope.powf(self.envelope_exponent))
    }

    /// Validate exponents.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mass exponent", self.mass_exponent),
            ("envelope exponent", self.envelope_exponent),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(SearchError::InvalidArgument(format!(
                    "{name} must be a finite value >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Which parameter groups stochastic mutation touches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationMask {
    #[serde(default = "default_true")]
    pub lengths: bool,
    #[serde(default = "default_true")]
    pub angles: bool,
}

impl Default for MutationMask {
    fn default() -> Self {
        Self {
            lengths: true,
            angles: true,
        }
    }
}

/// Population search configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Shape of every structure in the population.
    #[serde(default)]
    pub structure: StructureSpec,
    /// Number of structures per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Number of structures kept by selection each generation.
    #[serde(default = "default_keep_size")]
    pub keep_size: usize,
    /// Number of generations.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Mutation temperature at the first generation, in (0, 1).
    #[serde(default = "default_temp_start")]
    pub temp_start: f64,
    /// Decay target of the temperature schedule, in (0, 1).
    #[serde(default = "default_temp_end")]
    pub temp_end: f64,
    /// Current mode handed to the oracle.
    #[serde(default)]
    pub current_mode: CurrentMode,
    /// Score exponents.
    #[serde(default)]
    pub score: ScoreWeights,
    /// Selection bias exponent (1 = uniform, larger favours top scores).
    #[serde(default = "default_selection_bias")]
    pub selection_bias: f64,
    /// Parameter groups touched by mutation.
    #[serde(default)]
    pub mutation: MutationMask,
    /// Evaluate and mutate population members on the rayon pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            structure: StructureSpec::default(),
            population_size: default_population_size(),
            keep_size: default_keep_size(),
            generations: default_generations(),
            temp_start: default_temp_start(),
            temp_end: default_temp_end(),
            current_mode: CurrentMode::default(),
            score: ScoreWeights::default(),
            selection_bias: default_selection_bias(),
            mutation: MutationMask::default(),
            parallel: true,
            random_seed: None,
        }
    }
}

fn default_population_size() -> usize {
    100
}
fn default_keep_size() -> usize {
    20
}
fn default_generations() -> usize {
    50
}
fn default_temp_start() -> f64 {
    0.5
}
fn default_temp_end() -> f64 {
    0.01
}
fn default_selection_bias() -> f64 {
    4.0
}

impl SearchConfig {
    /// Validate search configuration.
    pub fn validate(&self) -> Result<()> {
        self.structure.validate()?;
        self.score.validate()?;

        if self.population_size == 0 {
            return Err(SearchError::InvalidArgument(
                "population size must be at least 1".into(),
            ));
        }
        if self.keep_size == 0 || self.keep_size > self.population_size {
            return Err(SearchError::InvalidArgument(format!(
                "keep size {} must lie in [1, {}]",
                self.keep_size, self.population_size
            )));
        }
        if !(self.selection_bias >= 1.0 && self.selection_bias.is_finite()) {
            return Err(SearchError::InvalidArgument(format!(
                "selection bias must be >= 1, got {}",
                self.selection_bias
            )));
        }

        // Checks the schedule parameters.
        crate::compute::TemperatureSchedule::new(self.temp_start, self.temp_end, self.generations)?;
        Ok(())
    }
}

/// Local refinement configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefinerConfig {
    /// Hard cap on refinement steps. Every objective evaluation is one
    /// step, including those that build the initial simplex.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Absolute convergence threshold on parameter changes.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Absolute convergence threshold on objective changes.
    #[serde(default = "default_f_tolerance")]
    pub f_tolerance: f64,
    /// Relative step used to build the initial simplex.
    #[serde(default = "default_initial_step")]
    pub initial_step: f64,
    /// Score exponents.
    #[serde(default = "default_refiner_score")]
    pub score: ScoreWeights,
    /// Power applied to the score before negation. Only reshapes the
    /// objective's curvature.
    #[serde(default = "default_bias_power")]
    pub bias_power: f64,
    /// Current mode handed to the oracle.
    #[serde(default)]
    pub current_mode: CurrentMode,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            f_tolerance: default_f_tolerance(),
            initial_step: default_initial_step(),
            score: default_refiner_score(),
            bias_power: default_bias_power(),
            current_mode: CurrentMode::default(),
        }
    }
}

fn default_max_iterations() -> usize {
    500
}
fn default_tolerance() -> f64 {
    0.01
}
fn default_f_tolerance() -> f64 {
    1e-4
}
fn default_initial_step() -> f64 {
    0.05
}
fn default_refiner_score() -> ScoreWeights {
    ScoreWeights {
        mass_exponent: 0.5,
        envelope_exponent: 0.0,
    }
}
fn default_bias_power() -> f64 {
    1.0
}

impl RefinerConfig {
    /// Validate refiner configuration.
    pub fn validate(&self) -> Result<()> {
        self.score.validate()?;
        if self.max_iterations == 0 {
            return Err(SearchError::InvalidArgument(
                "max iterations must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("tolerance", self.tolerance),
            ("f tolerance", self.f_tolerance),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(SearchError::InvalidArgument(format!(
                    "{name} must be a finite value >= 0, got {value}"
                )));
            }
        }
        if !(self.initial_step > 0.0 && self.initial_step.is_finite()) {
            return Err(SearchError::InvalidArgument(format!(
                "initial step must be positive, got {}",
                self.initial_step
            )));
        }
        if !(self.bias_power > 0.0 && self.bias_power.is_finite()) {
            return Err(SearchError::InvalidArgument(format!(
                "bias power must be positive, got {}",
                self.bias_power
            )));
        }
        Ok(())
    }
}

/// Conductor properties used by the uniform field oracle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConductorConfig {
    /// Wire diameter [m].
    #[serde(default = "default_diameter")]
    pub diameter: f64,
    /// Electrical resistivity [Ohm.m].
    #[serde(default = "default_resistivity")]
    pub resistivity: f64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            diameter: default_diameter(),
            resistivity: default_resistivity(),
        }
    }
}

fn default_diameter() -> f64 {
    5e-3
}
fn default_resistivity() -> f64 {
    // Al 2024
    5.82e-8
}

impl ConductorConfig {
    /// Cross-section area [m^2].
    pub fn cross_section(&self) -> f64 {
        std::f64::consts::PI * (self.diameter / 2.0).powi(2)
    }

    /// Resistance of a wire of the given length [Ohm].
    pub fn resistance(&self, length: f64) -> f64 {
        self.resistivity * length / self.cross_section()
    }
}

/// Constant-field environment for the stand-in oracle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UniformFieldConfig {
    /// Magnetic field in the structure frame [T].
    #[serde(default = "default_field")]
    pub field: [f64; 3],
    /// Velocity of the structure through the field [m/s].
    #[serde(default = "default_velocity")]
    pub velocity: [f64; 3],
    /// Current driven through the cable in imposed mode [A].
    #[serde(default = "default_current")]
    pub current: f64,
    /// Conductor properties.
    #[serde(default)]
    pub conductor: ConductorConfig,
}

impl Default for UniformFieldConfig {
    fn default() -> Self {
        Self {
            field: default_field(),
            velocity: default_velocity(),
            current: default_current(),
            conductor: ConductorConfig::default(),
        }
    }
}

fn default_field() -> [f64; 3] {
    // Order of magnitude of the geomagnetic field at 800 km.
    [1.5e-5, 0.0, -2.5e-5]
}
fn default_velocity() -> [f64; 3] {
    [7450.0, 0.0, 0.0]
}
fn default_current() -> f64 {
    1.5
}

/// Complete run description loaded by the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunConfig {
    /// Population search settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Local refinement of the winner; skipped when absent.
    #[serde(default)]
    pub refiner: Option<RefinerConfig>,
    /// Field environment of the stand-in oracle.
    #[serde(default)]
    pub oracle: UniformFieldConfig,
}

impl RunConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        if let Some(refiner) = &self.refiner {
            refiner.validate()?;
        }
        Ok(())
    }
}
