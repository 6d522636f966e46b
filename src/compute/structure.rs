//! Parametric cable structure.
//!
//! A structure is a chain of `N` nodes anchored at the origin. Segment `i`
//! is described by its length and two angles `(θ, φ)`; node `i + 1` sits at
//! `node i + length·(sinθ·cosφ, sinθ·sinφ, cosθ)`. Geometry, envelope and
//! mass are derived eagerly whenever the parameters change.
//!
//! Structures are values: mutation, evaluation and parameter replacement
//! all return a new `StructureModel` and leave the receiver untouched.
//!
//! # Target envelope coupling
//!
//! When `StructureSpec::target_envelope` is set, every rebuild that enforces
//! bounds also rescales all lengths by `target / envelope`. Mass then grows
//! linearly with the envelope by construction, so a score that divides by
//! mass also penalizes size. `EnvelopeOrdering` picks whether the envelope
//! or the length bounds are exact for generated and mutated structures;
//! explicit parameter vectors always keep the length bounds.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use rand::Rng;

use crate::error::{Result, SearchError};
use crate::schema::{CurrentMode, EnvelopeOrdering, MutationMask, ScoreWeights, StructureSpec};

use super::geometry::{Vec3, add, direction, norm, reflect, scale, snap, wrap_angle};
use super::oracle::FitnessOracle;

/// Oracle result cached on a structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Performance {
    /// Max node distance from the origin.
    pub envelope: f64,
    /// Sum of segment lengths.
    pub mass: f64,
    /// Magnitude of the resultant force.
    pub force: f64,
    /// Resultant force vector.
    pub force_vector: Vec3,
    /// Current mode the force was computed for.
    pub mode: CurrentMode,
}

impl Performance {
    /// Combine force, mass and envelope into a score.
    pub fn score(&self, weights: &ScoreWeights) -> f64 {
        weights.score(self.force, self.mass, self.envelope)
    }
}

/// How out-of-range parameters are brought back into their domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundsPolicy {
    /// Mirror by the overshoot. Used for stochastic mutation.
    Reflect,
    /// Snap onto the exceeded bound. Used for externally supplied vectors.
    Snap,
}

impl BoundsPolicy {
    fn apply(self, value: f64, lo: f64, hi: f64) -> f64 {
        match self {
            BoundsPolicy::Reflect => reflect(value, lo, hi),
            BoundsPolicy::Snap => snap(value, lo, hi),
        }
    }
}

/// A jointed cable structure and its derived geometry.
#[derive(Debug, Clone)]
pub struct StructureModel {
    spec: StructureSpec,
    lengths: Vec<f64>,
    theta: Vec<f64>,
    phi: Vec<f64>,
    points: Vec<Vec3>,
    distances: Vec<f64>,
    envelope: f64,
    mass: f64,
    performance: Option<Performance>,
}

impl StructureModel {
    /// Draw a random structure.
    ///
    /// θ ~ U[0, 2π), φ ~ U[−π/2, π/2] (0 when planar), length ~ U[min, max].
    pub fn generate<R: Rng + ?Sized>(spec: &StructureSpec, rng: &mut R) -> Result<Self> {
        spec.validate()?;
        let n = spec.segment_count();
        let (lo, hi) = spec.length_bounds();

        let theta: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..TAU)).collect();
        let phi: Vec<f64> = if spec.three_dimensional {
            (0..n).map(|_| rng.gen_range(-FRAC_PI_2..=FRAC_PI_2)).collect()
        } else {
            vec![0.0; n]
        };
        let lengths: Vec<f64> = (0..n).map(|_| rng.gen_range(lo..=hi)).collect();

        Ok(Self::assemble(
            spec.clone(),
            lengths,
            theta,
            phi,
            BoundsPolicy::Reflect,
        ))
    }

    /// Build a structure from explicit parameters, snapping them into range.
    pub fn from_parameters(
        spec: &StructureSpec,
        lengths: Vec<f64>,
        theta: Vec<f64>,
        phi: Vec<f64>,
    ) -> Result<Self> {
        spec.validate()?;
        let n = spec.segment_count();
        if lengths.len() != n || theta.len() != n || phi.len() != n {
            return Err(SearchError::InvalidArgument(format!(
                "expected {n} lengths and angles, got {}/{}/{}",
                lengths.len(),
                theta.len(),
                phi.len()
            )));
        }
        check_finite(lengths.iter().chain(&theta).chain(&phi))?;
        Ok(Self::assemble(
            spec.clone(),
            lengths,
            theta,
            phi,
            BoundsPolicy::Snap,
        ))
    }

    /// Return a perturbed copy.
    ///
    /// Lengths move by `U(−1, 1)·(max − min)·temperature` and are reflected
    /// back into bounds; θ moves by `U(−1, 1)·π·temperature` modulo 2π; φ
    /// moves by `U(−1, 1)·(π/2)·temperature` and is reflected into
    /// [−π/2, π/2]. The cached performance is dropped.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        temperature: f64,
        mask: MutationMask,
        rng: &mut R,
    ) -> Self {
        let (lo, hi) = self.spec.length_bounds();
        let mut lengths = self.lengths.clone();
        let mut theta = self.theta.clone();
        let mut phi = self.phi.clone();

        if mask.lengths {
            let amplitude = (hi - lo) * temperature;
            for length in &mut lengths {
                *length += rng.gen_range(-1.0..1.0) * amplitude;
            }
        }

        if mask.angles {
            for t in &mut theta {
                *t += rng.gen_range(-1.0..1.0) * PI * temperature;
            }
            if self.spec.three_dimensional {
                for p in &mut phi {
                    *p += rng.gen_range(-1.0..1.0) * FRAC_PI_2 * temperature;
                }
            }
        }

        Self::assemble(
            self.spec.clone(),
            lengths,
            theta,
            phi,
            BoundsPolicy::Reflect,
        )
    }

    /// Return a copy carrying the oracle's verdict for `mode`.
    ///
    /// The oracle is called once; a structure already evaluated for the
    /// same mode is returned unchanged.
    pub fn evaluate<O: FitnessOracle + ?Sized>(self, oracle: &O, mode: CurrentMode) -> Result<Self> {
        if let Some(perf) = &self.performance
            && perf.mode == mode
        {
            return Ok(self);
        }

        let output = oracle.evaluate(&self.points, mode)?;
        if output.force.iter().any(|f| !f.is_finite()) {
            return Err(SearchError::OracleFailure(format!(
                "non-finite force {:?}",
                output.force
            )));
        }

        let performance = Performance {
            envelope: self.envelope,
            mass: self.mass,
            force: norm(output.force),
            force_vector: output.force,
            mode,
        };
        Ok(Self {
            performance: Some(performance),
            ..self
        })
    }

    /// Flatten parameters as `[lengths][θ][φ]`.
    pub fn flatten(&self) -> Vec<f64> {
        let mut params = Vec::with_capacity(3 * self.lengths.len());
        params.extend_from_slice(&self.lengths);
        params.extend_from_slice(&self.theta);
        params.extend_from_slice(&self.phi);
        params
    }

    /// Exact inverse of [`flatten`](Self::flatten): parameters are taken
    /// verbatim and only the geometry is rebuilt.
    pub fn with_parameters(&self, params: &[f64]) -> Result<Self> {
        let (lengths, theta, phi) = self.split_parameters(params)?;
        Ok(Self::from_raw(self.spec.clone(), lengths, theta, phi))
    }

    /// Take a parameter vector from outside the search, snapping lengths
    /// onto the exceeded bound, wrapping θ and clamping φ. Lengths are
    /// snapped after any target-envelope rescale, whatever the ordering.
    pub fn with_parameters_clamped(&self, params: &[f64]) -> Result<Self> {
        let (lengths, theta, phi) = self.split_parameters(params)?;
        check_finite(params.iter())?;
        Ok(Self::assemble(
            self.spec.clone(),
            lengths,
            theta,
            phi,
            BoundsPolicy::Snap,
        ))
    }

    fn split_parameters(&self, params: &[f64]) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let n = self.lengths.len();
        if params.len() != 3 * n {
            return Err(SearchError::InvalidArgument(format!(
                "parameter vector has {} entries, expected {}",
                params.len(),
                3 * n
            )));
        }
        Ok((
            params[..n].to_vec(),
            params[n..2 * n].to_vec(),
            params[2 * n..].to_vec(),
        ))
    }

    /// Enforce bounds and the target envelope, then build the geometry.
    fn assemble(
        spec: StructureSpec,
        mut lengths: Vec<f64>,
        mut theta: Vec<f64>,
        mut phi: Vec<f64>,
        policy: BoundsPolicy,
    ) -> Self {
        let (lo, hi) = spec.length_bounds();
        let planar = !spec.three_dimensional;

        for t in &mut theta {
            *t = wrap_angle(*t);
        }
        for p in &mut phi {
            *p = if planar {
                0.0
            } else {
                policy.apply(*p, -FRAC_PI_2, FRAC_PI_2)
            };
        }

        let enforce = |lengths: &mut Vec<f64>| {
            for length in lengths.iter_mut() {
                *length = policy.apply(*length, lo, hi);
            }
        };

        // Externally supplied vectors always end inside the length bounds.
        let ordering = match policy {
            BoundsPolicy::Reflect => spec.envelope_ordering,
            BoundsPolicy::Snap => EnvelopeOrdering::RescaleThenEnforce,
        };

        match (spec.target_envelope, ordering) {
            (None, _) => enforce(&mut lengths),
            (Some(target), EnvelopeOrdering::EnforceThenRescale) => {
                enforce(&mut lengths);
                rescale_to_envelope(&mut lengths, &theta, &phi, target);
            }
            (Some(target), EnvelopeOrdering::RescaleThenEnforce) => {
                rescale_to_envelope(&mut lengths, &theta, &phi, target);
                enforce(&mut lengths);
            }
        }

        Self::from_raw(spec, lengths, theta, phi)
    }

    fn from_raw(spec: StructureSpec, lengths: Vec<f64>, theta: Vec<f64>, phi: Vec<f64>) -> Self {
        let points = build_polyline(&lengths, &theta, &phi);
        let distances: Vec<f64> = points.iter().map(|p| norm(*p)).collect();
        let envelope = distances.iter().copied().fold(0.0, f64::max);
        let mass = lengths.iter().sum();

        Self {
            spec,
            lengths,
            theta,
            phi,
            points,
            distances,
            envelope,
            mass,
            performance: None,
        }
    }

    /// Shape parameters this structure was built from.
    pub fn spec(&self) -> &StructureSpec {
        &self.spec
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.points.len()
    }

    /// Segment lengths.
    pub fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    /// Polar angles θ, in [0, 2π).
    pub fn theta(&self) -> &[f64] {
        &self.theta
    }

    /// Azimuth angles φ, in [−π/2, π/2].
    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    /// Node positions, node 0 at the origin.
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Distance of every node from the origin.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Maximum node distance from the origin.
    pub fn envelope(&self) -> f64 {
        self.envelope
    }

    /// Sum of segment lengths.
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Cached oracle result, if evaluated since the last change.
    pub fn performance(&self) -> Option<&Performance> {
        self.performance.as_ref()
    }

    /// Score of the cached performance.
    pub fn score(&self, weights: &ScoreWeights) -> Option<f64> {
        self.performance.map(|p| p.score(weights))
    }
}

/// Chain segments from the origin.
fn build_polyline(lengths: &[f64], theta: &[f64], phi: &[f64]) -> Vec<Vec3> {
    let mut points = Vec::with_capacity(lengths.len() + 1);
    let mut current = [0.0; 3];
    points.push(current);
    for ((&length, &t), &p) in lengths.iter().zip(theta).zip(phi) {
        current = add(current, scale(direction(t, p), length));
        points.push(current);
    }
    points
}

/// Scale lengths so the polyline's envelope equals `target`.
fn rescale_to_envelope(lengths: &mut [f64], theta: &[f64], phi: &[f64], target: f64) {
    let envelope = build_polyline(lengths, theta, phi)
        .iter()
        .map(|p| norm(*p))
        .fold(0.0, f64::max);
    if envelope > 0.0 {
        let factor = target / envelope;
        for length in lengths.iter_mut() {
            *length *= factor;
        }
    }
}

fn check_finite<'a>(values: impl Iterator<Item = &'a f64>) -> Result<()> {
    for v in values {
        if !v.is_finite() {
            return Err(SearchError::InvalidArgument(format!(
                "non-finite structure parameter {v}"
            )));
        }
    }
    Ok(())
}
