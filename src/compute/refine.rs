//! Local refinement of a single structure.
//!
//! The structure's parameters are flattened into `[lengths][θ][φ]` and
//! NLopt's Nelder-Mead minimizes `−score^bias_power`. Every trial vector is
//! pulled back into range with the snapping policy before it reaches the
//! oracle, so the simplex can wander freely while the oracle only ever sees
//! valid geometry.
//!
//! NLopt owns the iteration. Bookkeeping, progress reporting and stop
//! requests all happen inside the objective callback, which holds the
//! `RefinementSession`. A stop (observer break or oracle failure) is
//! signalled by returning `−∞` against a stop value of `f64::MIN`.

use std::ops::ControlFlow;

use nlopt::{Algorithm, Nlopt, Target};

use crate::error::{Result, SearchError};
use crate::schema::{RefinerConfig, RefinerStep, StopReason};

use super::observer::Observer;
use super::oracle::FitnessOracle;
use super::structure::StructureModel;

/// Offset used for zero coordinates when sizing the initial simplex.
const ZERO_COORDINATE_STEP: f64 = 0.00025;

/// Outcome of a refinement.
#[derive(Debug, Clone)]
pub struct Refinement {
    /// Refined structure, evaluated with the refiner's current mode.
    pub structure: StructureModel,
    /// Score of `structure` under the refiner's weights.
    pub score: f64,
    /// Whether the minimizer met its tolerances.
    pub converged: bool,
    /// Refinement steps taken.
    pub iterations: usize,
    /// Oracle evaluations performed.
    pub evaluations: usize,
    pub stop_reason: StopReason,
}

/// Nelder-Mead refiner for cable structures.
#[derive(Debug, Clone)]
pub struct LocalRefiner {
    config: RefinerConfig,
}

impl LocalRefiner {
    /// Create a refiner. The configuration is validated here.
    pub fn new(config: RefinerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration in use.
    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Refine `structure` and return the improved copy. The input is left
    /// untouched.
    pub fn refine<O, Ob>(
        &self,
        structure: &StructureModel,
        oracle: &O,
        observer: &mut Ob,
    ) -> Result<Refinement>
    where
        O: FitnessOracle + ?Sized,
        Ob: Observer + ?Sized,
    {
        let config = &self.config;
        let x0 = structure.flatten();
        let steps = initial_steps(&x0, config.initial_step);

        log::info!(
            "refining structure with {} parameters (max {} steps)",
            x0.len(),
            config.max_iterations
        );

        let mut session = RefinementSession::new(structure.clone(), oracle, observer, config);
        let mut x = x0.clone();

        let status = {
            let mut optimizer = Nlopt::new(
                Algorithm::Neldermead,
                x0.len(),
                session_objective::<O, Ob>,
                Target::Minimize,
                &mut session,
            );
            nlopt_setting("initial step", optimizer.set_initial_step(&steps))?;
            nlopt_setting(
                "step cap",
                optimizer.set_maxeval(u32::try_from(config.max_iterations).unwrap_or(u32::MAX)),
            )?;
            nlopt_setting("x tolerance", optimizer.set_xtol_abs1(config.tolerance))?;
            nlopt_setting("f tolerance", optimizer.set_ftol_abs(config.f_tolerance))?;
            nlopt_setting("stop value", optimizer.set_stopval(f64::MIN))?;
            optimizer.optimize(&mut x)
        };

        if let Some(err) = session.failure.take() {
            return Err(err);
        }

        let stop_reason = if session.cancelled {
            StopReason::Cancelled
        } else {
            match status {
                Ok(_) if session.evaluations >= config.max_iterations => StopReason::MaxIterations,
                Ok(_) => StopReason::Converged,
                Err((state, _)) => {
                    log::debug!("nlopt stopped with {state:?}");
                    StopReason::Stalled
                }
            }
        };
        let converged = stop_reason == StopReason::Converged;
        let iterations = session.evaluations;
        if !converged {
            log::warn!(
                "refinement stopped without converging after {iterations} steps ({stop_reason:?})"
            );
        }

        // The best candidate is already the clamped, rebuilt and evaluated
        // form of the best vector.
        let refined = match session.best.take() {
            Some(best) => best.structure,
            None => session
                .template
                .with_parameters_clamped(&x0)?
                .evaluate(oracle, config.current_mode)?,
        };
        let score = refined
            .score(&config.score)
            .ok_or_else(|| SearchError::OracleFailure("refined structure left unevaluated".into()))?;

        log::info!(
            "refinement finished: score {score:.6e} after {iterations} steps ({stop_reason:?})"
        );

        Ok(Refinement {
            structure: refined,
            score,
            converged,
            iterations,
            evaluations: session.evaluations,
            stop_reason,
        })
    }
}

/// Per-coordinate initial simplex offsets: `relative · |x|`, or a fixed
/// small offset for zero coordinates.
fn initial_steps(x0: &[f64], relative: f64) -> Vec<f64> {
    x0.iter()
        .map(|x| {
            if *x == 0.0 {
                ZERO_COORDINATE_STEP
            } else {
                relative * x.abs()
            }
        })
        .collect()
}

fn nlopt_setting<S, F: std::fmt::Debug>(name: &str, result: std::result::Result<S, F>) -> Result<()> {
    result
        .map(|_| ())
        .map_err(|e| SearchError::InvalidArgument(format!("nlopt rejected {name}: {e:?}")))
}

/// Best candidate seen so far.
struct BestCandidate {
    value: f64,
    structure: StructureModel,
}

/// Per-refinement state: the template the parameters are applied to, the
/// step counter, the best candidate and any stop request.
struct RefinementSession<'a, O: ?Sized, Ob: ?Sized> {
    template: StructureModel,
    oracle: &'a O,
    observer: &'a mut Ob,
    config: &'a RefinerConfig,
    evaluations: usize,
    best: Option<BestCandidate>,
    failure: Option<SearchError>,
    cancelled: bool,
}

impl<'a, O, Ob> RefinementSession<'a, O, Ob>
where
    O: FitnessOracle + ?Sized,
    Ob: Observer + ?Sized,
{
    fn new(
        template: StructureModel,
        oracle: &'a O,
        observer: &'a mut Ob,
        config: &'a RefinerConfig,
    ) -> Self {
        Self {
            template,
            oracle,
            observer,
            config,
            evaluations: 0,
            best: None,
            failure: None,
            cancelled: false,
        }
    }

    fn halted(&self) -> bool {
        self.cancelled || self.failure.is_some()
    }

    /// Objective value for NLopt. Non-finite values rank as the worst
    /// possible; `−∞` is reserved for stop requests.
    fn objective(&mut self, x: &[f64]) -> f64 {
        if self.halted() {
            return f64::NEG_INFINITY;
        }

        let candidate = match self
            .template
            .with_parameters_clamped(x)
            .and_then(|c| c.evaluate(self.oracle, self.config.current_mode))
        {
            Ok(candidate) => candidate,
            Err(err) => {
                log::debug!("refinement step failed: {err}");
                self.failure = Some(err);
                return f64::NEG_INFINITY;
            }
        };
        self.evaluations += 1;

        let score = candidate.score(&self.config.score).unwrap_or(f64::NAN);
        let value = -score.powf(self.config.bias_power);
        let value = if value.is_finite() { value } else { f64::INFINITY };

        let step = RefinerStep {
            iteration: self.evaluations,
            evaluations: self.evaluations,
            envelope: candidate.envelope(),
            mass: candidate.mass(),
            force: candidate.performance().map_or(f64::NAN, |p| p.force),
            score,
        };

        if value.is_finite() && self.best.as_ref().is_none_or(|best| value < best.value) {
            self.best = Some(BestCandidate {
                value,
                structure: candidate,
            });
        }

        if let ControlFlow::Break(()) = self.observer.on_refiner_step(&step) {
            self.cancelled = true;
            return f64::NEG_INFINITY;
        }
        value
    }
}

fn session_objective<O, Ob>(
    x: &[f64],
    _gradient: Option<&mut [f64]>,
    session: &mut &mut RefinementSession<'_, O, Ob>,
) -> f64
where
    O: FitnessOracle + ?Sized,
    Ob: Observer + ?Sized,
{
    session.objective(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::geometry::Vec3;
    use crate::compute::{FnObserver, NoopObserver, OracleError, OracleOutput};
    use crate::schema::{CurrentMode, GenerationProgress, ScoreWeights, StructureSpec};

    fn end_to_end(points: &[Vec3], _: CurrentMode) -> std::result::Result<OracleOutput, OracleError> {
        Ok(OracleOutput {
            force: points[points.len() - 1],
            samples: Vec::new(),
        })
    }

    fn single_segment(length: f64) -> StructureModel {
        let spec = StructureSpec {
            node_count: 2,
            segment_len_min: 1.0,
            segment_len_max: 2.0,
            three_dimensional: false,
            ..Default::default()
        };
        StructureModel::from_parameters(&spec, vec![length], vec![0.3], vec![0.0]).unwrap()
    }

    fn config(mass_exponent: f64) -> RefinerConfig {
        RefinerConfig {
            max_iterations: 400,
            score: ScoreWeights {
                mass_exponent,
                envelope_exponent: 0.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_steps() {
        assert_eq!(initial_steps(&[2.0, 0.0, -4.0], 0.05), vec![0.1, 0.00025, 0.2]);
    }

    #[test]
    fn test_increasing_objective_ends_on_upper_bound() {
        let refiner = LocalRefiner::new(config(0.0)).unwrap();
        let refinement = refiner
            .refine(&single_segment(1.5), &end_to_end, &mut NoopObserver)
            .unwrap();
        assert_eq!(refinement.structure.lengths(), &[2.0]);
        assert!((refinement.score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_decreasing_objective_ends_on_lower_bound() {
        // force = length, mass = length: score = 1/length.
        let refiner = LocalRefiner::new(config(2.0)).unwrap();
        let refinement = refiner
            .refine(&single_segment(1.5), &end_to_end, &mut NoopObserver)
            .unwrap();
        assert_eq!(refinement.structure.lengths(), &[1.0]);
        assert!((refinement.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_input_left_untouched() {
        let structure = single_segment(1.5);
        let before = structure.flatten();
        let refiner = LocalRefiner::new(config(0.0)).unwrap();
        let refinement = refiner
            .refine(&structure, &end_to_end, &mut NoopObserver)
            .unwrap();
        assert_eq!(structure.flatten(), before);
        assert!(structure.performance().is_none());
        assert!(refinement.structure.performance().is_some());
    }

    #[test]
    fn test_observer_sees_every_step_and_can_stop() {
        let mut steps = Vec::new();
        let mut observer = FnObserver::new(
            |_: &GenerationProgress| ControlFlow::Continue(()),
            |step: &RefinerStep| {
                steps.push((step.iteration, step.score));
                if step.iteration == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        );
        let refiner = LocalRefiner::new(config(0.0)).unwrap();
        let refinement = refiner
            .refine(&single_segment(1.2), &end_to_end, &mut observer)
            .unwrap();
        drop(observer);

        // Reported from the very first evaluation, before the initial
        // simplex is even complete.
        assert_eq!(steps.iter().map(|s| s.0).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(refinement.iterations, 3);
        assert_eq!(refinement.evaluations, 3);
        assert_eq!(refinement.stop_reason, StopReason::Cancelled);
        assert!(!refinement.converged);
        // The returned structure is the best of the three candidates.
        let best = steps.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(refinement.score, best);
    }

    #[test]
    fn test_step_cap() {
        let refiner = LocalRefiner::new(RefinerConfig {
            max_iterations: 6,
            tolerance: 0.0,
            f_tolerance: 0.0,
            ..config(0.0)
        })
        .unwrap();
        let refinement = refiner
            .refine(&single_segment(1.2), &end_to_end, &mut NoopObserver)
            .unwrap();
        assert_eq!(refinement.evaluations, 6);
        assert_eq!(refinement.stop_reason, StopReason::MaxIterations);
        assert!(!refinement.converged);
    }

    #[test]
    fn test_oracle_failure_propagates() {
        let failing = |_: &[Vec3], _: CurrentMode| -> std::result::Result<OracleOutput, OracleError> {
            Err(OracleError::Other("field model unavailable".into()))
        };
        let refiner = LocalRefiner::new(config(0.0)).unwrap();
        let err = refiner
            .refine(&single_segment(1.5), &failing, &mut NoopObserver)
            .unwrap_err();
        assert!(matches!(err, SearchError::OracleFailure(_)));
    }

    #[test]
    fn test_invalid_config() {
        let result = LocalRefiner::new(RefinerConfig {
            max_iterations: 0,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
