//! Population search over cable structures.
//!
//! Each generation runs Score → Rank → TrackBest → Select → Repopulate →
//! Mutate → Reshuffle. Selection keeps `keep_size` structures with
//! [`biased_choice`](super::biased_choice) over the ascending ranking, so a
//! bias above 1 favours the top scores. Repopulation refills the population
//! by cyclic replication, every slot is mutated with the generation's
//! temperature, and a uniform reshuffle erases the ranking order before the
//! next generation is scored.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rayon::prelude::*;

use crate::error::{Result, SearchError};
use crate::schema::{GenerationProgress, SearchConfig, SearchHistory, SearchStats, StopReason};

use super::observer::{NoopObserver, Observer};
use super::oracle::FitnessOracle;
use super::selection::biased_indices;
use super::structure::StructureModel;

/// Power-law temperature decay:
/// `T(g) = start · (g + 1)^(ln(end) / ln(generations))`.
///
/// `T(0) = start` and `T(generations − 1) = start · end`. A single
/// generation keeps the temperature at `start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSchedule {
    start: f64,
    end: f64,
    generations: usize,
    exponent: f64,
}

impl TemperatureSchedule {
    /// Build a schedule. `start` and `end` must lie in (0, 1).
    pub fn new(start: f64, end: f64, generations: usize) -> Result<Self> {
        if generations == 0 {
            return Err(SearchError::NumericDomain(
                "temperature schedule needs at least one generation".into(),
            ));
        }
        for (name, value) in [("start", start), ("end", end)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(SearchError::NumericDomain(format!(
                    "temperature {name} must lie in (0, 1), got {value}"
                )));
            }
        }

        let exponent = if generations == 1 {
            0.0
        } else {
            end.ln() / (generations as f64).ln()
        };

        Ok(Self {
            start,
            end,
            generations,
            exponent,
        })
    }

    /// Decay exponent.
    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    /// Temperature of a zero-based generation.
    pub fn at(&self, generation: usize) -> f64 {
        self.start * ((generation + 1) as f64).powf(self.exponent)
    }
}

/// A structure paired with its score.
#[derive(Debug, Clone)]
pub struct ScoredStructure {
    pub score: f64,
    pub structure: StructureModel,
}

/// Final result of a search run.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best score seen in any generation.
    pub best_score: f64,
    /// Structure that achieved `best_score`, with its performance cached.
    pub best_structure: StructureModel,
    /// Per-generation score history.
    pub history: SearchHistory,
    /// Run statistics.
    pub stats: SearchStats,
}

/// Keep `keep` members of an ascending ranking, favouring its top end when
/// `bias > 1`.
pub fn select<T: Clone, R: Rng + ?Sized>(
    ranked: &[T],
    keep: usize,
    bias: f64,
    rng: &mut R,
) -> Result<Vec<T>> {
    super::selection::biased_choice(ranked, keep, bias, rng)
}

/// Refill to `size` slots by cyclic replication: slot `j` takes
/// `kept[j · kept.len() / size]`.
pub fn repopulate<T: Clone>(kept: &[T], size: usize) -> Vec<T> {
    if kept.is_empty() {
        return Vec::new();
    }
    (0..size)
        .map(|j| kept[j * kept.len() / size].clone())
        .collect()
}

/// Evolves a population of cable structures against a fitness oracle.
pub struct PopulationSearch<O> {
    config: SearchConfig,
    schedule: TemperatureSchedule,
    oracle: O,
    rng: StdRng,
    population: Vec<StructureModel>,
    best: Option<ScoredStructure>,
    history: SearchHistory,
    generation: usize,
    evaluations: u64,
    cancelled: Arc<AtomicBool>,
}

impl<O: FitnessOracle> PopulationSearch<O> {
    /// Create a search engine. The configuration is validated here.
    pub fn new(config: SearchConfig, oracle: O) -> Result<Self> {
        config.validate()?;
        let schedule =
            TemperatureSchedule::new(config.temp_start, config.temp_end, config.generations)?;
        let seed = config.random_seed.unwrap_or_else(rand::random);

        Ok(Self {
            config,
            schedule,
            oracle,
            rng: StdRng::seed_from_u64(seed),
            population: Vec::new(),
            best: None,
            history: SearchHistory::default(),
            generation: 0,
            evaluations: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get cancellation handle. Setting it stops the search after the
    /// current generation has been ranked.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Configuration in use.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Temperature schedule in use.
    pub fn schedule(&self) -> &TemperatureSchedule {
        &self.schedule
    }

    /// Initialize the population with random structures.
    pub fn initialize(&mut self) -> Result<()> {
        let spec = &self.config.structure;
        let rng = &mut self.rng;
        self.population = (0..self.config.population_size)
            .map(|_| StructureModel::generate(spec, rng))
            .collect::<Result<Vec<_>>>()?;
        self.best = None;
        self.history = SearchHistory::default();
        self.generation = 0;
        self.evaluations = 0;
        Ok(())
    }

    /// Evaluate every member, keeping population order.
    fn evaluate_population(&mut self, population: Vec<StructureModel>) -> Result<Vec<StructureModel>> {
        let oracle = &self.oracle;
        let mode = self.config.current_mode;
        self.evaluations += population
            .iter()
            .filter(|s| s.performance().is_none())
            .count() as u64;

        if self.config.parallel {
            population
                .into_par_iter()
                .map(|s| s.evaluate(oracle, mode))
                .collect()
        } else {
            population
                .into_iter()
                .map(|s| s.evaluate(oracle, mode))
                .collect()
        }
    }

    /// Score the population and sort it ascending. Any oracle failure
    /// aborts the generation.
    fn score_and_rank(&mut self) -> Result<Vec<ScoredStructure>> {
        let population = std::mem::take(&mut self.population);
        let evaluated = self.evaluate_population(population)?;

        let weights = self.config.score;
        let mut ranked = evaluated
            .into_iter()
            .map(|structure| {
                let score = structure
                    .score(&weights)
                    .ok_or_else(|| SearchError::OracleFailure("structure left unevaluated".into()))?;
                if !score.is_finite() {
                    return Err(SearchError::OracleFailure(format!(
                        "non-finite score {score} (mass {}, envelope {})",
                        structure.mass(),
                        structure.envelope()
                    )));
                }
                Ok(ScoredStructure { score, structure })
            })
            .collect::<Result<Vec<_>>>()?;

        // Stable, so equal scores keep their population order.
        ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(ranked)
    }

    /// Replace the best-ever record when this generation ties or beats it.
    fn track_best(&mut self, ranked: &[ScoredStructure]) -> bool {
        let Some(top) = ranked.last() else {
            return false;
        };
        let improved = self.best.as_ref().is_none_or(|best| top.score >= best.score);
        if improved {
            self.best = Some(top.clone());
        }
        improved
    }

    /// Mutate every slot with its own child RNG, seeded in index order.
    fn mutate_population(&mut self, parents: Vec<StructureModel>, temperature: f64) -> Vec<StructureModel> {
        let mask = self.config.mutation;
        let seeds: Vec<u64> = (0..parents.len()).map(|_| self.rng.r#gen()).collect();

        if self.config.parallel {
            return parents
                .into_par_iter()
                .zip(seeds)
                .map(|(parent, seed)| {
                    let mut rng = StdRng::seed_from_u64(seed);
                    parent.mutate(temperature, mask, &mut rng)
                })
                .collect();
        }

        parents
            .into_iter()
            .zip(seeds)
            .map(|(parent, seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                parent.mutate(temperature, mask, &mut rng)
            })
            .collect()
    }

    /// Run one generation. Returns whether the observer asked to stop.
    fn step_generation<Ob: Observer + ?Sized>(&mut self, observer: &mut Ob) -> Result<ControlFlow<()>> {
        let generation = self.generation;
        let temperature = self.schedule.at(generation);

        let ranked = self.score_and_rank()?;
        let improved = self.track_best(&ranked);
        self.generation += 1;

        let best_score = self.best.as_ref().map_or(f64::NEG_INFINITY, |b| b.score);
        let generation_min = ranked.first().map_or(f64::NAN, |c| c.score);
        let generation_max = ranked.last().map_or(f64::NAN, |c| c.score);
        let generation_mean = ranked.iter().map(|c| c.score).sum::<f64>() / ranked.len() as f64;

        let progress = GenerationProgress {
            generation,
            total_generations: self.config.generations,
            temperature,
            generation_max,
            generation_min,
            generation_mean,
            best_score,
            improved,
            evaluations: self.evaluations,
        };
        self.history.record(&progress);
        log::debug!(
            "generation {generation}: max {generation_max:.6e}, min {generation_min:.6e}, best {best_score:.6e}"
        );

        let flow = observer.on_generation_complete(&progress);
        if flow.is_break() || self.cancelled.load(Ordering::Relaxed) {
            return Ok(ControlFlow::Break(()));
        }
        if self.generation >= self.config.generations {
            // Offspring of the last generation would never be scored.
            return Ok(ControlFlow::Continue(()));
        }

        let size = self.config.population_size;
        let kept_indices =
            biased_indices(ranked.len(), self.config.keep_size, self.config.selection_bias, &mut self.rng)?;
        let kept: Vec<StructureModel> = kept_indices
            .into_iter()
            .map(|i| ranked[i].structure.clone())
            .collect();
        drop(ranked);

        let parents = repopulate(&kept, size);
        let offspring = self.mutate_population(parents, temperature);

        let order = biased_indices(size, size, 1.0, &mut self.rng)?;
        let mut slots: Vec<Option<StructureModel>> = offspring.into_iter().map(Some).collect();
        self.population = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        Ok(ControlFlow::Continue(()))
    }

    /// Run the search, reporting each generation to `observer`.
    pub fn run_with_observer<Ob: Observer + ?Sized>(&mut self, observer: &mut Ob) -> Result<SearchResult> {
        let start_time = Instant::now();
        log::info!(
            "starting search: {} structures x {} generations, {} nodes, keep {}",
            self.config.population_size,
            self.config.generations,
            self.config.structure.node_count,
            self.config.keep_size
        );

        self.initialize()?;

        let stop_reason = loop {
            if self.step_generation(observer)?.is_break() {
                break StopReason::Cancelled;
            }
            if self.generation >= self.config.generations {
                break StopReason::MaxGenerations;
            }
        };

        let best = self
            .best
            .clone()
            .ok_or_else(|| SearchError::InvalidArgument("no generation was scored".into()))?;

        let elapsed = start_time.elapsed().as_secs_f64();
        log::info!(
            "search finished after {} generations ({:?}): best score {:.6e}",
            self.generation,
            stop_reason,
            best.score
        );

        Ok(SearchResult {
            best_score: best.score,
            best_structure: best.structure,
            history: self.history.clone(),
            stats: SearchStats {
                generations: self.generation,
                total_evaluations: self.evaluations,
                elapsed_seconds: elapsed,
                stop_reason,
            },
        })
    }

    /// Run the search without an observer.
    pub fn run(&mut self) -> Result<SearchResult> {
        self.run_with_observer(&mut NoopObserver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::geometry::Vec3;
    use crate::compute::{FnObserver, OracleError, OracleOutput, UniformFieldOracle};
    use crate::schema::{CurrentMode, ScoreWeights, StructureSpec};

    fn end_to_end(points: &[Vec3], _: CurrentMode) -> std::result::Result<OracleOutput, OracleError> {
        Ok(OracleOutput {
            force: points[points.len() - 1],
            samples: Vec::new(),
        })
    }

    fn small_config() -> SearchConfig {
        SearchConfig {
            structure: StructureSpec {
                node_count: 6,
                segment_len_min: 1.0,
                segment_len_max: 3.0,
                ..Default::default()
            },
            population_size: 12,
            keep_size: 4,
            generations: 8,
            temp_start: 0.5,
            temp_end: 0.1,
            score: ScoreWeights {
                mass_exponent: 1.0,
                envelope_exponent: 0.0,
            },
            random_seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_schedule_reference_values() {
        let schedule = TemperatureSchedule::new(0.5, 0.2, 10).unwrap();
        let expected_exponent = 0.2f64.ln() / 10.0f64.ln();
        assert!((schedule.exponent() - expected_exponent).abs() < 1e-15);
        assert!((schedule.exponent() - (-0.698_970_004_336_018_8)).abs() < 1e-12);
        assert!((schedule.at(0) - 0.5).abs() < 1e-15);
        assert!((schedule.at(9) - 0.1).abs() < 1e-12);
        // Monotone decay in between.
        for g in 1..10 {
            assert!(schedule.at(g) < schedule.at(g - 1));
        }
    }

    #[test]
    fn test_schedule_single_generation() {
        let schedule = TemperatureSchedule::new(0.3, 0.1, 1).unwrap();
        assert_eq!(schedule.at(0), 0.3);
    }

    #[test]
    fn test_schedule_domain_errors() {
        for (start, end, generations) in [
            (0.5, 1.0, 10),
            (0.5, 0.0, 10),
            (0.5, 2.0, 10),
            (1.5, 0.2, 10),
            (0.5, 0.2, 0),
        ] {
            assert!(matches!(
                TemperatureSchedule::new(start, end, generations),
                Err(SearchError::NumericDomain(_))
            ));
        }
    }

    #[test]
    fn test_repopulate_cyclic() {
        assert_eq!(repopulate(&['a', 'b'], 5), vec!['a', 'a', 'a', 'b', 'b']);
        assert_eq!(repopulate(&[1, 2, 3], 3), vec![1, 2, 3]);
        assert_eq!(repopulate(&[7], 4), vec![7, 7, 7, 7]);
    }

    #[test]
    fn test_select_keep_all() {
        let ranked = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        for (seed, bias) in [(1, 1.0), (2, 4.0), (3, 100.0)] {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut kept = select(&ranked, 5, bias, &mut rng).unwrap();
            kept.sort_by(f64::total_cmp);
            assert_eq!(kept, ranked);
        }
    }

    #[test]
    fn test_engine_creation() {
        let mut search = PopulationSearch::new(small_config(), end_to_end).unwrap();
        search.initialize().unwrap();
        assert_eq!(search.population.len(), 12);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SearchConfig {
            keep_size: 20,
            ..small_config()
        };
        assert!(matches!(
            PopulationSearch::new(config, end_to_end),
            Err(SearchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_run_tracks_best() {
        let mut search = PopulationSearch::new(small_config(), end_to_end).unwrap();
        let result = search.run().unwrap();

        assert_eq!(result.stats.generations, 8);
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.stats.total_evaluations, 8 * 12);
        assert_eq!(result.history.best_score.len(), 8);

        for pair in result.history.best_score.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        let max_seen = result
            .history
            .generation_max
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.best_score, max_seen);

        let weights = search.config().score;
        assert_eq!(result.best_structure.score(&weights), Some(result.best_score));
    }

    #[test]
    fn test_run_is_reproducible_across_parallelism() {
        let parallel = PopulationSearch::new(small_config(), end_to_end)
            .unwrap()
            .run()
            .unwrap();
        let sequential = PopulationSearch::new(
            SearchConfig {
                parallel: false,
                ..small_config()
            },
            end_to_end,
        )
        .unwrap()
        .run()
        .unwrap();

        assert_eq!(parallel.best_score, sequential.best_score);
        assert_eq!(parallel.history.generation_min, sequential.history.generation_min);
        assert_eq!(
            parallel.best_structure.flatten(),
            sequential.best_structure.flatten()
        );
    }

    #[test]
    fn test_observer_can_stop() {
        let mut seen = Vec::new();
        let mut observer = FnObserver::new(
            |progress: &GenerationProgress| {
                seen.push(progress.generation);
                if progress.generation == 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
            |_: &crate::schema::RefinerStep| ControlFlow::Continue(()),
        );

        let mut search = PopulationSearch::new(small_config(), end_to_end).unwrap();
        let result = search.run_with_observer(&mut observer).unwrap();
        drop(observer);

        assert_eq!(seen, vec![0, 1]);
        assert_eq!(result.stats.generations, 2);
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn test_cancellation() {
        let mut search = PopulationSearch::new(small_config(), end_to_end).unwrap();
        let cancel = search.cancel_handle();

        // Cancel immediately
        cancel.store(true, Ordering::Relaxed);

        let result = search.run().unwrap();
        assert_eq!(result.stats.generations, 1);
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn test_ties_favour_latest_generation() {
        // Constant force with mass_exponent 0: every structure scores 1.
        let calls = std::sync::Mutex::new(Vec::new());
        let constant = |points: &[Vec3], _: CurrentMode| -> std::result::Result<OracleOutput, OracleError> {
            calls.lock().unwrap().push(points.to_vec());
            Ok(OracleOutput {
                force: [1.0, 0.0, 0.0],
                samples: Vec::new(),
            })
        };
        let config = SearchConfig {
            parallel: false,
            score: ScoreWeights::default(),
            ..small_config()
        };

        let mut improved = Vec::new();
        let mut observer = FnObserver::new(
            |progress: &GenerationProgress| {
                improved.push(progress.improved);
                ControlFlow::Continue(())
            },
            |_: &crate::schema::RefinerStep| ControlFlow::Continue(()),
        );
        let mut search = PopulationSearch::new(config, constant).unwrap();
        let result = search.run_with_observer(&mut observer).unwrap();
        drop(observer);

        assert_eq!(improved, vec![true; 8]);
        assert_eq!(result.best_score, 1.0);

        // Sequential scoring calls the oracle in population order and the
        // stable sort keeps equal scores in that order, so the top of the
        // last generation is its last evaluated member.
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 8 * 12);
        assert_eq!(result.best_structure.points(), calls[calls.len() - 1].as_slice());
    }

    #[test]
    fn test_oracle_failure_aborts() {
        let failing = |_: &[Vec3], _: CurrentMode| -> std::result::Result<OracleOutput, OracleError> {
            Err(OracleError::Other("ephemeris out of range".into()))
        };
        let mut search = PopulationSearch::new(small_config(), failing).unwrap();
        assert!(matches!(search.run(), Err(SearchError::OracleFailure(_))));
    }

    #[test]
    fn test_population_size_one() {
        let config = SearchConfig {
            population_size: 1,
            keep_size: 1,
            ..small_config()
        };
        let result = PopulationSearch::new(config, end_to_end).unwrap().run().unwrap();
        assert_eq!(result.stats.generations, 8);
    }

    #[test]
    fn test_uniform_field_oracle_run() {
        let config = SearchConfig {
            current_mode: CurrentMode::Induced,
            score: ScoreWeights {
                mass_exponent: 0.5,
                envelope_exponent: 0.5,
            },
            ..small_config()
        };
        let mut search = PopulationSearch::new(config, UniformFieldOracle::default()).unwrap();
        let result = search.run().unwrap();
        assert!(result.best_score.is_finite());
        assert!(result.best_score >= 0.0);
    }
}
