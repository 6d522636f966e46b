//! Progress and report types emitted while searching and refining.

use serde::{Deserialize, Serialize};

/// Progress snapshot after a generation has been scored and ranked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationProgress {
    /// Zero-based generation index.
    pub generation: usize,
    /// Total generations configured.
    pub total_generations: usize,
    /// Mutation temperature used to breed this generation's offspring.
    pub temperature: f64,
    /// Highest score in this generation.
    pub generation_max: f64,
    /// Lowest score in this generation.
    pub generation_min: f64,
    /// Mean score of this generation.
    pub generation_mean: f64,
    /// Best score seen so far.
    pub best_score: f64,
    /// Whether this generation replaced the best-ever record.
    pub improved: bool,
    /// Oracle evaluations performed so far.
    pub evaluations: u64,
}

/// Score history for plotting or analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHistory {
    /// Best-ever score after each generation.
    pub best_score: Vec<f64>,
    /// Maximum score of each generation.
    pub generation_max: Vec<f64>,
    /// Minimum score of each generation.
    pub generation_min: Vec<f64>,
    /// Temperature of each generation.
    pub temperature: Vec<f64>,
}

impl SearchHistory {
    pub(crate) fn record(&mut self, progress: &GenerationProgress) {
        self.best_score.push(progress.best_score);
        self.generation_max.push(progress.generation_max);
        self.generation_min.push(progress.generation_min);
        self.temperature.push(progress.temperature);
    }
}

/// Statistics from a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    /// Generations scored.
    pub generations: usize,
    /// Total oracle evaluations performed.
    pub total_evaluations: u64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

/// Reason a search or refinement stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Ran every configured generation.
    MaxGenerations,
    /// Parameter or objective changes fell below tolerance.
    Converged,
    /// Step cap reached before convergence.
    MaxIterations,
    /// Observer or cancel handle requested a stop.
    Cancelled,
    /// Minimizer gave up before meeting its tolerances (round-off).
    Stalled,
}

/// One local refinement step, describing the candidate just evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinerStep {
    /// One-based step index.
    pub iteration: usize,
    /// Objective evaluations performed so far in this session.
    pub evaluations: usize,
    pub envelope: f64,
    pub mass: f64,
    pub force: f64,
    pub score: f64,
}
