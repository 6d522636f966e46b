//! Optional progress observer for the search and the refiner.

use std::ops::ControlFlow;

use crate::schema::{GenerationProgress, RefinerStep};

/// Receives progress between generations and between refinement steps.
///
/// Returning `ControlFlow::Break(())` stops the running search or
/// refinement at the next boundary. Both methods default to continuing.
pub trait Observer {
    /// Called after a generation has been scored and ranked.
    fn on_generation_complete(&mut self, _progress: &GenerationProgress) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Called after each objective evaluation of a refinement session.
    fn on_refiner_step(&mut self, _step: &RefinerStep) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Observer that never stops anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Observer that logs progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_generation_complete(&mut self, progress: &GenerationProgress) -> ControlFlow<()> {
        log::info!(
            "generation {}/{}: max {:.6e}, min {:.6e}, best {:.6e}, T={:.4}",
            progress.generation + 1,
            progress.total_generations,
            progress.generation_max,
            progress.generation_min,
            progress.best_score,
            progress.temperature
        );
        ControlFlow::Continue(())
    }

    fn on_refiner_step(&mut self, step: &RefinerStep) -> ControlFlow<()> {
        log::info!(
            "refine iteration {}: score {:.6e} (envelope {:.3}, mass {:.3}, force {:.6e})",
            step.iteration,
            step.score,
            step.envelope,
            step.mass,
            step.force
        );
        ControlFlow::Continue(())
    }
}

/// Adapts a pair of closures into an [`Observer`].
pub struct FnObserver<G, S> {
    on_generation: G,
    on_step: S,
}

impl<G, S> FnObserver<G, S>
where
    G: FnMut(&GenerationProgress) -> ControlFlow<()>,
    S: FnMut(&RefinerStep) -> ControlFlow<()>,
{
    /// Create an observer from generation and refiner-step callbacks.
    pub fn new(on_generation: G, on_step: S) -> Self {
        Self {
            on_generation,
            on_step,
        }
    }
}

impl<G, S> Observer for FnObserver<G, S>
where
    G: FnMut(&GenerationProgress) -> ControlFlow<()>,
    S: FnMut(&RefinerStep) -> ControlFlow<()>,
{
    fn on_generation_complete(&mut self, progress: &GenerationProgress) -> ControlFlow<()> {
        (self.on_generation)(progress)
    }

    fn on_refiner_step(&mut self, step: &RefinerStep) -> ControlFlow<()> {
        (self.on_step)(step)
    }
}
