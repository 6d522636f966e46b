//! Compute module - structure model, population search and local refinement.
//!
//! # Overview
//!
//! - **Geometry** (`geometry`): vector helpers and angle/bound handling
//! - **Oracle** (`oracle`): the force evaluator trait and a uniform-field implementation
//! - **Structure** (`structure`): polyline cable structures, mutation and parameter vectors
//! - **Selection** (`selection`): biased sampling without replacement
//! - **Search** (`search`): the generation loop and its temperature schedule
//! - **Refine** (`refine`): Nelder-Mead refinement of a single structure through NLopt
//! - **Observer** (`observer`): optional progress reporting and early stop
//!
//! # Example
//!
//! ```rust,no_run
//! use cable_evolve::schema::{RefinerConfig, SearchConfig};
//! use cable_evolve::compute::{LocalRefiner, LogObserver, PopulationSearch, UniformFieldOracle};
//!
//! let oracle = UniformFieldOracle::default();
//! let mut search = PopulationSearch::new(SearchConfig::default(), oracle.clone())?;
//! let result = search.run_with_observer(&mut LogObserver)?;
//!
//! let refiner = LocalRefiner::new(RefinerConfig::default())?;
//! let refined = refiner.refine(&result.best_structure, &oracle, &mut LogObserver)?;
//! println!("search {:.3e}, refined {:.3e}", result.best_score, refined.score);
//! # Ok::<(), cable_evolve::SearchError>(())
//! ```

pub mod geometry;
mod observer;
mod oracle;
mod refine;
mod search;
mod selection;
mod structure;

pub use geometry::Vec3;
pub use observer::{FnObserver, LogObserver, NoopObserver, Observer};
pub use oracle::{FitnessOracle, OracleError, OracleOutput, UniformFieldOracle};
pub use refine::{LocalRefiner, Refinement};
pub use search::{
    PopulationSearch, ScoredStructure, SearchResult, TemperatureSchedule, repopulate, select,
};
pub use selection::{biased_choice, biased_indices};
pub use structure::{Performance, StructureModel};
