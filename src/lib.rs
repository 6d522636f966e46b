//! Cable Evolve - evolutionary design of electrodynamic cable structures.
//!
//! A cable structure is a chain of straight segments hanging off a fixed
//! anchor at the origin. Each segment has a length and a direction given by
//! the angles θ and φ. An external fitness oracle turns the geometry into a
//! force; the crate searches for structures with a high force relative to
//! their mass and spatial envelope.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration and progress types (serde, JSON)
//! - `compute`: Structure model, population search, Nelder-Mead refinement
//!
//! # Example
//!
//! ```rust,no_run
//! use cable_evolve::{
//!     compute::{PopulationSearch, UniformFieldOracle},
//!     schema::SearchConfig,
//! };
//!
//! let config = SearchConfig {
//!     generations: 20,
//!     random_seed: Some(7),
//!     ..Default::default()
//! };
//! let mut search = PopulationSearch::new(config, UniformFieldOracle::default())?;
//! let result = search.run()?;
//!
//! println!("Best score after {} generations: {:.6e}", result.stats.generations, result.best_score);
//! # Ok::<(), cable_evolve::SearchError>(())
//! ```

pub mod compute;
pub mod error;
pub mod schema;

// Re-export commonly used types
pub use compute::{FitnessOracle, LocalRefiner, PopulationSearch, StructureModel};
pub use error::{Result, SearchError};
pub use schema::{RefinerConfig, RunConfig, SearchConfig, StructureSpec};
