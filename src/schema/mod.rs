//! Schema module - Configuration and progress types for cable search.

mod config;
mod progress;

pub use config::*;
pub use progress::*;
