//! Error type shared by the structure model, the search and the refiner.

/// Errors raised while building, searching or refining cable structures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid segment length bounds: min {min}, max {max} (need 0 < min <= max)")]
    InvalidBounds { min: f64, max: f64 },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Numeric domain error: {0}")]
    NumericDomain(String),
    #[error("Fitness oracle failure: {0}")]
    OracleFailure(String),
}

impl From<crate::compute::OracleError> for SearchError {
    fn from(err: crate::compute::OracleError) -> Self {
        SearchError::OracleFailure(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SearchError>;
