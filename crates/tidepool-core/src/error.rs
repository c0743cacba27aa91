//! Error types for the pool engines

use core::fmt;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by pool operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Non-sensical construction or configuration parameter
    InvalidArgument(&'static str),

    /// Task admission failed and no refuse callback is installed
    Overflow,

    /// Submission attempted after the pool was closed
    Closed,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            PoolError::Overflow => write!(f, "task overflow"),
            PoolError::Closed => write!(f, "pool is closed"),
        }
    }
}

impl std::error::Error for PoolError {}
