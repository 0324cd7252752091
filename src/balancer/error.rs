//! Balancer error types

use thiserror::Error;

/// Errors surfaced by balancer release operations
#[derive(Debug, Error)]
pub enum BalancerError {
    /// The balancer (or the group that owned it) was already torn down
    #[error("balancer already closed")]
    AlreadyClosed,

    /// Transport-level failure while releasing held resources
    #[error("io error during close: {0}")]
    Io(#[from] std::io::Error),

    /// Any other release failure, carried as a message
    #[error("release failed: {0}")]
    Release(String),
}

/// Result type for balancer operations
pub type BalancerResult<T> = Result<T, BalancerError>;
