//! Error types
//!
//! Configuration problems are fatal at construction. Everything else is a
//! synchronous, local failure of a single pool call.

use std::time::Duration;

/// Invalid pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A size class was declared with zero capacity.
    #[error("buffer capacity must be > 0")]
    ZeroCapacity,

    /// Capacities must be strictly increasing; a repeat counts as non-increasing.
    #[error("buffer capacity {capacity} is not greater than the previous capacity {previous}")]
    NonIncreasingCapacity { previous: usize, capacity: usize },

    /// A negative pooled-buffer count was configured.
    #[error("max pooled count for capacity {capacity} must be >= 0, got {max_pooled}")]
    NegativeMaxPooled { capacity: usize, max_pooled: i64 },

    /// A `pooled_byte_buffer_counts` key that is not an unsigned integer.
    #[error("invalid buffer capacity key {0:?}")]
    InvalidCapacityKey(String),

    /// Warning threshold outside `1..=100`.
    #[error("warning threshold percentage must be in 1..=100, got {0}")]
    InvalidWarningThreshold(u8),
}

/// Errors returned by pool, lease and stream operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),

    /// The lease has already been closed and no longer owns a buffer.
    #[error("lease has already been released")]
    UseAfterRelease,

    /// Growing a buffer would overflow `usize`.
    #[error("capacity overflow: {current} + {additional} bytes")]
    CapacityOverflow { current: usize, additional: usize },

    /// A blocking acquire gave up before a buffer was returned.
    #[error("timed out after {waited:?} waiting for a buffer of capacity {capacity}")]
    AcquireTimeout { capacity: usize, waited: Duration },

    /// A write did not fit in the buffer's remaining space.
    #[error("buffer overflow: {requested} bytes requested, {remaining} remaining")]
    BufferOverflow { requested: usize, remaining: usize },
}

pub type Result<T, E = PoolError> = std::result::Result<T, E>;
