//! Size-classed byte buffer pool
//!
//! Buffers are grouped into size classes, each backed by its own slab.
//! Callers lease a buffer, use it, and the lease hands it back on close.

mod buffer;
mod lease;
mod manager;
mod size_class;
mod slab;
mod stats;
mod stream;

pub use buffer::Buffer;
pub use lease::Lease;
pub use manager::ByteBufferPool;
pub use size_class::{ClassIndex, Rounding, SizeClass, SizeClassTable};
pub use stats::{ClassStats, PoolStats};
pub use stream::GrowableLeaseStream;
