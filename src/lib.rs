//! bytebuf-pool - size-classed byte buffer pool
//!
//! A thread-safe pool of fixed-capacity byte buffers grouped into size
//! classes. Callers lease a buffer that fits their request and the lease
//! returns it on close, so hot paths stop paying for large allocations.
//!
//! ```
//! use bytebuf_pool::{ByteBufferPool, PoolConfig};
//! use bytes::BufMut;
//!
//! let pool = ByteBufferPool::new(
//!     PoolConfig::new().with_class(1024, 16).with_class(64 * 1024, 4),
//! )
//! .unwrap();
//!
//! let len = pool.with_buffer(900, |buffer| {
//!     buffer.put_slice(b"payload");
//!     buffer.position()
//! });
//! assert_eq!(len, 7);
//! assert_eq!(pool.current_pool_size(), 1);
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod soak;
pub mod util;

pub use config::{Config, PoolConfig};
pub use error::{ConfigError, PoolError};
pub use pool::{Buffer, ByteBufferPool, GrowableLeaseStream, Lease, PoolStats};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
