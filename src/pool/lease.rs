//! Scoped buffer lease
//!
//! A [`Lease`] is the exclusive handle a caller holds on one buffer. It is
//! either open (the buffer is reachable) or closed (the buffer has gone
//! back to its slab, or been dropped if it was unpooled). Closing happens
//! explicitly through [`Lease::close`] or implicitly on drop, so every
//! exit path, unwinding included, returns the buffer.

use std::fmt;
use std::sync::Arc;

use super::buffer::Buffer;
use super::slab::Slab;
use crate::error::PoolError;
use crate::metrics::METRICS;

/// Where a leased buffer goes when the lease closes
pub(crate) enum Origin {
    Pooled(Arc<Slab>),
    Unpooled,
}

enum LeaseState {
    Open { buffer: Buffer, origin: Origin },
    Closed,
}

/// Exclusive, scoped access to one buffer.
///
/// ```
/// use bytebuf_pool::{ByteBufferPool, PoolConfig};
/// use bytes::BufMut;
///
/// let pool = ByteBufferPool::new(PoolConfig::new().with_class(10, 10)).unwrap();
/// let mut lease = pool.acquire(8);
/// lease.buffer().unwrap().put_u64(1);
/// lease.close().unwrap();
/// assert!(lease.buffer().is_err());
/// ```
pub struct Lease {
    state: LeaseState,
}

impl Lease {
    pub(crate) fn pooled(buffer: Buffer, slab: Arc<Slab>) -> Self {
        Self {
            state: LeaseState::Open {
                buffer,
                origin: Origin::Pooled(slab),
            },
        }
    }

    pub(crate) fn unpooled(buffer: Buffer) -> Self {
        Self {
            state: LeaseState::Open {
                buffer,
                origin: Origin::Unpooled,
            },
        }
    }

    /// Mutable access to the leased buffer.
    ///
    /// Fails with [`PoolError::UseAfterRelease`] once the lease is closed.
    pub fn buffer(&mut self) -> Result<&mut Buffer, PoolError> {
        match &mut self.state {
            LeaseState::Open { buffer, .. } => Ok(buffer),
            LeaseState::Closed => Err(use_after_release()),
        }
    }

    /// Shared access to the leased buffer
    pub fn buffer_ref(&self) -> Result<&Buffer, PoolError> {
        match &self.state {
            LeaseState::Open { buffer, .. } => Ok(buffer),
            LeaseState::Closed => Err(use_after_release()),
        }
    }

    pub fn capacity(&self) -> Result<usize, PoolError> {
        self.buffer_ref().map(Buffer::capacity)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, LeaseState::Open { .. })
    }

    /// Whether the buffer belongs to a slab (false for unpooled fallbacks
    /// and for closed leases)
    pub fn is_pooled(&self) -> bool {
        matches!(
            self.state,
            LeaseState::Open {
                origin: Origin::Pooled(_),
                ..
            }
        )
    }

    /// Return the buffer to its slab (or drop it if unpooled).
    ///
    /// Closing twice is a programmer error and reported as
    /// [`PoolError::UseAfterRelease`].
    pub fn close(&mut self) -> Result<(), PoolError> {
        match std::mem::replace(&mut self.state, LeaseState::Closed) {
            LeaseState::Open { buffer, origin } => {
                release(buffer, origin);
                Ok(())
            }
            LeaseState::Closed => Err(use_after_release()),
        }
    }

    /// Take the buffer out of the pool's hands. The slab's created count is
    /// unchanged, so the buffer should eventually come back through
    /// [`ByteBufferPool::release_buffer`](crate::ByteBufferPool::release_buffer).
    pub fn into_buffer(mut self) -> Result<Buffer, PoolError> {
        match std::mem::replace(&mut self.state, LeaseState::Closed) {
            LeaseState::Open { buffer, .. } => Ok(buffer),
            LeaseState::Closed => Err(use_after_release()),
        }
    }
}

fn release(buffer: Buffer, origin: Origin) {
    METRICS.buffer_released();
    match origin {
        Origin::Pooled(slab) => slab.give(buffer),
        Origin::Unpooled => drop(buffer),
    }
}

fn use_after_release() -> PoolError {
    METRICS.use_after_release();
    PoolError::UseAfterRelease
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let LeaseState::Open { buffer, origin } =
            std::mem::replace(&mut self.state, LeaseState::Closed)
        {
            release(buffer, origin);
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            LeaseState::Open { buffer, origin } => f
                .debug_struct("Lease")
                .field("buffer", buffer)
                .field("pooled", &matches!(origin, Origin::Pooled(_)))
                .finish(),
            LeaseState::Closed => f.write_str("Lease(closed)"),
        }
    }
}
