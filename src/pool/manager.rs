//! Size-classed buffer pool
//!
//! [`ByteBufferPool`] routes each request to the smallest size class that
//! fits, takes a buffer from that class's slab and wraps it in a
//! [`Lease`]. When the class is exhausted the pool either
//!
//! - falls back to the next larger class with room, then to an exact-size
//!   unpooled buffer (default), or
//! - parks the caller until a buffer of that same class is released
//!   (`block_on_exhausted`), which hard-caps memory at the configured maxima.
//!
//! Requests larger than every class always get an unpooled buffer.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::buffer::Buffer;
use super::lease::Lease;
use super::size_class::{ClassIndex, Rounding, SizeClassTable};
use super::slab::Slab;
use super::stats::{ClassStats, PoolStats};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::metrics::METRICS;

/// Inner pool state (shared across clones)
struct PoolInner {
    table: SizeClassTable,
    /// One entry per class; None for classes that are never pooled
    slabs: Box<[Option<Arc<Slab>>]>,
    block_on_exhausted: bool,
}

/// Thread-safe pool of fixed-capacity byte buffers
#[derive(Clone)]
pub struct ByteBufferPool {
    inner: Arc<PoolInner>,
}

impl ByteBufferPool {
    /// Create a pool. Slabs start empty; buffers are allocated on first use.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let table = SizeClassTable::new(config.size_classes)?;

        let slabs: Box<[Option<Arc<Slab>>]> = table
            .iter()
            .map(|(_, class)| {
                Slab::new(*class, config.warning_threshold_percentage).map(Arc::new)
            })
            .collect();

        let mut max_pooled_bytes: usize = 0;
        for slab in slabs.iter().flatten() {
            let class_bytes = slab.capacity().saturating_mul(slab.max_pooled());
            max_pooled_bytes = max_pooled_bytes.saturating_add(class_bytes);
            info!(
                capacity = slab.capacity(),
                max_pooled = slab.max_pooled(),
                warning_threshold = slab.warning_threshold(),
                max_pooled_bytes = class_bytes,
                "Configured pooled buffer size"
            );
        }
        info!(
            classes = table.len(),
            pooled_classes = slabs.iter().flatten().count(),
            block_on_exhausted = config.block_on_exhausted,
            warning_threshold_percentage = config.warning_threshold_percentage,
            max_pooled_bytes,
            "Initialised byte buffer pool"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                table,
                slabs,
                block_on_exhausted: config.block_on_exhausted,
            }),
        })
    }

    /// A pool with no size classes: every lease is an exact-size, unpooled buffer
    pub fn unpooled() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                table: SizeClassTable::default(),
                slabs: Box::new([]),
                block_on_exhausted: false,
            }),
        }
    }

    /// Lease a buffer with capacity >= `min_capacity`.
    ///
    /// Never fails. In blocking mode this may wait indefinitely for a
    /// buffer of the matching class; use [`ByteBufferPool::acquire_timeout`]
    /// to bound the wait.
    pub fn acquire(&self, min_capacity: usize) -> Lease {
        METRICS.buffer_acquired();
        let class = match self.inner.table.class_for(min_capacity) {
            Rounding::Class(class) => class,
            Rounding::Unpooled => return self.unpooled_lease(min_capacity),
        };

        let Some(slab) = self.slab(class) else {
            return self.never_pooled_lease(class);
        };

        if self.inner.block_on_exhausted {
            let buffer = slab.take_blocking();
            return Lease::pooled(buffer, slab.clone());
        }

        self.acquire_with_fallback(min_capacity, class)
    }

    /// Like [`ByteBufferPool::acquire`], but in blocking mode gives up with
    /// [`PoolError::AcquireTimeout`] once `timeout` has passed. In
    /// non-blocking mode this never fails.
    pub fn acquire_timeout(
        &self,
        min_capacity: usize,
        timeout: Duration,
    ) -> Result<Lease, PoolError> {
        if !self.inner.block_on_exhausted {
            return Ok(self.acquire(min_capacity));
        }

        METRICS.buffer_acquired();
        let class = match self.inner.table.class_for(min_capacity) {
            Rounding::Class(class) => class,
            Rounding::Unpooled => return Ok(self.unpooled_lease(min_capacity)),
        };
        let Some(slab) = self.slab(class) else {
            return Ok(self.never_pooled_lease(class));
        };

        // A deadline past what Instant can represent is no deadline at all
        let buffer = match Instant::now().checked_add(timeout) {
            Some(deadline) => slab.take_blocking_until(deadline),
            None => Some(slab.take_blocking()),
        };
        match buffer {
            Some(buffer) => Ok(Lease::pooled(buffer, slab.clone())),
            None => {
                METRICS.wait_timeout();
                Err(PoolError::AcquireTimeout {
                    capacity: slab.capacity(),
                    waited: timeout,
                })
            }
        }
    }

    /// Lease a buffer for the duration of `work`. The buffer goes back to
    /// the pool however `work` exits, including by panic.
    pub fn with_buffer<T, F>(&self, min_capacity: usize, work: F) -> T
    where
        F: FnOnce(&mut Buffer) -> T,
    {
        let mut lease = self.acquire(min_capacity);
        match lease.buffer() {
            Ok(buffer) => work(buffer),
            Err(_) => unreachable!("a freshly acquired lease is open"),
        }
    }

    /// Two independent leases, typically a key and a value buffer
    pub fn acquire_pair(
        &self,
        min_key_capacity: usize,
        min_value_capacity: usize,
    ) -> (Lease, Lease) {
        let key = self.acquire(min_key_capacity);
        let value = self.acquire(min_value_capacity);
        (key, value)
    }

    /// Scoped form of [`ByteBufferPool::acquire_pair`]
    pub fn with_buffer_pair<T, F>(
        &self,
        min_key_capacity: usize,
        min_value_capacity: usize,
        work: F,
    ) -> T
    where
        F: FnOnce(&mut Buffer, &mut Buffer) -> T,
    {
        let (mut key, mut value) = self.acquire_pair(min_key_capacity, min_value_capacity);
        match (key.buffer(), value.buffer()) {
            (Ok(key), Ok(value)) => work(key, value),
            _ => unreachable!("freshly acquired leases are open"),
        }
    }

    /// Hand back a loose buffer, e.g. one detached with
    /// [`Lease::into_buffer`]. A pooled buffer is queued in the slab whose
    /// capacity it matches exactly. Anything else, including buffers from
    /// [`Buffer::allocate`] or unpooled fallbacks, is dropped.
    pub fn release_buffer(&self, buffer: Buffer) {
        METRICS.buffer_released();
        if let Rounding::Class(class) = self.inner.table.class_for(buffer.capacity()) {
            if self.inner.table.capacity(class) == buffer.capacity() {
                if let Some(slab) = self.slab(class) {
                    slab.give(buffer);
                }
            }
        }
    }

    /// Number of idle buffers across all classes. Buffers on loan are not counted.
    pub fn current_pool_size(&self) -> usize {
        self.slabs().map(|slab| slab.available()).sum()
    }

    /// Per-class counters, keyed by capacity
    pub fn snapshot(&self) -> PoolStats {
        let classes = self
            .inner
            .table
            .iter()
            .map(|(class, size_class)| {
                let stats = match self.slab(class) {
                    Some(slab) => ClassStats::new(
                        size_class.capacity,
                        size_class.max_pooled,
                        slab.available(),
                        slab.created(),
                    ),
                    None => ClassStats::new(size_class.capacity, 0, 0, 0),
                };
                (size_class.capacity, stats)
            })
            .collect();
        PoolStats { classes }
    }

    /// Drop every idle buffer. Leases in flight stay valid and return
    /// their buffers as usual when closed.
    pub fn clear(&self) {
        let mut total = 0;
        let mut cleared = Vec::new();
        for slab in self.slabs() {
            let drained = slab.drain();
            total += drained;
            cleared.push(format!("{}:{}", slab.capacity(), drained));
        }
        METRICS.buffers_cleared(total as u64);
        info!(
            total,
            cleared = %cleared.join(", "),
            "Cleared idle buffers from the pool (capacity:count)"
        );
    }

    /// The configured size classes
    pub fn size_classes(&self) -> &SizeClassTable {
        &self.inner.table
    }

    pub fn is_blocking(&self) -> bool {
        self.inner.block_on_exhausted
    }

    /// Walk up from `class` until some slab has room, else go unpooled
    fn acquire_with_fallback(&self, min_capacity: usize, class: ClassIndex) -> Lease {
        let mut current = Some(class);
        while let Some(idx) = current {
            if let Some(slab) = self.slab(idx) {
                if let Some(buffer) = slab.take() {
                    if idx != class {
                        METRICS.larger_class_fallback();
                        debug!(
                            min_capacity,
                            requested_class = self.inner.table.capacity(class),
                            capacity = slab.capacity(),
                            "Size class exhausted, using a larger pooled buffer"
                        );
                    }
                    return Lease::pooled(buffer, slab.clone());
                }
            }
            current = self.inner.table.next_larger(idx);
        }

        debug!(
            min_capacity,
            requested_class = self.inner.table.capacity(class),
            "No pooled buffer available, creating an unpooled buffer"
        );
        self.unpooled_lease(min_capacity)
    }

    /// A class configured with `max_pooled = 0` still sets the capacity
    fn never_pooled_lease(&self, class: ClassIndex) -> Lease {
        self.unpooled_lease(self.inner.table.capacity(class))
    }

    fn unpooled_lease(&self, capacity: usize) -> Lease {
        METRICS.unpooled_allocation();
        Lease::unpooled(Buffer::allocate(capacity))
    }

    fn slab(&self, class: ClassIndex) -> Option<&Arc<Slab>> {
        self.inner.slabs[class.index()].as_ref()
    }

    fn slabs(&self) -> impl Iterator<Item = &Arc<Slab>> + '_ {
        self.inner.slabs.iter().flatten()
    }
}

impl std::fmt::Debug for ByteBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBufferPool")
            .field("classes", &self.inner.table.len())
            .field("block_on_exhausted", &self.inner.block_on_exhausted)
            .field("pool_size", &self.current_pool_size())
            .finish()
    }
}
