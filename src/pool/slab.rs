//! Per-class buffer slab
//!
//! Holds the idle buffers of one size class in a lock-free queue and
//! counts how many buffers the class has ever handed out. Each slab is
//! synchronised on its own, so threads only contend with others asking
//! for the same capacity. The mutex/condvar pair is touched only by
//! threads that block on an exhausted class and by releases that have
//! to wake them.

use crossbeam::queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, warn};

use super::buffer::Buffer;
use super::size_class::SizeClass;
use crate::metrics::METRICS;

/// Idle buffers and creation accounting for a single size class
pub(crate) struct Slab {
    class: SizeClass,
    /// Buffers currently sitting in the pool
    available: SegQueue<Buffer>,
    /// Number of buffers in (or reserved for) `available`, never above `max_pooled`
    available_count: AtomicUsize,
    /// Buffers created for this class and still accounted to it
    created: AtomicUsize,
    /// Created count at which a capacity warning is logged
    warning_threshold: Option<usize>,
    warning_threshold_percentage: u8,
    /// Threads parked in `take_blocking`
    waiters: AtomicUsize,
    wait_lock: Mutex<()>,
    returned: Condvar,
}

impl Slab {
    /// Create an empty slab. Buffers are allocated lazily by [`Slab::take`].
    ///
    /// Returns None if the class is not pooled (`max_pooled == 0`).
    pub fn new(class: SizeClass, warning_threshold_percentage: u8) -> Option<Self> {
        if !class.is_pooled() {
            return None;
        }

        let warning_threshold = (class.max_pooled > 1).then(|| {
            let scaled = class.max_pooled as u128 * warning_threshold_percentage as u128;
            scaled.div_ceil(100) as usize
        });

        Some(Self {
            class,
            available: SegQueue::new(),
            available_count: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            warning_threshold,
            warning_threshold_percentage,
            waiters: AtomicUsize::new(0),
            wait_lock: Mutex::new(()),
            returned: Condvar::new(),
        })
    }

    /// Pop an idle buffer, or create one if the class is below its limit.
    /// Returns None if the class is exhausted.
    pub fn take(&self) -> Option<Buffer> {
        if let Some(buffer) = self.available.pop() {
            self.available_count.fetch_sub(1, Ordering::AcqRel);
            METRICS.pooled_hit();
            return Some(buffer);
        }
        self.create_if_allowed()
    }

    /// Like [`Slab::take`] but parks the caller until a buffer of this
    /// class is given back.
    pub fn take_blocking(&self) -> Buffer {
        loop {
            if let Some(buffer) = self.wait_for_buffer(None) {
                return buffer;
            }
        }
    }

    /// Like [`Slab::take_blocking`], giving up once `deadline` passes
    pub fn take_blocking_until(&self, deadline: Instant) -> Option<Buffer> {
        self.wait_for_buffer(Some(deadline))
    }

    fn wait_for_buffer(&self, deadline: Option<Instant>) -> Option<Buffer> {
        if let Some(buffer) = self.take() {
            return Some(buffer);
        }

        METRICS.blocked_wait();
        debug!(
            capacity = self.class.capacity,
            max_pooled = self.class.max_pooled,
            "Size class exhausted, waiting for a buffer to be released"
        );

        let mut guard = self.wait_lock.lock();
        self.waiters.fetch_add(1, Ordering::SeqCst);
        // Pairs with the fence in `wake_one`: either we see the pushed
        // buffer or the releaser sees us waiting.
        fence(Ordering::SeqCst);

        let result = loop {
            if let Some(buffer) = self.take() {
                break Some(buffer);
            }
            match deadline {
                None => self.returned.wait(&mut guard),
                Some(deadline) => {
                    if self.returned.wait_until(&mut guard, deadline).timed_out() {
                        break self.take();
                    }
                }
            }
        };

        self.waiters.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Return a buffer to the slab.
    ///
    /// The cursor is reset. The buffer is dropped instead if it is the
    /// wrong size, was never created by a slab, or queueing it would leave
    /// more idle buffers than `max_pooled` or than the slab has created.
    pub fn give(&self, mut buffer: Buffer) {
        if buffer.capacity() != self.class.capacity {
            error!(
                buffer_capacity = buffer.capacity(),
                slab_capacity = self.class.capacity,
                "Buffer returned to a slab of a different size, discarding it"
            );
            METRICS.buffer_discarded();
            return;
        }
        if !buffer.is_pooled() {
            debug!(
                capacity = buffer.capacity(),
                "Unpooled buffer returned to a slab, discarding it"
            );
            METRICS.buffer_discarded();
            return;
        }

        let max = self.class.max_pooled;
        let reserved = self
            .available_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                let limit = max.min(self.created.load(Ordering::Acquire));
                (n < limit).then_some(n + 1)
            })
            .is_ok();

        if reserved {
            buffer.clear();
            self.available.push(buffer);
            self.wake_one();
        } else {
            // More buffers exist than the pool may hold, e.g. after a clear(),
            // or one came from another pool
            METRICS.buffer_discarded();
        }
    }

    /// Remove every idle buffer, lowering the created count to match so the
    /// class can allocate afresh. Returns the number of buffers dropped.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while let Some(buffer) = self.available.pop() {
            self.available_count.fetch_sub(1, Ordering::AcqRel);
            drop(buffer);
            drained += 1;
        }

        if drained > 0 {
            let _ = self
                .created
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    Some(n.saturating_sub(drained))
                });
            // Room to create again, let blocked threads retry
            fence(Ordering::SeqCst);
            if self.waiters.load(Ordering::SeqCst) > 0 {
                let _guard = self.wait_lock.lock();
                self.returned.notify_all();
            }
        }
        drained
    }

    fn create_if_allowed(&self) -> Option<Buffer> {
        let max = self.class.max_pooled;
        let previous = self
            .created
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;

        // Other threads may have moved on already, so warn off our own count
        let count = previous + 1;
        let (threshold_reached, limit_reached) = self.warnings_due(count);
        if threshold_reached {
            warn!(
                capacity = self.class.capacity,
                max_pooled = max,
                threshold = count,
                percentage = self.warning_threshold_percentage,
                "Pooled buffer count reached the warning threshold"
            );
        }
        if limit_reached {
            warn!(
                capacity = self.class.capacity,
                max_pooled = max,
                "Hit the limit of pooled buffers for this size. Excess buffers will be \
                 allocated outside the pool and freed on release; consider raising the limit"
            );
        }

        METRICS.buffer_created();
        Some(Buffer::allocate_pooled(self.class.capacity))
    }

    /// (threshold, limit) warnings due once `count` buffers exist. Both fire
    /// when the threshold rounds up to the limit.
    fn warnings_due(&self, count: usize) -> (bool, bool) {
        (
            Some(count) == self.warning_threshold,
            count == self.class.max_pooled,
        )
    }

    fn wake_one(&self) {
        fence(Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) > 0 {
            let _guard = self.wait_lock.lock();
            self.returned.notify_one();
        }
    }

    pub fn capacity(&self) -> usize {
        self.class.capacity
    }

    pub fn max_pooled(&self) -> usize {
        self.class.max_pooled
    }

    /// Idle buffers currently held
    pub fn available(&self) -> usize {
        self.available_count.load(Ordering::Acquire)
    }

    /// Buffers created and still accounted to this class
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn warning_threshold(&self) -> Option<usize> {
        self.warning_threshold
    }

    /// Threads currently blocked waiting on this class
    #[cfg(test)]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Slab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slab")
            .field("capacity", &self.class.capacity)
            .field("max_pooled", &self.class.max_pooled)
            .field("available", &self.available())
            .field("created", &self.created())
            .finish()
    }
}
