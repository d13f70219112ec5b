//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any thread.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Lease traffic
    pub acquires: AtomicU64,
    pub releases: AtomicU64,

    // Where buffers came from
    pub pooled_hits: AtomicU64,
    pub buffers_created: AtomicU64,
    pub larger_class_fallbacks: AtomicU64,
    pub unpooled_allocations: AtomicU64,

    // Blocking mode
    pub blocked_waits: AtomicU64,
    pub wait_timeouts: AtomicU64,

    // Buffers leaving the pool
    pub discarded_returns: AtomicU64,
    pub buffers_cleared: AtomicU64,

    // Misuse
    pub use_after_release_errors: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            pooled_hits: AtomicU64::new(0),
            buffers_created: AtomicU64::new(0),
            larger_class_fallbacks: AtomicU64::new(0),
            unpooled_allocations: AtomicU64::new(0),
            blocked_waits: AtomicU64::new(0),
            wait_timeouts: AtomicU64::new(0),
            discarded_returns: AtomicU64::new(0),
            buffers_cleared: AtomicU64::new(0),
            use_after_release_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn buffer_acquired(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn buffer_released(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    /// An idle buffer was reused
    #[inline]
    pub fn pooled_hit(&self) {
        self.pooled_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn buffer_created(&self) {
        self.buffers_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn larger_class_fallback(&self) {
        self.larger_class_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn unpooled_allocation(&self) {
        self.unpooled_allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn blocked_wait(&self) {
        self.blocked_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn wait_timeout(&self) {
        self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// A returned buffer was dropped instead of queued
    #[inline]
    pub fn buffer_discarded(&self) {
        self.discarded_returns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn buffers_cleared(&self, count: u64) {
        self.buffers_cleared.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn use_after_release(&self) {
        self.use_after_release_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            acquires: self.acquires.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            pooled_hits: self.pooled_hits.load(Ordering::Relaxed),
            buffers_created: self.buffers_created.load(Ordering::Relaxed),
            larger_class_fallbacks: self.larger_class_fallbacks.load(Ordering::Relaxed),
            unpooled_allocations: self.unpooled_allocations.load(Ordering::Relaxed),
            blocked_waits: self.blocked_waits.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
            discarded_returns: self.discarded_returns.load(Ordering::Relaxed),
            buffers_cleared: self.buffers_cleared.load(Ordering::Relaxed),
            use_after_release_errors: self.use_after_release_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub acquires: u64,
    pub releases: u64,
    pub pooled_hits: u64,
    pub buffers_created: u64,
    pub larger_class_fallbacks: u64,
    pub unpooled_allocations: u64,
    pub blocked_waits: u64,
    pub wait_timeouts: u64,
    pub discarded_returns: u64,
    pub buffers_cleared: u64,
    pub use_after_release_errors: u64,
}
