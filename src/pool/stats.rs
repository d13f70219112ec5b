//! Pool statistics
//!
//! Point-in-time, read-only view of every size class. Taking a snapshot
//! only loads counters, so it never blocks acquirers or changes what the
//! pool does.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

/// Counters for one size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    pub capacity: usize,
    pub max_pooled: usize,
    /// Buffers idle in the pool
    pub available: usize,
    /// Buffers created for the class (idle or on loan)
    pub created: usize,
    /// Pooled buffers currently checked out
    pub on_loan: usize,
    /// Bytes held by all created buffers of the class
    pub pooled_bytes: usize,
}

impl ClassStats {
    pub(crate) fn new(
        capacity: usize,
        max_pooled: usize,
        available: usize,
        created: usize,
    ) -> Self {
        Self {
            capacity,
            max_pooled,
            available,
            created,
            // The two loads are not atomic together, so clamp
            on_loan: created.saturating_sub(available),
            pooled_bytes: created.saturating_mul(capacity),
        }
    }
}

/// Snapshot of every size class, keyed by capacity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub classes: BTreeMap<usize, ClassStats>,
}

impl PoolStats {
    /// Stats for the class with exactly this capacity
    pub fn get(&self, capacity: usize) -> Option<&ClassStats> {
        self.classes.get(&capacity)
    }

    /// Idle buffers across all classes
    pub fn total_available(&self) -> usize {
        self.classes.values().map(|c| c.available).sum()
    }

    /// Buffers created across all classes
    pub fn total_created(&self) -> usize {
        self.classes.values().map(|c| c.created).sum()
    }

    pub fn total_pooled_bytes(&self) -> usize {
        self.classes
            .values()
            .fold(0usize, |acc, c| acc.saturating_add(c.pooled_bytes))
    }
}

impl Index<usize> for PoolStats {
    type Output = ClassStats;

    /// # Panics
    /// Panics if no class has this capacity.
    fn index(&self, capacity: usize) -> &ClassStats {
        &self.classes[&capacity]
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pooled buffer count: {}, pooled bytes: {}, pools: {{",
            self.total_available(),
            self.total_pooled_bytes()
        )?;
        let mut first = true;
        for class in self.classes.values().filter(|c| c.available > 0) {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", class.capacity, class.available)?;
            first = false;
        }
        f.write_str("}")
    }
}
