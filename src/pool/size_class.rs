//! Size class table
//!
//! Maps a requested minimum capacity to the smallest configured buffer
//! capacity that can hold it. Lookups are a binary search over a sorted
//! array, so they stay O(log n) with no floating point on the hot path.

use std::fmt;

use crate::error::ConfigError;

/// A configured capacity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass {
    /// Exact capacity of every buffer in this class
    pub capacity: usize,
    /// Maximum number of buffers the pool keeps for this class (0 = never pooled)
    pub max_pooled: usize,
}

impl SizeClass {
    pub fn new(capacity: usize, max_pooled: usize) -> Self {
        Self {
            capacity,
            max_pooled,
        }
    }

    /// Whether buffers of this class are ever retained by the pool
    pub fn is_pooled(&self) -> bool {
        self.max_pooled > 0
    }
}

/// Position of a class within the table. Ordered the same way as capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassIndex(usize);

impl ClassIndex {
    /// Get the raw index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ClassIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of rounding a request to a size class.
///
/// `Class` sorts before `Unpooled`, so rounding is monotonic over the whole
/// request range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rounding {
    Class(ClassIndex),
    /// Larger than every configured class
    Unpooled,
}

/// Ordered table of configured size classes
#[derive(Debug, Clone, Default)]
pub struct SizeClassTable {
    classes: Box<[SizeClass]>,
    /// Capacities alone, kept contiguous for the binary search
    capacities: Box<[usize]>,
}

impl SizeClassTable {
    /// Build a table from classes in declaration order.
    ///
    /// Capacities must be non-zero and strictly increasing.
    pub fn new(classes: Vec<SizeClass>) -> Result<Self, ConfigError> {
        let mut previous: Option<usize> = None;
        for class in &classes {
            if class.capacity == 0 {
                return Err(ConfigError::ZeroCapacity);
            }
            if let Some(previous) = previous {
                if class.capacity <= previous {
                    return Err(ConfigError::NonIncreasingCapacity {
                        previous,
                        capacity: class.capacity,
                    });
                }
            }
            previous = Some(class.capacity);
        }

        let capacities = classes.iter().map(|c| c.capacity).collect();
        Ok(Self {
            classes: classes.into_boxed_slice(),
            capacities,
        })
    }

    /// Smallest class with capacity >= `min_capacity`.
    ///
    /// A request of 0 maps to the smallest class.
    #[inline]
    pub fn class_for(&self, min_capacity: usize) -> Rounding {
        let idx = self.capacities.partition_point(|&cap| cap < min_capacity);
        if idx < self.capacities.len() {
            Rounding::Class(ClassIndex(idx))
        } else {
            Rounding::Unpooled
        }
    }

    /// The next class above `class`, if any
    #[inline]
    pub fn next_larger(&self, class: ClassIndex) -> Option<ClassIndex> {
        let next = class.0 + 1;
        (next < self.classes.len()).then_some(ClassIndex(next))
    }

    /// Look up a class by index.
    ///
    /// # Panics
    /// Panics if `class` did not come from this table.
    pub fn get(&self, class: ClassIndex) -> &SizeClass {
        &self.classes[class.0]
    }

    pub fn capacity(&self, class: ClassIndex) -> usize {
        self.capacities[class.0]
    }

    pub fn largest_capacity(&self) -> Option<usize> {
        self.capacities.last().copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterate over classes in increasing capacity order
    pub fn iter(&self) -> impl Iterator<Item = (ClassIndex, &SizeClass)> + '_ {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, class)| (ClassIndex(i), class))
    }
}
