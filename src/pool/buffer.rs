//! Fixed-capacity byte buffer
//!
//! A heap block that never grows, with a position/limit cursor so callers
//! can fill it, flip it and read it back. Writing goes through
//! [`bytes::BufMut`], reading through [`bytes::Buf`].

use bytes::buf::UninitSlice;
use bytes::{Buf, BufMut};
use std::fmt;

use crate::error::PoolError;

/// A fixed-length block of memory owned by exactly one slab or one lease.
///
/// `0 <= position <= limit <= capacity` always holds.
pub struct Buffer {
    data: Box<[u8]>,
    position: usize,
    limit: usize,
    /// Created by a slab; only these may ever be queued in one
    pooled: bool,
}

impl Buffer {
    /// Allocate a zeroed buffer with the cursor at the start and the full
    /// capacity visible. The buffer is not pooled and no slab will accept it.
    pub fn allocate(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            limit: capacity,
            pooled: false,
        }
    }

    pub(crate) fn allocate_pooled(capacity: usize) -> Self {
        Self {
            pooled: true,
            ..Self::allocate(capacity)
        }
    }

    /// Whether the buffer was created by a slab
    #[inline]
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// Get the buffer's capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Move the cursor. Fails if `position` is beyond the limit.
    pub fn set_position(&mut self, position: usize) -> Result<(), PoolError> {
        if position > self.limit {
            return Err(PoolError::BufferOverflow {
                requested: position,
                remaining: self.limit,
            });
        }
        self.position = position;
        Ok(())
    }

    /// Cursor to the start, full capacity visible. Contents are left as is.
    #[inline]
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.data.len();
    }

    /// Make the bytes written so far readable: limit = position, position = 0.
    #[inline]
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// The window between position and limit
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// The bytes before the cursor, i.e. what has been written since the last clear
    #[inline]
    pub fn written(&self) -> &[u8] {
        &self.data[..self.position]
    }

    /// Whole backing storage, ignoring the cursor
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whole backing storage, ignoring the cursor
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy `src` in at the cursor, failing instead of panicking when it
    /// does not fit.
    pub fn try_put(&mut self, src: &[u8]) -> Result<(), PoolError> {
        let remaining = self.limit - self.position;
        if src.len() > remaining {
            return Err(PoolError::BufferOverflow {
                requested: src.len(),
                remaining,
            });
        }
        let end = self.position + src.len();
        self.data[self.position..end].copy_from_slice(src);
        self.position = end;
        Ok(())
    }

    /// Address of the backing storage. Stable for the buffer's lifetime,
    /// so it identifies the block across lease cycles.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

impl Buf for Buffer {
    fn remaining(&self) -> usize {
        self.limit - self.position
    }

    fn chunk(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    fn advance(&mut self, cnt: usize) {
        let remaining = self.limit - self.position;
        assert!(
            cnt <= remaining,
            "cannot advance past limit: {} > {}",
            cnt,
            remaining
        );
        self.position += cnt;
    }
}

// SAFETY: the storage is always initialised (allocated zeroed), `chunk_mut`
// only exposes position..limit, and `advance_mut` never moves past limit.
unsafe impl BufMut for Buffer {
    fn remaining_mut(&self) -> usize {
        self.limit - self.position
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        let remaining = self.limit - self.position;
        assert!(
            cnt <= remaining,
            "cannot advance past limit: {} > {}",
            cnt,
            remaining
        );
        self.position += cnt;
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        let (position, limit) = (self.position, self.limit);
        UninitSlice::new(&mut self.data[position..limit])
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity())
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("pooled", &self.pooled)
            .finish()
    }
}
