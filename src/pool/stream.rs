//! Growable write stream over pooled buffers
//!
//! Appends into a leased buffer and, when a write does not fit, moves to
//! the next size class that holds everything written so far. The old
//! buffer goes straight back to its slab. Beyond the largest class the
//! capacity doubles and the pool hands out unpooled buffers.

use bytes::{Buf, BufMut};
use std::io;
use tracing::debug;

use super::buffer::Buffer;
use super::lease::Lease;
use super::manager::ByteBufferPool;
use super::size_class::Rounding;
use crate::error::PoolError;

/// Append-only writer that swaps to larger pooled buffers as it fills
pub struct GrowableLeaseStream {
    pool: ByteBufferPool,
    lease: Lease,
}

impl GrowableLeaseStream {
    /// Start with a buffer of at least `initial_min_capacity` bytes
    pub fn new(pool: &ByteBufferPool, initial_min_capacity: usize) -> Self {
        Self {
            pool: pool.clone(),
            lease: pool.acquire(initial_min_capacity),
        }
    }

    pub fn write_u8(&mut self, byte: u8) -> Result<(), PoolError> {
        self.reserve(1)?.put_u8(byte);
        Ok(())
    }

    pub fn write_bytes(&mut self, src: &[u8]) -> Result<(), PoolError> {
        self.reserve(src.len())?.put_slice(src);
        Ok(())
    }

    /// Drain `src` into the stream
    pub fn write_buf<B: Buf>(&mut self, src: B) -> Result<(), PoolError> {
        self.reserve(src.remaining())?.put(src);
        Ok(())
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.lease.buffer_ref().map(Buffer::position).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the current backing buffer
    pub fn capacity(&self) -> usize {
        self.lease.capacity().unwrap_or(0)
    }

    /// Everything written so far
    pub fn as_slice(&self) -> &[u8] {
        self.lease.buffer_ref().map(Buffer::written).unwrap_or(&[])
    }

    /// Hand over the lease with the buffer flipped: position 0, limit at the
    /// number of bytes written.
    pub fn finish(mut self) -> Result<Lease, PoolError> {
        self.lease.buffer()?.flip();
        Ok(self.lease)
    }

    /// Make room for `additional` more bytes, growing if needed
    fn reserve(&mut self, additional: usize) -> Result<&mut Buffer, PoolError> {
        let (written, capacity) = {
            let buffer = self.lease.buffer_ref()?;
            (buffer.position(), buffer.capacity())
        };
        let required = written
            .checked_add(additional)
            .ok_or(PoolError::CapacityOverflow {
                current: written,
                additional,
            })?;

        if required > capacity {
            self.grow(capacity, required)?;
        }
        self.lease.buffer()
    }

    fn grow(&mut self, capacity: usize, required: usize) -> Result<(), PoolError> {
        let target = self.next_capacity(capacity, required);
        let mut next = self.pool.acquire(target);
        next.buffer()?.try_put(self.lease.buffer_ref()?.written())?;

        let mut previous = std::mem::replace(&mut self.lease, next);
        previous.close()?;

        debug!(
            from = capacity,
            to = self.capacity(),
            written = required,
            "Grew stream buffer"
        );
        Ok(())
    }

    /// Smallest class at or above the current one that holds `required`,
    /// stepping one class at a time. Doubles past the largest class.
    fn next_capacity(&self, capacity: usize, required: usize) -> usize {
        let table = self.pool.size_classes();
        let mut class = match table.class_for(capacity) {
            Rounding::Class(class) => Some(class),
            Rounding::Unpooled => None,
        };
        while let Some(idx) = class {
            if table.capacity(idx) >= required {
                return table.capacity(idx);
            }
            class = table.next_larger(idx);
        }

        let mut next = capacity.max(table.largest_capacity().unwrap_or(1)).max(1);
        while next < required {
            next = next.checked_mul(2).unwrap_or(required);
        }
        next
    }
}

impl io::Write for GrowableLeaseStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for GrowableLeaseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrowableLeaseStream")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
