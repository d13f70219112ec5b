//! Growable stream integration tests

use bytebuf_pool::{ByteBufferPool, GrowableLeaseStream, PoolConfig, PoolError};
use bytes::{Buf, BufMut, Bytes};
use std::io::Write;

fn pool() -> ByteBufferPool {
    ByteBufferPool::new(
        PoolConfig::new()
            .with_class(10, 10)
            .with_class(100, 10)
            .with_class(1000, 10)
            .with_class(10_000, 10),
    )
    .unwrap()
}

/// Writes 6, 6, 80 and 80 bytes and records the backing capacity after each
fn growth_sequence(mut write: impl FnMut(&mut GrowableLeaseStream, &[u8])) -> Vec<usize> {
    let pool = pool();
    let mut stream = GrowableLeaseStream::new(&pool, 10);
    let data: Vec<u8> = (0..=255u8).collect();

    let mut capacities = Vec::new();
    let mut offset = 0;
    for len in [6, 6, 80, 80] {
        write(&mut stream, &data[offset..offset + len]);
        offset += len;
        capacities.push(stream.capacity());
    }
    assert_eq!(stream.as_slice(), &data[..offset]);
    capacities
}

const EXPECTED: [usize; 4] = [10, 100, 100, 1000];

#[test]
fn test_growth_single_bytes() {
    let capacities = growth_sequence(|stream, chunk| {
        for byte in chunk {
            stream.write_u8(*byte).unwrap();
        }
    });
    assert_eq!(capacities, EXPECTED);
}

#[test]
fn test_growth_byte_arrays() {
    let capacities = growth_sequence(|stream, chunk| stream.write_bytes(&chunk.to_vec()).unwrap());
    assert_eq!(capacities, EXPECTED);
}

#[test]
fn test_growth_sliced_arrays() {
    let capacities = growth_sequence(|stream, chunk| {
        // Chunk embedded in a larger array, written through a sub-slice
        let mut padded = vec![0xFF; chunk.len() + 8];
        padded[4..4 + chunk.len()].copy_from_slice(chunk);
        stream.write_bytes(&padded[4..4 + chunk.len()]).unwrap();
    });
    assert_eq!(capacities, EXPECTED);
}

#[test]
fn test_growth_prebuilt_buffers() {
    let capacities = growth_sequence(|stream, chunk| {
        stream.write_buf(Bytes::copy_from_slice(chunk)).unwrap();
    });
    assert_eq!(capacities, EXPECTED);
}

#[test]
fn test_growth_pooled_buffer_source() {
    let source_pool = pool();
    let capacities = growth_sequence(|stream, chunk| {
        let mut lease = source_pool.acquire(chunk.len());
        let buffer = lease.buffer().unwrap();
        buffer.put_slice(chunk);
        buffer.flip();
        stream.write_buf(&mut *buffer).unwrap();
        assert!(!buffer.has_remaining());
    });
    assert_eq!(capacities, EXPECTED);
}

#[test]
fn test_growth_through_io_write() {
    let capacities = growth_sequence(|stream, chunk| stream.write_all(chunk).unwrap());
    assert_eq!(capacities, EXPECTED);
}

#[test]
fn test_superseded_buffers_return_to_pool() {
    let pool = pool();
    let mut stream = GrowableLeaseStream::new(&pool, 10);
    stream.write_bytes(&[1; 172]).unwrap();
    assert_eq!(stream.capacity(), 1000);

    // Stepped past the 100 class without leasing from it
    let stats = pool.snapshot();
    assert_eq!(stats[10].available, 1);
    assert_eq!(stats[100].created, 0);

    let lease = stream.finish().unwrap();
    drop(lease);
    assert_eq!(pool.snapshot()[1000].available, 1);
}

#[test]
fn test_finish_exposes_written_region_only() {
    let pool = pool();
    let mut stream = GrowableLeaseStream::new(&pool, 10);
    stream.write_bytes(b"0123456789abc").unwrap();

    let mut lease = stream.finish().unwrap();
    let buffer = lease.buffer().unwrap();
    assert_eq!(buffer.capacity(), 100);
    assert_eq!(buffer.remaining(), 13);
    assert_eq!(buffer.chunk(), b"0123456789abc");
}

#[test]
fn test_growth_past_largest_class() {
    let pool = pool();
    let mut stream = GrowableLeaseStream::new(&pool, 10_000);
    stream.write_bytes(&vec![7; 10_001]).unwrap();
    assert_eq!(stream.capacity(), 20_000);
    assert_eq!(stream.len(), 10_001);
}

#[test]
fn test_length_overflow_fails_loudly() {
    struct Endless;

    impl Buf for Endless {
        fn remaining(&self) -> usize {
            usize::MAX
        }
        fn chunk(&self) -> &[u8] {
            &[0]
        }
        fn advance(&mut self, _cnt: usize) {}
    }

    let pool = pool();
    let mut stream = GrowableLeaseStream::new(&pool, 10);
    stream.write_u8(1).unwrap();

    let err = stream.write_buf(Endless).unwrap_err();
    assert!(matches!(err, PoolError::CapacityOverflow { current: 1, .. }));
    assert_eq!(stream.as_slice(), &[1]);
}
