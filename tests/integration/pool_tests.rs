//! Pool behaviour integration tests

use bytebuf_pool::{Buffer, ByteBufferPool, Config, PoolConfig, PoolError};
use bytes::{Buf, BufMut};
use proptest::prelude::*;
use std::panic::{self, AssertUnwindSafe};

fn pool(classes: &[(usize, usize)]) -> ByteBufferPool {
    let config = classes
        .iter()
        .fold(PoolConfig::new(), |config, &(capacity, max)| config.with_class(capacity, max));
    ByteBufferPool::new(config).unwrap()
}

fn decimal_pool() -> ByteBufferPool {
    pool(&[(10, 20), (100, 10), (1000, 5), (10_000, 2)])
}

#[test]
fn test_exact_class_request_gets_exact_capacity() {
    let pool = decimal_pool();
    for capacity in [10, 100, 1000, 10_000] {
        assert_eq!(pool.acquire(capacity).capacity().unwrap(), capacity);
    }
}

#[test]
fn test_identity_reuse() {
    let pool = pool(&[(10, 10)]);

    let mut first = pool.acquire(10);
    let addr = first.buffer().unwrap().as_ptr();
    first.close().unwrap();

    let mut second = pool.acquire(10);
    assert_eq!(second.buffer().unwrap().as_ptr(), addr);
}

#[test]
fn test_exhaustion_saturates_at_max_pooled() {
    let pool = pool(&[(100, 10)]);

    let leases: Vec<_> = (0..15).map(|_| pool.acquire(100)).collect();
    for lease in &leases {
        assert_eq!(lease.capacity().unwrap(), 100);
    }
    assert_eq!(leases.iter().filter(|l| l.is_pooled()).count(), 10);

    drop(leases);
    let stats = pool.snapshot();
    assert_eq!(stats[100].available, 10);
    assert_eq!(stats[100].created, 10);
}

#[test]
fn test_pool_size_counts_available_only() {
    let pool = pool(&[(100, usize::MAX)]);
    assert_eq!(pool.current_pool_size(), 0);

    pool.with_buffer(100, |buffer| {
        buffer.put_u32(7);
        assert_eq!(pool.current_pool_size(), 0);
    });
    assert_eq!(pool.current_pool_size(), 1);
}

#[test]
fn test_with_buffer_releases_on_panic() {
    let pool = pool(&[(100, 4)]);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pool.with_buffer(50, |_| panic!("caller failed"));
    }));
    assert!(result.is_err());
    assert_eq!(pool.current_pool_size(), 1);
}

#[test]
fn test_use_after_release_is_an_error() {
    let pool = decimal_pool();
    let mut lease = pool.acquire(10);
    lease.close().unwrap();

    assert!(matches!(lease.buffer(), Err(PoolError::UseAfterRelease)));
    assert!(matches!(lease.close(), Err(PoolError::UseAfterRelease)));
    assert_eq!(pool.current_pool_size(), 1);
}

#[test]
fn test_acquire_pair() {
    let pool = decimal_pool();
    let (mut key, value) = pool.acquire_pair(8, 500);
    assert_eq!(key.capacity().unwrap(), 10);
    assert_eq!(value.capacity().unwrap(), 1000);

    key.buffer().unwrap().put_slice(b"key");
    drop((key, value));
    assert_eq!(pool.current_pool_size(), 2);

    let total = pool.with_buffer_pair(4, 40, |key, value| {
        key.put_u16(1);
        value.put_u64(2);
        key.position() + value.position()
    });
    assert_eq!(total, 10);
    // 10 reused, 100 created fresh, 1000 still idle
    assert_eq!(pool.current_pool_size(), 3);
}

#[test]
fn test_empty_config_never_pools() {
    let pool = ByteBufferPool::new(PoolConfig::new()).unwrap();
    let lease = pool.acquire(123);
    assert_eq!(lease.capacity().unwrap(), 123);
    assert!(!lease.is_pooled());
    drop(lease);
    assert_eq!(pool.current_pool_size(), 0);
    assert!(pool.snapshot().classes.is_empty());

    let pool = ByteBufferPool::unpooled();
    assert_eq!(pool.acquire(7).capacity().unwrap(), 7);
}

#[test]
fn test_oversized_request_is_unpooled_in_both_modes() {
    for blocking in [false, true] {
        let config = PoolConfig::new().with_class(10, 1).with_blocking(blocking);
        let pool = ByteBufferPool::new(config).unwrap();
        let lease = pool.acquire(11);
        assert_eq!(lease.capacity().unwrap(), 11);
        assert!(!lease.is_pooled());
    }
}

#[test]
fn test_clear_then_repopulate() {
    let pool = decimal_pool();
    let in_flight = pool.acquire(100);
    for capacity in [10, 100, 1000] {
        pool.acquire(capacity).close().unwrap();
    }
    assert_eq!(pool.current_pool_size(), 3);

    pool.clear();
    assert_eq!(pool.current_pool_size(), 0);

    drop(in_flight);
    assert_eq!(pool.current_pool_size(), 1);
    assert_eq!(pool.snapshot()[100].available, 1);
}

#[test]
fn test_snapshot_reports_every_class() {
    let pool = pool(&[(1, 10), (10, 10), (100, 0)]);
    let _a = pool.acquire(1);
    pool.acquire(10).close().unwrap();
    pool.acquire(10).close().unwrap();

    let stats = pool.snapshot();
    assert_eq!(stats.classes.len(), 3);
    assert_eq!(stats[1].available, 0);
    assert_eq!(stats[1].on_loan, 1);
    assert_eq!(stats[10].available, 1);
    assert_eq!(stats[10].created, 1);
    assert_eq!(stats[100].max_pooled, 0);
    assert_eq!(stats.total_available(), 1);
    assert_eq!(stats.total_pooled_bytes(), 11);
}

#[test]
fn test_detached_buffer_comes_back() {
    let pool = decimal_pool();
    let mut lease = pool.acquire(100);
    lease.buffer().unwrap().put_slice(b"abc");
    let mut buffer = lease.into_buffer().unwrap();
    buffer.flip();
    assert_eq!(buffer.chunk(), b"abc");

    pool.release_buffer(buffer);
    let mut again = pool.acquire(100);
    assert_eq!(again.buffer().unwrap().position(), 0);
    assert_eq!(pool.snapshot()[100].created, 1);
}

#[test]
fn test_foreign_buffer_is_not_pooled() {
    let pool = pool(&[(10, 2)]);
    let held = pool.acquire(10);

    pool.release_buffer(Buffer::allocate(10));
    pool.release_buffer(Buffer::allocate(10));

    let stats = pool.snapshot();
    assert_eq!(stats[10].available, 0);
    assert_eq!(stats[10].created, 1);
    assert_eq!(stats[10].on_loan, 1);

    drop(held);
    let stats = pool.snapshot();
    assert_eq!(stats[10].available, 1);
    assert!(stats[10].available <= stats[10].created);
}

#[test]
fn test_detached_fallback_buffer_is_not_pooled() {
    let pool = pool(&[(10, 1)]);
    let held = pool.acquire(10);
    let fallback = pool.acquire(10);
    assert!(!fallback.is_pooled());
    assert_eq!(fallback.capacity().unwrap(), 10);

    pool.release_buffer(fallback.into_buffer().unwrap());
    assert_eq!(pool.current_pool_size(), 0);

    drop(held);
    assert_eq!(pool.current_pool_size(), 1);
    assert_eq!(pool.snapshot()[10].created, 1);
}

#[test]
fn test_pool_from_config_file_text() {
    let config = Config::parse(
        r#"
        [pool.pooled_byte_buffer_counts]
        "10" = 2
        "100" = 1
        "#,
    )
    .unwrap();
    let pool = ByteBufferPool::new(config.pool).unwrap();
    assert_eq!(pool.size_classes().len(), 2);
    assert!(!pool.is_blocking());
    assert_eq!(pool.acquire(50).capacity().unwrap(), 100);
}

proptest! {
    #[test]
    fn prop_capacity_at_least_requested(min in 1usize..50_000) {
        let pool = decimal_pool();
        let lease = pool.acquire(min);
        prop_assert!(lease.capacity().unwrap() >= min);
    }
}
