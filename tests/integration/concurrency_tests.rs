//! Concurrency and blocking-mode integration tests

use bytebuf_pool::{ByteBufferPool, PoolConfig, PoolError};
use bytes::BufMut;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const THREADS: usize = 50;

/// Every thread holds its lease until all have acquired, so each needs its
/// own buffer and all of them must come back.
#[test]
fn test_concurrent_acquire_release_conserves_buffers() {
    let pool = ByteBufferPool::new(PoolConfig::new().with_class(100, usize::MAX)).unwrap();

    for round in 1..=5 {
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let pool = pool.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let mut lease = pool.acquire(100);
                    lease.buffer().unwrap().put_u64(i as u64);
                    barrier.wait();
                    lease.close().unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.current_pool_size(), THREADS, "round {}", round);
        assert_eq!(pool.snapshot()[100].created, THREADS);
    }
}

#[test]
fn test_concurrent_mixed_sizes_respect_limits() {
    let pool = ByteBufferPool::new(
        PoolConfig::new()
            .with_class(64, 8)
            .with_class(1024, 4)
            .with_class(16 * 1024, 2),
    )
    .unwrap();

    thread::scope(|scope| {
        for t in 0..16 {
            let pool = &pool;
            scope.spawn(move || {
                for i in 0..1000usize {
                    let request = 1 + (t * 7919 + i * 104_729) % 20_000;
                    let capacity = pool.with_buffer(request, |buffer| {
                        buffer.put_bytes(0xAB, request);
                        buffer.capacity()
                    });
                    assert!(capacity >= request);
                }
            });
        }
    });

    for class in pool.snapshot().classes.values() {
        assert!(class.created <= class.max_pooled);
        assert_eq!(class.available, class.created);
    }
}

#[test]
fn test_blocking_mode_parks_excess_acquirers() {
    let pool =
        ByteBufferPool::new(PoolConfig::new().with_class(100, 10).with_blocking(true)).unwrap();
    let acquired = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = mpsc::channel();

    for _ in 0..15 {
        let pool = pool.clone();
        let acquired = acquired.clone();
        let release = release.clone();
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            let lease = pool.acquire(100);
            let capacity = lease.capacity().unwrap();
            acquired.fetch_add(1, Ordering::SeqCst);
            while !release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            drop(lease);
            done_tx.send(capacity).unwrap();
        });
    }
    drop(done_tx);

    let deadline = Instant::now() + Duration::from_secs(5);
    while acquired.load(Ordering::SeqCst) < 10 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    // Give the other five every chance to (wrongly) get through
    thread::sleep(Duration::from_millis(200));
    assert_eq!(acquired.load(Ordering::SeqCst), 10);
    assert_eq!(pool.current_pool_size(), 0);

    release.store(true, Ordering::SeqCst);
    for _ in 0..15 {
        let capacity = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("blocked acquirer was never woken");
        assert_eq!(capacity, 100);
    }

    let stats = pool.snapshot();
    assert_eq!(stats[100].created, 10);
    assert_eq!(stats[100].available, 10);
}

#[test]
fn test_blocking_acquire_timeout_then_success() {
    let pool =
        ByteBufferPool::new(PoolConfig::new().with_class(100, 1).with_blocking(true)).unwrap();
    let held = pool.acquire(100);

    let started = Instant::now();
    let err = pool
        .acquire_timeout(100, Duration::from_millis(50))
        .unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(err, PoolError::AcquireTimeout { capacity: 100, .. }));

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire_timeout(100, Duration::from_secs(5)))
    };
    thread::sleep(Duration::from_millis(20));
    drop(held);

    let lease = waiter.join().unwrap().unwrap();
    assert_eq!(lease.capacity().unwrap(), 100);
    assert!(lease.is_pooled());
}


/// A timeout too large for a deadline waits like a plain `acquire`
#[test]
fn test_blocking_acquire_unbounded_timeout() {
    let pool =
        ByteBufferPool::new(PoolConfig::new().with_class(100, 1).with_blocking(true)).unwrap();
    let held = pool.acquire(100);

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire_timeout(100, Duration::MAX))
    };
    thread::sleep(Duration::from_millis(20));
    drop(held);

    let lease = waiter.join().unwrap().unwrap();
    assert_eq!(lease.capacity().unwrap(), 100);
    assert!(lease.is_pooled());
    assert_eq!(pool.snapshot()[100].created, 1);
}
