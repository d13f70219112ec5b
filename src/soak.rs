//! Concurrent soak driver
//!
//! Hammers a pool from many OS threads with scoped acquisitions of random
//! sizes. Used by the `bytebuf-soak` binary and by the concurrency tests.

use bytes::BufMut;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SoakConfig;
use crate::pool::ByteBufferPool;

/// Outcome of a soak run
#[derive(Debug, Clone, Serialize)]
pub struct SoakReport {
    pub threads: usize,
    /// Scoped acquisitions completed across all threads
    pub operations: u64,
    pub bytes_written: u64,
    /// Leases whose buffer was smaller than requested or did not read back
    /// what was written. Always 0 for a correct pool.
    pub faults: u64,
    pub elapsed: Duration,
    /// Whether `stop` cut the run short
    pub interrupted: bool,
}

impl SoakReport {
    pub fn ops_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.operations as f64 / secs
    }
}

/// Run the configured workload, returning once every thread is done or
/// `stop` is set.
pub fn run(pool: &ByteBufferPool, config: &SoakConfig, stop: &AtomicBool) -> SoakReport {
    let threads = config.effective_threads();
    let hold = Duration::from_micros(config.hold_micros);
    let operations = AtomicU64::new(0);
    let bytes_written = AtomicU64::new(0);
    let faults = AtomicU64::new(0);

    info!(
        threads,
        iterations = config.iterations,
        min_request = config.min_request,
        max_request = config.max_request,
        "Starting soak run"
    );
    let started = Instant::now();

    thread::scope(|scope| {
        for worker in 0..threads {
            let (operations, bytes_written, faults) = (&operations, &bytes_written, &faults);
            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                let mut done = 0u64;
                while done < config.iterations && !stop.load(Ordering::Relaxed) {
                    let request = rng.gen_range(config.min_request..=config.max_request);
                    let fill = rng.gen::<u8>();
                    let ok = pool.with_buffer(request, |buffer| {
                        if buffer.capacity() < request {
                            return false;
                        }
                        buffer.put_bytes(fill, request);
                        if !hold.is_zero() {
                            thread::sleep(hold);
                        }
                        buffer.written().iter().all(|b| *b == fill)
                    });
                    if !ok {
                        faults.fetch_add(1, Ordering::Relaxed);
                    }
                    bytes_written.fetch_add(request as u64, Ordering::Relaxed);
                    done += 1;
                }
                operations.fetch_add(done, Ordering::Relaxed);
                debug!(worker, done, "Soak worker finished");
            });
        }
    });

    let report = SoakReport {
        threads,
        operations: operations.into_inner(),
        bytes_written: bytes_written.into_inner(),
        faults: faults.into_inner(),
        elapsed: started.elapsed(),
        interrupted: stop.load(Ordering::Relaxed),
    };
    info!(
        operations = report.operations,
        faults = report.faults,
        elapsed_ms = report.elapsed.as_millis() as u64,
        ops_per_sec = report.ops_per_sec() as u64,
        "Soak run finished"
    );
    report
}
