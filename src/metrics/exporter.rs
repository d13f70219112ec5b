//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

use super::counters::{MetricsSnapshot, METRICS};
use crate::config::MetricsConfig;
use crate::pool::ByteBufferPool;

/// Initialize the Prometheus metrics exporter.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &MetricsConfig, pool: ByteBufferPool) -> Result<()> {
    // Register metric descriptions
    describe_counter!("bytebuf_acquires_total", "Buffers leased");
    describe_counter!("bytebuf_releases_total", "Buffers returned by closing leases");
    describe_counter!("bytebuf_pooled_hits_total", "Leases served by an idle pooled buffer");
    describe_counter!("bytebuf_buffers_created_total", "Pooled buffers allocated");
    describe_counter!(
        "bytebuf_larger_class_fallbacks_total",
        "Leases served from a larger class because the matching class was exhausted"
    );
    describe_counter!("bytebuf_unpooled_allocations_total", "Buffers allocated outside the pool");
    describe_counter!("bytebuf_blocked_waits_total", "Acquires that had to wait for a release");
    describe_counter!("bytebuf_wait_timeouts_total", "Blocking acquires that timed out");
    describe_counter!(
        "bytebuf_discarded_returns_total",
        "Returned buffers dropped instead of pooled"
    );
    describe_counter!("bytebuf_buffers_cleared_total", "Idle buffers evicted by clear()");
    describe_counter!("bytebuf_use_after_release_total", "Operations on already closed leases");
    describe_gauge!("bytebuf_class_available", "Idle buffers per size class");
    describe_gauge!("bytebuf_class_created", "Created buffers per size class");
    describe_gauge!("bytebuf_class_on_loan", "Pooled buffers on loan per size class");

    // Build and install the Prometheus exporter
    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()?;

    // Start background task to sync atomic counters to metrics crate
    let interval = Duration::from_secs(config.sync_interval_secs);
    tokio::spawn(sync_metrics_task(pool, interval));

    Ok(())
}

/// Background task that periodically syncs our atomic counters and the
/// pool's per-class state to the metrics crate
async fn sync_metrics_task(pool: ByteBufferPool, period: Duration) {
    let mut interval = tokio::time::interval(period);

    let mut last_snapshot = METRICS.snapshot();

    loop {
        interval.tick().await;

        let snapshot = METRICS.snapshot();
        push_counter_deltas(&snapshot, &last_snapshot);

        for class in pool.snapshot().classes.values() {
            let capacity = class.capacity.to_string();
            gauge!("bytebuf_class_available", "capacity" => capacity.clone())
                .set(class.available as f64);
            gauge!("bytebuf_class_created", "capacity" => capacity.clone())
                .set(class.created as f64);
            gauge!("bytebuf_class_on_loan", "capacity" => capacity).set(class.on_loan as f64);
        }

        last_snapshot = snapshot;
    }
}

fn push_counter_deltas(now: &MetricsSnapshot, last: &MetricsSnapshot) {
    let deltas = [
        ("bytebuf_acquires_total", now.acquires, last.acquires),
        ("bytebuf_releases_total", now.releases, last.releases),
        ("bytebuf_pooled_hits_total", now.pooled_hits, last.pooled_hits),
        ("bytebuf_buffers_created_total", now.buffers_created, last.buffers_created),
        (
            "bytebuf_larger_class_fallbacks_total",
            now.larger_class_fallbacks,
            last.larger_class_fallbacks,
        ),
        (
            "bytebuf_unpooled_allocations_total",
            now.unpooled_allocations,
            last.unpooled_allocations,
        ),
        ("bytebuf_blocked_waits_total", now.blocked_waits, last.blocked_waits),
        ("bytebuf_wait_timeouts_total", now.wait_timeouts, last.wait_timeouts),
        ("bytebuf_discarded_returns_total", now.discarded_returns, last.discarded_returns),
        ("bytebuf_buffers_cleared_total", now.buffers_cleared, last.buffers_cleared),
        (
            "bytebuf_use_after_release_total",
            now.use_after_release_errors,
            last.use_after_release_errors,
        ),
    ];

    for (name, now, last) in deltas {
        let delta = now.saturating_sub(last);
        if delta > 0 {
            counter!(name).increment(delta);
        }
    }
}
