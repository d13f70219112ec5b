//! bytebuf-soak - Entry Point
//!
//! Loads a pool configuration, then drives the pool from many threads and
//! reports how it held up.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use bytebuf_pool::{soak, ByteBufferPool, Config, VERSION};

/// Application entry point
#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    // Load configuration
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Initialize tracing/logging
    bytebuf_pool::util::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        config_path = ?config_path,
        "Starting bytebuf soak"
    );

    let pool = ByteBufferPool::new(config.pool.clone()).context("Failed to build buffer pool")?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        bytebuf_pool::metrics::init_metrics(&config.metrics, pool.clone())?;
        info!(
            bind_addr = %config.metrics.bind_addr,
            "Metrics endpoint started"
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut run = {
        let pool = pool.clone();
        let stop = stop.clone();
        let soak_config = config.soak.clone();
        tokio::task::spawn_blocking(move || soak::run(&pool, &soak_config, &stop))
    };

    // Run soak with graceful shutdown
    let finished = tokio::select! {
        result = &mut run => Some(result),
        _ = shutdown_signal() => None,
    };
    let report = match finished {
        Some(result) => result,
        None => {
            info!("Shutdown signal received, stopping workers...");
            stop.store(true, Ordering::Relaxed);
            run.await
        }
    }
    .context("Soak task panicked")?;

    let stats = pool.snapshot();
    info!(%stats, "Final pool state");
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if report.faults > 0 {
        error!(faults = report.faults, "Soak run saw undersized or corrupted buffers");
        anyhow::bail!("soak run failed with {} faults", report.faults);
    }

    info!("Soak stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
