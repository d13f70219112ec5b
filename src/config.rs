//! Configuration management
//!
//! Handles loading and validating pool and soak configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::ConfigError;
use crate::pool::SizeClass;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub soak: SoakConfig,
}

/// Buffer pool configuration
///
/// An empty class list means nothing is pooled: every request gets an
/// exact-size buffer that is dropped on release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPoolConfig")]
pub struct PoolConfig {
    /// Size classes in increasing capacity order
    pub size_classes: Vec<SizeClass>,
    /// Park callers on an exhausted class instead of falling back
    pub block_on_exhausted: bool,
    /// Percentage of `max_pooled` at which a class logs a warning
    pub warning_threshold_percentage: u8,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size_classes: Vec::new(),
            block_on_exhausted: false,
            warning_threshold_percentage: default_warning_threshold(),
        }
    }
}

impl PoolConfig {
    /// Empty configuration (no pooling, non-blocking)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a `capacity -> max_pooled` mapping in any order.
    ///
    /// Negative counts and repeated capacities are rejected.
    pub fn from_counts<I>(counts: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (usize, i64)>,
    {
        let mut entries: Vec<(usize, i64)> = counts.into_iter().collect();
        entries.sort_by_key(|(capacity, _)| *capacity);

        let mut size_classes = Vec::with_capacity(entries.len());
        let mut previous: Option<usize> = None;
        for (capacity, max_pooled) in entries {
            if capacity == 0 {
                return Err(ConfigError::ZeroCapacity);
            }
            if previous == Some(capacity) {
                return Err(ConfigError::NonIncreasingCapacity {
                    previous: capacity,
                    capacity,
                });
            }
            let max_pooled = usize::try_from(max_pooled)
                .map_err(|_| ConfigError::NegativeMaxPooled {
                    capacity,
                    max_pooled,
                })?;
            size_classes.push(SizeClass::new(capacity, max_pooled));
            previous = Some(capacity);
        }

        Ok(Self {
            size_classes,
            ..Self::default()
        })
    }

    /// Append a size class. Classes must be added in increasing capacity
    /// order; this is checked when the pool is built.
    pub fn with_class(mut self, capacity: usize, max_pooled: usize) -> Self {
        self.size_classes.push(SizeClass::new(capacity, max_pooled));
        self
    }

    pub fn with_blocking(mut self, block_on_exhausted: bool) -> Self {
        self.block_on_exhausted = block_on_exhausted;
        self
    }

    pub fn with_warning_threshold(mut self, percentage: u8) -> Self {
        self.warning_threshold_percentage = percentage;
        self
    }

    /// Check values that the size class table does not cover
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.warning_threshold_percentage) {
            return Err(ConfigError::InvalidWarningThreshold(
                self.warning_threshold_percentage,
            ));
        }
        Ok(())
    }
}

/// `[pool]` as written in TOML. Capacity keys are strings there.
#[derive(Debug, Deserialize)]
struct RawPoolConfig {
    #[serde(default)]
    pooled_byte_buffer_counts: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    block_on_exhausted: bool,
    #[serde(default = "default_warning_threshold")]
    warning_threshold_percentage: u8,
}

impl TryFrom<RawPoolConfig> for PoolConfig {
    type Error = ConfigError;

    fn try_from(raw: RawPoolConfig) -> Result<Self, Self::Error> {
        let counts = raw
            .pooled_byte_buffer_counts
            .unwrap_or_default()
            .into_iter()
            .map(|(key, count)| {
                key.trim()
                    .parse::<usize>()
                    .map(|capacity| (capacity, count))
                    .map_err(|_| ConfigError::InvalidCapacityKey(key))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let config = PoolConfig::from_counts(counts)?
            .with_blocking(raw.block_on_exhausted)
            .with_warning_threshold(raw.warning_threshold_percentage);
        config.validate()?;
        Ok(config)
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
    /// Seconds between pushes of pool counters to the exporter
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Soak run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SoakConfig {
    /// Number of worker threads (0 = auto)
    #[serde(default)]
    pub threads: usize,
    /// Scoped acquisitions per thread
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Smallest requested capacity
    #[serde(default = "default_min_request")]
    pub min_request: usize,
    /// Largest requested capacity
    #[serde(default = "default_max_request")]
    pub max_request: usize,
    /// How long each lease is held, in microseconds
    #[serde(default)]
    pub hold_micros: u64,
}

impl SoakConfig {
    /// Get effective thread count (auto-detect if 0)
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            iterations: default_iterations(),
            min_request: default_min_request(),
            max_request: default_max_request(),
            hold_micros: 0,
        }
    }
}

// Default value functions
fn default_warning_threshold() -> u8 { 90 }
fn default_metrics_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 9090)) }
fn default_sync_interval() -> u64 { 1 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_iterations() -> u64 { 10_000 }
fn default_min_request() -> usize { 1 }
fn default_max_request() -> usize { 1500 }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.soak.min_request > self.soak.max_request {
            anyhow::bail!("soak.min_request must be <= soak.max_request");
        }
        if self.metrics.sync_interval_secs == 0 {
            anyhow::bail!("metrics.sync_interval_secs must be > 0");
        }
        Ok(())
    }
}
