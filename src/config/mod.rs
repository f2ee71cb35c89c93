//! Configuration management for the scrape engine
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every section has defaults, so a file only needs
//! the keys it wants to change.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::retry::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker pool and per-user pipeline settings
    pub engine: EngineConfig,

    /// Backoff applied to content fetches
    pub retry: RetryConfig,

    /// Daemon cadence and work selection
    pub daemon: DaemonSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Engine-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of user pipelines running at once
    pub workers: usize,

    /// Download rate limit in bytes per second (0 = unlimited)
    pub throttle_bytes_per_sec: u64,

    /// Treat an already-active user as an error instead of a skip
    pub strict_claims: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            throttle_bytes_per_sec: 0,
            strict_claims: false,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Initial backoff in milliseconds
    pub initial_wait_ms: u64,

    /// Maximum backoff in milliseconds
    pub max_wait_ms: u64,

    /// Backoff growth factor
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_wait_ms: 2_000,
            max_wait_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_wait: Duration::from_millis(self.initial_wait_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Raw daemon settings; parsed into a
/// [`DaemonConfig`](crate::scheduler::DaemonConfig) at daemon start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Minutes between the starts of consecutive cycles
    pub interval_minutes: u64,

    /// Optional wall-clock time (HH:MM) for the first cycle
    pub start_time: Option<String>,

    /// Stop after this many cycles
    pub max_runs: Option<u32>,

    /// Action names (download, like, unlike, metadata)
    pub actions: Vec<String>,

    /// Content area names (timeline, stories, messages, ...)
    pub areas: Vec<String>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            start_time: None,
            max_runs: None,
            actions: vec!["download".to_string()],
            areas: vec!["timeline".to_string()],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let engine = EngineConfig {
            workers: env_parse("SCRAPEFLOW_WORKERS").unwrap_or(defaults.engine.workers),
            throttle_bytes_per_sec: env_parse("SCRAPEFLOW_THROTTLE_BYTES_PER_SEC")
                .unwrap_or(defaults.engine.throttle_bytes_per_sec),
            strict_claims: env_parse("SCRAPEFLOW_STRICT_CLAIMS")
                .unwrap_or(defaults.engine.strict_claims),
        };

        let retry = RetryConfig {
            max_attempts: env_parse("SCRAPEFLOW_RETRY_MAX_ATTEMPTS")
                .unwrap_or(defaults.retry.max_attempts),
            initial_wait_ms: env_parse("SCRAPEFLOW_RETRY_INITIAL_WAIT_MS")
                .unwrap_or(defaults.retry.initial_wait_ms),
            max_wait_ms: env_parse("SCRAPEFLOW_RETRY_MAX_WAIT_MS")
                .unwrap_or(defaults.retry.max_wait_ms),
            multiplier: env_parse("SCRAPEFLOW_RETRY_MULTIPLIER")
                .unwrap_or(defaults.retry.multiplier),
        };

        let daemon = DaemonSettings {
            interval_minutes: env_parse("SCRAPEFLOW_DAEMON_INTERVAL_MINUTES")
                .unwrap_or(defaults.daemon.interval_minutes),
            start_time: std::env::var("SCRAPEFLOW_DAEMON_START_TIME").ok(),
            max_runs: env_parse("SCRAPEFLOW_DAEMON_MAX_RUNS"),
            actions: env_list("SCRAPEFLOW_DAEMON_ACTIONS").unwrap_or(defaults.daemon.actions),
            areas: env_list("SCRAPEFLOW_DAEMON_AREAS").unwrap_or(defaults.daemon.areas),
        };

        let logging = LoggingConfig {
            level: std::env::var("SCRAPEFLOW_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("SCRAPEFLOW_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            engine,
            retry,
            daemon,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Daemon-specific checks (interval bounds, names, start time) run when
    /// the daemon is constructed.
    pub fn validate(&self) -> Result<()> {
        if self.engine.workers == 0 {
            anyhow::bail!("engine.workers must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be greater than 0");
        }

        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            anyhow::bail!("retry.multiplier must be a finite value >= 1.0");
        }

        if self.retry.initial_wait_ms > self.retry.max_wait_ms {
            anyhow::bail!("retry.initial_wait_ms must not exceed retry.max_wait_ms");
        }

        Ok(())
    }
}
