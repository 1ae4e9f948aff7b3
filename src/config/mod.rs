//! Configuration management for the status poller
//!
//! Settings are loaded from environment variables or a TOML file and
//! validated before any background task starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheduler / worker pool configuration
    pub poller: PollerConfig,

    /// Leader lease configuration
    pub lease: LeaseConfig,

    /// Per-probe settings
    pub probe: ProbeConfig,

    /// Redis (coordination store) configuration
    pub redis: RedisConfig,

    /// PostgreSQL (status store) configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduler and worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between two scheduling cycles
    pub poll_interval_secs: u64,

    /// Number of concurrent probe workers
    pub worker_count: usize,

    /// Seconds after which an unchanged snapshot is written again
    pub cache_refresh_secs: u64,
}

/// Leader lease settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Coordination store key holding the lease
    pub key: String,

    /// Lease time-to-live in seconds
    pub ttl_secs: u64,

    /// Fraction of the TTL after which the lease is renewed
    pub renew_fraction: f64,

    /// Seconds between acquire attempts while follower
    pub acquire_retry_secs: u64,
}

/// Status probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Deadline for a single probe in milliseconds
    pub timeout_ms: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,

    /// Maximum pool size
    pub pool_size: usize,
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

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            worker_count: 10,
            cache_refresh_secs: 300,
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            key: String::from("mcpulse:poller:leader"),
            ttl_secs: 30,
            renew_fraction: 0.5,
            acquire_retry_secs: 10,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_ms: 3000 }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://localhost:6379"),
            pool_size: 8,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::from("postgresql://localhost/mcpulse"),
            pool_size: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            lease: LeaseConfig::default(),
            probe: ProbeConfig::default(),
            redis: RedisConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let poller = PollerConfig {
            poll_interval_secs: env_parse("MCPULSE_POLL_INTERVAL")
                .unwrap_or(defaults.poller.poll_interval_secs),
            worker_count: env_parse("MCPULSE_WORKER_COUNT").unwrap_or(defaults.poller.worker_count),
            cache_refresh_secs: env_parse("MCPULSE_CACHE_REFRESH")
                .unwrap_or(defaults.poller.cache_refresh_secs),
        };

        let lease = LeaseConfig {
            key: std::env::var("MCPULSE_LEASE_KEY").unwrap_or(defaults.lease.key),
            ttl_secs: env_parse("MCPULSE_LEASE_TTL").unwrap_or(defaults.lease.ttl_secs),
            renew_fraction: env_parse("MCPULSE_LEASE_RENEW_FRACTION")
                .unwrap_or(defaults.lease.renew_fraction),
            acquire_retry_secs: env_parse("MCPULSE_LEASE_ACQUIRE_RETRY")
                .unwrap_or(defaults.lease.acquire_retry_secs),
        };

        let probe = ProbeConfig {
            timeout_ms: env_parse("MCPULSE_PROBE_TIMEOUT_MS").unwrap_or(defaults.probe.timeout_ms),
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.redis.url),
            pool_size: env_parse("REDIS_POOL_SIZE").unwrap_or(defaults.redis.pool_size),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("POSTGRES_URL"))
                .unwrap_or(defaults.database.url),
            pool_size: env_parse("DB_POOL_SIZE").unwrap_or(defaults.database.pool_size),
        };

        let logging = LoggingConfig {
            level: std::env::var("MCPULSE_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("MCPULSE_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            poller,
            lease,
            probe,
            redis,
            database,
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
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.poller.worker_count == 0 {
            return Err(ConfigError::invalid(
                "poller.worker_count",
                "must be greater than 0",
            ));
        }

        if self.poller.poll_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "poller.poll_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.lease.key.is_empty() {
            return Err(ConfigError::invalid("lease.key", "must not be empty"));
        }

        if self.lease.ttl_secs == 0 {
            return Err(ConfigError::invalid("lease.ttl_secs", "must be greater than 0"));
        }

        if !(self.lease.renew_fraction > 0.0 && self.lease.renew_fraction < 1.0) {
            return Err(ConfigError::invalid(
                "lease.renew_fraction",
                "must be between 0 and 1 (exclusive)",
            ));
        }

        if self.lease.acquire_retry_secs == 0 {
            return Err(ConfigError::invalid(
                "lease.acquire_retry_secs",
                "must be greater than 0",
            ));
        }

        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::invalid("probe.timeout_ms", "must be greater than 0"));
        }

        if self.probe_timeout() >= self.poll_interval() {
            return Err(ConfigError::invalid(
                "probe.timeout_ms",
                "must be shorter than the poll interval",
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.poll_interval_secs)
    }

    #[must_use]
    pub fn cache_refresh(&self) -> Duration {
        Duration::from_secs(self.poller.cache_refresh_secs)
    }

    #[must_use]
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease.ttl_secs)
    }

    /// Interval between two lease renewals
    #[must_use]
    pub fn renew_interval(&self) -> Duration {
        self.lease_ttl().mul_f64(self.lease.renew_fraction)
    }

    #[must_use]
    pub fn acquire_retry(&self) -> Duration {
        Duration::from_secs(self.lease.acquire_retry_secs)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.timeout_ms)
    }
}
