//! # Configuration
//!
//! Typed configuration for the scheduler core, loaded from environment
//! variables with validated defaults. Malformed values fail loading rather
//! than being silently replaced: a misconfigured scheduler must not start.

use crate::constants;
use crate::error::{DcaError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/dca_development".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 10,
        }
    }
}

/// Redis connection settings for the lock store and cache backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout_seconds: 5,
        }
    }
}

/// Scheduler cadence and batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick cadence in seconds.
    pub tick_interval_seconds: u64,
    /// Subtracted from the tick interval to size the scan-lock lease.
    pub scan_lock_margin_seconds: u64,
    /// Maximum plans returned by one due-plan scan.
    pub scan_batch_limit: i64,
    /// Lease for the per-plan execution lock.
    pub plan_lock_lease_seconds: u64,
}

impl SchedulerConfig {
    /// Lease for the cluster scan lock: tick interval minus margin, so a
    /// crashed holder's lease expires before the next tick.
    pub fn scan_lock_lease(&self) -> Duration {
        Duration::from_secs(
            self.tick_interval_seconds
                .saturating_sub(self.scan_lock_margin_seconds),
        )
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn plan_lock_lease(&self) -> Duration {
        Duration::from_secs(self.plan_lock_lease_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(DcaError::ConfigurationError(
                "tick_interval_seconds must be positive".to_string(),
            ));
        }
        if self.scan_lock_margin_seconds >= self.tick_interval_seconds {
            return Err(DcaError::ConfigurationError(format!(
                "scan_lock_margin_seconds ({}) must be smaller than tick_interval_seconds ({})",
                self.scan_lock_margin_seconds, self.tick_interval_seconds
            )));
        }
        if self.scan_batch_limit <= 0 {
            return Err(DcaError::ConfigurationError(
                "scan_batch_limit must be positive".to_string(),
            ));
        }
        if self.plan_lock_lease_seconds == 0 {
            return Err(DcaError::ConfigurationError(
                "plan_lock_lease_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: constants::DEFAULT_TICK_INTERVAL_SECS,
            scan_lock_margin_seconds: constants::DEFAULT_SCAN_LOCK_MARGIN_SECS,
            scan_batch_limit: constants::DEFAULT_SCAN_BATCH_LIMIT,
            plan_lock_lease_seconds: constants::DEFAULT_PLAN_LOCK_LEASE_SECS,
        }
    }
}

/// Execution-transaction bounds (isolation is fixed at serializable by the
/// repository; these bound resource acquisition and statement runtime).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    pub lock_timeout_ms: u64,
    pub statement_timeout_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            statement_timeout_ms: 5_000,
        }
    }
}

/// Price-cache behavior for the oracle client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// TTL for cached reference prices; bounds how stale a fallback can be.
    pub cache_ttl_seconds: u64,
}

impl PricingConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 900, // 15 minutes
        }
    }
}

/// Root configuration for the DCA execution core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DcaConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub scheduler: SchedulerConfig,
    pub transaction: TransactionConfig,
    pub pricing: PricingConfig,
}

impl DcaConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for unset keys. Malformed values are configuration errors.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            database: DatabaseConfig {
                url: env_string("DCA_DATABASE_URL")
                    .or_else(|| env_string("DATABASE_URL"))
                    .unwrap_or(defaults.database.url),
                max_connections: env_parse(
                    "DCA_DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
                acquire_timeout_seconds: env_parse(
                    "DCA_DATABASE_ACQUIRE_TIMEOUT_SECONDS",
                    defaults.database.acquire_timeout_seconds,
                )?,
            },
            redis: RedisConfig {
                url: env_string("DCA_REDIS_URL")
                    .or_else(|| env_string("REDIS_URL"))
                    .unwrap_or(defaults.redis.url),
                connection_timeout_seconds: env_parse(
                    "DCA_REDIS_CONNECTION_TIMEOUT_SECONDS",
                    defaults.redis.connection_timeout_seconds,
                )?,
            },
            scheduler: SchedulerConfig {
                tick_interval_seconds: env_parse(
                    "DCA_TICK_INTERVAL_SECONDS",
                    defaults.scheduler.tick_interval_seconds,
                )?,
                scan_lock_margin_seconds: env_parse(
                    "DCA_SCAN_LOCK_MARGIN_SECONDS",
                    defaults.scheduler.scan_lock_margin_seconds,
                )?,
                scan_batch_limit: env_parse(
                    "DCA_SCAN_BATCH_LIMIT",
                    defaults.scheduler.scan_batch_limit,
                )?,
                plan_lock_lease_seconds: env_parse(
                    "DCA_PLAN_LOCK_LEASE_SECONDS",
                    defaults.scheduler.plan_lock_lease_seconds,
                )?,
            },
            transaction: TransactionConfig {
                lock_timeout_ms: env_parse(
                    "DCA_TRANSACTION_LOCK_TIMEOUT_MS",
                    defaults.transaction.lock_timeout_ms,
                )?,
                statement_timeout_ms: env_parse(
                    "DCA_TRANSACTION_STATEMENT_TIMEOUT_MS",
                    defaults.transaction.statement_timeout_ms,
                )?,
            },
            pricing: PricingConfig {
                cache_ttl_seconds: env_parse(
                    "DCA_PRICE_CACHE_TTL_SECONDS",
                    defaults.pricing.cache_ttl_seconds,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(DcaError::ConfigurationError(
                "database url must not be empty".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(DcaError::ConfigurationError(
                "database max_connections must be positive".to_string(),
            ));
        }
        if self.redis.url.is_empty() {
            return Err(DcaError::ConfigurationError(
                "lock store url must not be empty".to_string(),
            ));
        }
        if self.transaction.lock_timeout_ms == 0 || self.transaction.statement_timeout_ms == 0 {
            return Err(DcaError::ConfigurationError(
                "transaction timeouts must be positive".to_string(),
            ));
        }
        self.scheduler.validate()
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            DcaError::ConfigurationError(format!("invalid value for {key}: '{raw}'"))
        }),
        Err(_) => Ok(default),
    }
}
