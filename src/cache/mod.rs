//! # Cache Layer
//!
//! Read-through cache backend used for reference-price fallback and for the
//! fire-and-forget invalidation signals emitted after a committed
//! execution.
//!
//! `CacheProvider` dispatches over concrete backends with a plain enum:
//! Redis in production, an in-process TTL map for tests, and a NoOp
//! fallback that always misses and always succeeds, so a degraded cache
//! never blocks the financial path.

use crate::config::RedisConfig;
use crate::constants::cache_keys;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod memory;
pub mod redis_backend;

pub use memory::MemoryCache;
pub use redis_backend::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),
    #[error("Cache backend error: {0}")]
    BackendError(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Enum-dispatched cache backend.
#[derive(Debug, Clone)]
pub enum CacheProvider {
    Redis(Box<RedisCache>),
    Memory(MemoryCache),
    NoOp,
}

impl CacheProvider {
    /// Connect to Redis, falling back to NoOp when the backend is
    /// unreachable. Cache degradation must never block startup.
    pub async fn from_config(config: &RedisConfig) -> Self {
        match RedisCache::from_config(config).await {
            Ok(cache) => CacheProvider::Redis(Box::new(cache)),
            Err(e) => {
                warn!(error = %e, "cache backend unavailable; falling back to NoOp");
                CacheProvider::NoOp
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            CacheProvider::Redis(_) => "redis",
            CacheProvider::Memory(_) => "memory",
            CacheProvider::NoOp => "noop",
        }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            CacheProvider::Redis(cache) => cache.get(key).await,
            CacheProvider::Memory(cache) => cache.get(key).await,
            CacheProvider::NoOp => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            CacheProvider::Redis(cache) => cache.set(key, value, ttl).await,
            CacheProvider::Memory(cache) => cache.set(key, value, ttl).await,
            CacheProvider::NoOp => Ok(()),
        }
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        match self {
            CacheProvider::Redis(cache) => cache.delete(key).await,
            CacheProvider::Memory(cache) => cache.delete(key).await,
            CacheProvider::NoOp => Ok(()),
        }
    }
}

/// Emits "plan changed" / "owner plan-list changed" invalidation signals.
///
/// Deletions run on a spawned task and are best-effort: failures are
/// logged, never surfaced, and never roll back the write that triggered
/// them.
#[derive(Debug, Clone)]
pub struct PlanCacheInvalidator {
    provider: Arc<CacheProvider>,
}

impl PlanCacheInvalidator {
    pub fn new(provider: Arc<CacheProvider>) -> Self {
        Self { provider }
    }

    pub fn invalidate_plan(&self, plan_id: Uuid, owner_id: Uuid) {
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            for key in [cache_keys::plan(plan_id), cache_keys::owner_plans(owner_id)] {
                match provider.delete(&key).await {
                    Ok(()) => debug!(key = %key, "cache invalidated"),
                    Err(e) => warn!(key = %key, error = %e, "cache invalidation failed"),
                }
            }
        });
    }
}
