//! Redis lock store.
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections.
//! Acquisition maps to `SET key token NX EX secs`; release runs a
//! server-side Lua script so the compare-and-delete is a single atomic
//! operation on the Redis side.

use super::{LockStore, LockStoreError, LockStoreResult};
use crate::config::RedisConfig;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// GET/compare/DEL as one atomic server-side operation.
const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisLockStore {
    connection_manager: redis::aio::ConnectionManager,
    release_script: redis::Script,
}

impl std::fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockStore")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisLockStore {
    pub async fn from_config(config: &RedisConfig) -> LockStoreResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            LockStoreError::ConnectionError(format!("failed to create Redis client: {e}"))
        })?;

        let connection_manager =
            redis::aio::ConnectionManager::new(client).await.map_err(|e| {
                LockStoreError::ConnectionError(format!("failed to connect to Redis: {e}"))
            })?;

        debug!("Redis lock store connected");

        Ok(Self {
            connection_manager,
            release_script: redis::Script::new(RELEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> LockStoreResult<bool> {
        let mut conn = self.connection_manager.clone();
        let lease_seconds = lease.as_secs().max(1);

        let response: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(lease_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockStoreError::BackendError(format!("Redis SET NX failed: {e}")))?;

        Ok(response.is_some())
    }

    async fn release_if_owner(&self, key: &str, token: &str) -> LockStoreResult<bool> {
        let mut conn = self.connection_manager.clone();

        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                LockStoreError::BackendError(format!("Redis release script failed: {e}"))
            })?;

        Ok(deleted > 0)
    }

    async fn health_check(&self) -> LockStoreResult<bool> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| LockStoreError::BackendError(format!("Redis PING failed: {e}")))?;
        Ok(pong == "PONG")
    }

    fn store_name(&self) -> &'static str {
        "redis"
    }
}

// Integration tests require a running Redis instance; see the
// `test-services` feature.
#[cfg(all(test, feature = "test-services"))]
mod integration {
    use super::*;
    use uuid::Uuid;

    async fn test_store() -> RedisLockStore {
        let config = RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connection_timeout_seconds: 5,
        };
        RedisLockStore::from_config(&config)
            .await
            .expect("redis unavailable")
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let store = test_store().await;
        let key = format!("test:lock:{}", Uuid::new_v4());
        let lease = Duration::from_secs(30);

        assert!(store.try_acquire(&key, "owner-1", lease).await.unwrap());
        assert!(!store.try_acquire(&key, "owner-2", lease).await.unwrap());

        // Wrong token must not delete; right token must.
        assert!(!store.release_if_owner(&key, "owner-2").await.unwrap());
        assert!(store.release_if_owner(&key, "owner-1").await.unwrap());
        assert!(store.try_acquire(&key, "owner-2", lease).await.unwrap());
        assert!(store.release_if_owner(&key, "owner-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_expiry() {
        let store = test_store().await;
        let key = format!("test:lock:{}", Uuid::new_v4());

        assert!(store
            .try_acquire(&key, "owner-1", Duration::from_secs(1))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(store
            .try_acquire(&key, "owner-2", Duration::from_secs(30))
            .await
            .unwrap());
        assert!(store.release_if_owner(&key, "owner-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = test_store().await;
        assert!(store.health_check().await.unwrap());
    }
}
