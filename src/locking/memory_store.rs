//! In-process lock store for tests and single-node development.
//!
//! Honors the same lease semantics as the Redis store: expired entries are
//! treated as absent, and release only deletes a matching owner token.
//! This is a test double, not a substitute for the shared store in any
//! multi-instance deployment.

use super::{LockStore, LockStoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> LockStoreResult<bool> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                expires_at: now + lease,
            },
        );
        Ok(true)
    }

    async fn release_if_owner(&self, key: &str, token: &str) -> LockStoreResult<bool> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(existing) if existing.token == token && existing.expires_at > now => {
                entries.remove(key);
                Ok(true)
            }
            Some(existing) if existing.expires_at <= now => {
                // Expired entry: the lease is already gone.
                entries.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> LockStoreResult<bool> {
        Ok(true)
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
