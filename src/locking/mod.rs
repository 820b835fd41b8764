//! # Distributed Lock Manager
//!
//! Named, time-bounded mutual-exclusion leases backed by a shared key-value
//! store. Two locks are built on this module:
//!
//! - the cluster-wide **scan lock**, ensuring one instance performs a given
//!   tick's due-plan scan, and
//! - the **per-plan lock**, ensuring one instance executes a given plan's
//!   next step.
//!
//! Acquisition is a single atomic set-if-absent-with-expiry; release is a
//! single atomic compare-and-delete on the owner token, so a holder whose
//! lease expired cannot delete a lock that another process has since
//! legitimately acquired. Callers never block or retry inside the manager:
//! `None` means "someone else has it, skip this unit of work."
//!
//! Lock-store failures during acquisition are treated identically to "lock
//! held". Unsynchronized concurrent executions are the worse failure mode
//! here, so this path fails closed even though other subsystems may prefer
//! failing open on a degraded backend.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod manager;
pub mod memory_store;
pub mod redis_store;

pub use manager::{DistributedLockManager, LockHandle};
pub use memory_store::InMemoryLockStore;
pub use redis_store::RedisLockStore;

/// Errors from the shared key-value backend.
#[derive(Debug, Error)]
pub enum LockStoreError {
    #[error("Lock store connection error: {0}")]
    ConnectionError(String),
    #[error("Lock store backend error: {0}")]
    BackendError(String),
}

pub type LockStoreResult<T> = std::result::Result<T, LockStoreError>;

/// Key-value backend supporting the two atomic operations the lease
/// protocol needs.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key = token` with the given TTL only if the key is absent.
    /// Returns whether the write happened.
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> LockStoreResult<bool>;

    /// Delete `key` only if its current value equals `token`. Returns
    /// whether a deletion happened.
    async fn release_if_owner(&self, key: &str, token: &str) -> LockStoreResult<bool>;

    async fn health_check(&self) -> LockStoreResult<bool>;

    fn store_name(&self) -> &'static str;
}
