//! # System Constants
//!
//! Operational boundaries and well-known keys shared across the scheduler,
//! lock manager, and execution engine.

use uuid::Uuid;

/// Fractional digits of the target asset (satoshi-style precision).
///
/// Produced amounts are floored to this scale; the conversion never rounds up.
pub const TARGET_ASSET_SCALE: i64 = 8;

/// Upper bound on plans returned by a single due-plan scan.
pub const DEFAULT_SCAN_BATCH_LIMIT: i64 = 100;

/// Default scheduler cadence in seconds.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

/// Subtracted from the tick interval to size the scan-lock lease, so a stuck
/// holder's lease expires before the next tick would run unprotected.
pub const DEFAULT_SCAN_LOCK_MARGIN_SECS: u64 = 5;

/// Default lease for the per-plan execution lock. Must exceed the worst-case
/// duration of one transactional execution.
pub const DEFAULT_PLAN_LOCK_LEASE_SECS: u64 = 30;

/// Failed attempts on the same execution slot before the engine escalates
/// from `warn` to a loud consecutive-failure warning.
pub const CONSECUTIVE_FAILURE_WARN_THRESHOLD: i32 = 3;

/// Lock resource keys.
pub mod lock_keys {
    use super::Uuid;

    /// Cluster-wide lock ensuring one instance scans per tick.
    pub const SCAN_LOCK: &str = "dca:lock:scan";

    /// Per-plan lock ensuring one instance executes a plan's next step.
    pub fn plan_lock(plan_id: Uuid) -> String {
        format!("dca:lock:plan:{plan_id}")
    }
}

/// Cache keys invalidated after a committed execution.
pub mod cache_keys {
    use super::Uuid;

    pub fn plan(plan_id: Uuid) -> String {
        format!("dca:plan:{plan_id}")
    }

    pub fn owner_plans(owner_id: Uuid) -> String {
        format!("dca:plans:owner:{owner_id}")
    }

    pub fn price(pair: &str) -> String {
        format!("dca:price:{pair}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_lock_key_includes_plan_id() {
        let id = Uuid::new_v4();
        let key = lock_keys::plan_lock(id);
        assert!(key.starts_with("dca:lock:plan:"));
        assert!(key.contains(&id.to_string()));
    }

    #[test]
    fn test_scan_lock_margin_smaller_than_tick() {
        assert!(DEFAULT_SCAN_LOCK_MARGIN_SECS < DEFAULT_TICK_INTERVAL_SECS);
    }
}
