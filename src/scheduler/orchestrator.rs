//! # Scheduler Orchestrator
//!
//! Fires on a fixed cadence, takes the cluster-wide scan lock so only one
//! instance scans per tick, then drives the scanner and the execution
//! engine over the due batch sequentially.
//!
//! ## Tick state machine
//!
//! Idle -> tick fires -> scan lock acquired? -> Scanning -> Executing ->
//! release -> Idle. A lost scan lock means another instance owns the tick;
//! that is the expected common case in a multi-instance deployment, not an
//! error.
//!
//! Per-plan failures (including panics from collaborator implementations)
//! are contained at the plan boundary: logged, and the plan stays due for
//! the next tick. Only startup configuration faults propagate.
//!
//! Plans execute sequentially within a batch: the settlement call is a
//! scarce, rate-limited external operation, and serializing it bounds the
//! request rate without a separate concurrency limiter.

use crate::config::SchedulerConfig;
use crate::constants::lock_keys;
use crate::error::Result;
use crate::execution::ExecutionEngine;
use crate::locking::DistributedLockManager;
use crate::repository::PlanRepository;
use crate::scheduler::DuePlanScanner;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub struct SchedulerOrchestrator<R: PlanRepository> {
    engine: Arc<ExecutionEngine<R>>,
    scanner: DuePlanScanner<R>,
    locks: DistributedLockManager,
    config: SchedulerConfig,
    instance_id: Uuid,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl<R: PlanRepository> SchedulerOrchestrator<R> {
    /// Build an orchestrator. Configuration faults fail construction:
    /// a misconfigured scheduler must not start ticking.
    pub fn new(
        engine: Arc<ExecutionEngine<R>>,
        scanner: DuePlanScanner<R>,
        locks: DistributedLockManager,
        config: SchedulerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            scanner,
            locks,
            config,
            instance_id: Uuid::new_v4(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the run loop to exit after its current tick.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Run the tick loop until [`stop`](Self::stop) is called.
    ///
    /// The interval keeps its cadence regardless of how long a tick's work
    /// takes; overrun ticks are skipped rather than bursted, and the scan
    /// lock's expiring lease hands those ticks to other instances.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(crate::error::DcaError::InvalidState(
                "orchestrator is already running".to_string(),
            ));
        }

        info!(
            instance_id = %self.instance_id,
            tick_interval_secs = self.config.tick_interval_seconds,
            scan_batch_limit = self.config.scan_batch_limit,
            "scheduler orchestrator started"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        info!(instance_id = %self.instance_id, "scheduler orchestrator stopped");
        Ok(())
    }

    /// One tick: scan lock, scan, sequential execution, release.
    /// Contains every per-plan failure; never propagates.
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    async fn run_tick(&self) {
        let Some(scan_lock) = self
            .locks
            .acquire(lock_keys::SCAN_LOCK, self.config.scan_lock_lease())
            .await
        else {
            debug!("scan lock held by another instance; skipping tick");
            return;
        };

        match self.scanner.due_plans(Utc::now()).await {
            Ok(due) if due.is_empty() => {
                debug!("no plans due");
            }
            Ok(due) => {
                info!(count = due.len(), "executing due plans");
                for plan_ref in &due {
                    self.execute_one(plan_ref.plan_id).await;
                }
            }
            Err(e) => {
                error!(error = %e, "due-plan scan failed; will retry next tick");
            }
        }

        scan_lock.release().await;
    }

    /// Per-plan boundary: one plan's failure must never block the rest of
    /// the batch or crash the orchestrator.
    async fn execute_one(&self, plan_id: Uuid) {
        let attempt = AssertUnwindSafe(self.engine.execute_plan(plan_id))
            .catch_unwind()
            .await;

        match attempt {
            Ok(Ok(Some(outcome))) if outcome.is_success() => {
                info!(
                    plan_id = %plan_id,
                    execution_number = outcome.execution_number,
                    replayed = outcome.replayed,
                    "plan execution succeeded"
                );
            }
            Ok(Ok(Some(outcome))) => {
                warn!(
                    plan_id = %plan_id,
                    execution_number = outcome.execution_number,
                    reason = outcome.error_message.as_deref().unwrap_or("unknown"),
                    "plan execution failed; plan remains due for retry"
                );
            }
            Ok(Ok(None)) => {
                debug!(plan_id = %plan_id, "plan locked by another instance; skipped");
            }
            Ok(Err(e)) => {
                error!(
                    plan_id = %plan_id,
                    error = %e,
                    "plan execution errored; plan remains due for retry"
                );
            }
            Err(_panic) => {
                error!(
                    plan_id = %plan_id,
                    "plan execution panicked; plan remains due for retry"
                );
            }
        }
    }
}
