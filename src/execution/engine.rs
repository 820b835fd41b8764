//! # Execution Engine
//!
//! Performs one execution step for one plan: atomically, idempotently, and
//! under the per-plan distributed lock.
//!
//! ## Key guarantees
//!
//! - **Mutual exclusion**: the per-plan lock ensures one instance executes
//!   a given plan at a time; contention returns `Ok(None)`, never an error.
//! - **Atomicity**: the plan read, record write, and counter advancement
//!   run inside one serializable transaction.
//! - **Idempotency**: a successful record for `(plan_id, execution_number)`
//!   turns any re-attempt into a read of the stored outcome.
//! - **Retry on transient failure**: pricing and ledger failures consume
//!   the slot with a failed record but leave counters untouched, so the
//!   plan stays due and the same slot is retried on the next tick.
//!
//! Cache invalidation and owner notifications fire after commit and are
//! best-effort; they can never roll back the financial write.

use crate::cache::PlanCacheInvalidator;
use crate::constants::{lock_keys, CONSECUTIVE_FAILURE_WARN_THRESHOLD};
use crate::database::TransactionOptions;
use crate::error::{DcaError, Result};
use crate::events::{NotificationPublisher, PlanNotification};
use crate::execution::{conversion, failure_reasons, ExecutionOutcome};
use crate::ledger::{LedgerClient, PurchaseOrder};
use crate::locking::DistributedLockManager;
use crate::models::{
    ExecutionRecord, ExecutionRecordUpdate, ExecutionStatus, NewExecutionRecord, Plan, PlanStatus,
};
use crate::pricing::{AssetPair, PriceOracle};
use crate::repository::{PlanProgress, PlanRepository, PlanTransaction};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExecutionEngineConfig {
    /// Lease for the per-plan lock; must exceed the worst-case duration of
    /// one transactional execution.
    pub plan_lock_lease: Duration,
    pub transaction: TransactionOptions,
}

impl Default for ExecutionEngineConfig {
    fn default() -> Self {
        Self {
            plan_lock_lease: Duration::from_secs(crate::constants::DEFAULT_PLAN_LOCK_LEASE_SECS),
            transaction: TransactionOptions::default(),
        }
    }
}

/// Staged result of one execution step: the outcome plus the post-commit
/// side effects it earned.
struct StepEffects {
    outcome: ExecutionOutcome,
    /// Owner to invalidate caches for; `None` when nothing was written.
    invalidate_owner: Option<Uuid>,
    notifications: Vec<PlanNotification>,
}

impl StepEffects {
    fn read_only(outcome: ExecutionOutcome) -> Self {
        Self {
            outcome,
            invalidate_owner: None,
            notifications: Vec::new(),
        }
    }
}

pub struct ExecutionEngine<R: PlanRepository> {
    repository: Arc<R>,
    locks: DistributedLockManager,
    oracle: Arc<dyn PriceOracle>,
    ledger: Arc<dyn LedgerClient>,
    notifications: NotificationPublisher,
    cache_invalidator: PlanCacheInvalidator,
    config: ExecutionEngineConfig,
}

impl<R: PlanRepository> ExecutionEngine<R> {
    pub fn new(
        repository: Arc<R>,
        locks: DistributedLockManager,
        oracle: Arc<dyn PriceOracle>,
        ledger: Arc<dyn LedgerClient>,
        notifications: NotificationPublisher,
        cache_invalidator: PlanCacheInvalidator,
    ) -> Self {
        Self::with_config(
            repository,
            locks,
            oracle,
            ledger,
            notifications,
            cache_invalidator,
            ExecutionEngineConfig::default(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        repository: Arc<R>,
        locks: DistributedLockManager,
        oracle: Arc<dyn PriceOracle>,
        ledger: Arc<dyn LedgerClient>,
        notifications: NotificationPublisher,
        cache_invalidator: PlanCacheInvalidator,
        config: ExecutionEngineConfig,
    ) -> Self {
        Self {
            repository,
            locks,
            oracle,
            ledger,
            notifications,
            cache_invalidator,
            config,
        }
    }

    /// Execute the plan's next step.
    ///
    /// Returns `Ok(None)` only when the per-plan lock could not be
    /// acquired: another instance is already executing this plan.
    /// Business-logic failures are a `Failed` outcome, not `None`.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn execute_plan(&self, plan_id: Uuid) -> Result<Option<ExecutionOutcome>> {
        let lock_key = lock_keys::plan_lock(plan_id);
        let Some(lock) = self
            .locks
            .acquire(&lock_key, self.config.plan_lock_lease)
            .await
        else {
            debug!("per-plan lock held elsewhere; skipping");
            return Ok(None);
        };

        let result = self.execute_locked(plan_id).await;
        lock.release().await;
        result.map(Some)
    }

    async fn execute_locked(&self, plan_id: Uuid) -> Result<ExecutionOutcome> {
        let mut txn = self.repository.begin(&self.config.transaction).await?;

        match self.execute_step(&mut txn, plan_id).await {
            Ok(effects) => {
                txn.commit().await?;
                self.apply_side_effects(&effects);
                Ok(effects.outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "transaction rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Steps 1-9 of the execution algorithm, inside the open transaction.
    async fn execute_step(&self, txn: &mut R::Txn, plan_id: Uuid) -> Result<StepEffects> {
        // A missing plan is a caller bug, not a runtime condition.
        let plan = txn
            .find_plan(plan_id)
            .await?
            .ok_or(DcaError::PlanNotFound(plan_id))?;

        if plan.status != PlanStatus::Active {
            info!(status = plan.status.as_str(), "plan not active; skipping");
            return Ok(StepEffects::read_only(ExecutionOutcome::short_circuit(
                &plan,
                failure_reasons::NOT_ACTIVE,
            )));
        }

        if plan.executions_completed >= plan.total_executions {
            warn!(
                executions_completed = plan.executions_completed,
                total_executions = plan.total_executions,
                "finished plan surfaced by scan; skipping"
            );
            return Ok(StepEffects::read_only(ExecutionOutcome::short_circuit(
                &plan,
                failure_reasons::ALL_EXECUTIONS_COMPLETED,
            )));
        }

        let execution_number = plan.executions_completed + 1;
        let now = Utc::now();

        // Idempotency anchor: a successful record makes this a replay. A
        // failed record means the slot is being retried.
        let existing = txn
            .find_execution_record(plan_id, execution_number)
            .await?;
        let retrying = match &existing {
            Some(record) if record.status == ExecutionStatus::Success => {
                info!(
                    execution_number,
                    "successful record already present; returning stored outcome"
                );
                return Ok(StepEffects::read_only(ExecutionOutcome::from_record(
                    record, true,
                )));
            }
            Some(record) => {
                info!(
                    execution_number,
                    attempt = record.attempt_count + 1,
                    "retrying failed execution slot"
                );
                true
            }
            None => false,
        };

        // Due-ness re-check inside the transaction. A stale scan reference
        // (scan-lock lease expired mid-batch on another instance) must not
        // execute a future slot early. A duplicate invocation right after a
        // committed execution replays that execution's stored record.
        if !retrying && plan.next_execution_at > now {
            if plan.executions_completed > 0 {
                if let Some(last) = txn
                    .find_execution_record(plan_id, plan.executions_completed)
                    .await?
                {
                    info!(
                        execution_number = last.execution_number,
                        "plan not due; returning stored outcome of last execution"
                    );
                    return Ok(StepEffects::read_only(ExecutionOutcome::from_record(
                        &last, true,
                    )));
                }
            }
            warn!(
                next_execution_at = %plan.next_execution_at,
                "plan surfaced by scan but not due; skipping"
            );
            return Ok(StepEffects::read_only(ExecutionOutcome::short_circuit(
                &plan,
                failure_reasons::NOT_DUE,
            )));
        }

        let pair = AssetPair::new(plan.deposit_asset.clone(), plan.target_asset.clone());
        let quote = match self.oracle.current_price(&pair).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(
                    execution_number,
                    error = %e,
                    "price fetch failed; recording failed execution"
                );
                return self
                    .persist_failure(
                        txn,
                        &plan,
                        execution_number,
                        retrying,
                        None,
                        None,
                        e.to_string(),
                    )
                    .await;
            }
        };

        let amount_out = conversion::amount_out(
            plan.amount_per_execution,
            plan.deposit_scale,
            &quote.price,
        )?;

        let order = PurchaseOrder {
            plan_id: plan.plan_id,
            ledger_account: plan.ledger_account.clone(),
            deposit_asset: plan.deposit_asset.clone(),
            target_asset: plan.target_asset.clone(),
            amount_in: plan.amount_per_execution,
            amount_out: amount_out.clone(),
            price: quote.price.clone(),
        };
        let receipt = match self.ledger.submit_purchase(&order).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(
                    execution_number,
                    error = %e,
                    "ledger write failed; recording failed execution"
                );
                return self
                    .persist_failure(
                        txn,
                        &plan,
                        execution_number,
                        retrying,
                        Some(amount_out),
                        Some(quote.price),
                        e.to_string(),
                    )
                    .await;
            }
        };

        let record = Self::persist_outcome(
            txn,
            retrying,
            NewExecutionRecord {
                plan_id: plan.plan_id,
                execution_number,
                amount_in: plan.amount_per_execution,
                amount_out: Some(amount_out.clone()),
                price: Some(quote.price.clone()),
                ledger_tx_id: Some(receipt.tx_id.clone()),
                status: ExecutionStatus::Success,
                error_message: None,
            },
        )
        .await?;

        let completed = execution_number >= plan.total_executions;
        let status = if completed {
            PlanStatus::Completed
        } else {
            PlanStatus::Active
        };
        txn.update_plan_progress(
            plan.plan_id,
            PlanProgress {
                executions_completed: execution_number,
                next_execution_at: now + plan.interval.duration(),
                status,
            },
        )
        .await?;

        info!(
            execution_number,
            price = %quote.price,
            price_source = ?quote.source,
            amount_out = %amount_out,
            ledger_tx_id = %receipt.tx_id,
            completed,
            "plan executed"
        );

        let mut notifications = vec![PlanNotification::PlanExecuted {
            plan_id: plan.plan_id,
            owner_id: plan.owner_id,
            execution_number,
            amount_in: plan.amount_per_execution,
            amount_out,
            ledger_tx_id: receipt.tx_id,
            occurred_at: now,
        }];
        if completed {
            notifications.push(PlanNotification::PlanCompleted {
                plan_id: plan.plan_id,
                owner_id: plan.owner_id,
                total_executions: plan.total_executions,
                occurred_at: now,
            });
        }

        Ok(StepEffects {
            outcome: ExecutionOutcome::from_record(&record, false),
            invalidate_owner: Some(plan.owner_id),
            notifications,
        })
    }

    /// Record a transient dependency failure: the slot is consumed by a
    /// failed record, counters stay untouched, and the plan remains due.
    #[allow(clippy::too_many_arguments)]
    async fn persist_failure(
        &self,
        txn: &mut R::Txn,
        plan: &Plan,
        execution_number: i32,
        retrying: bool,
        amount_out: Option<bigdecimal::BigDecimal>,
        price: Option<bigdecimal::BigDecimal>,
        error_message: String,
    ) -> Result<StepEffects> {
        let record = Self::persist_outcome(
            txn,
            retrying,
            NewExecutionRecord {
                plan_id: plan.plan_id,
                execution_number,
                amount_in: plan.amount_per_execution,
                amount_out,
                price,
                ledger_tx_id: None,
                status: ExecutionStatus::Failed,
                error_message: Some(error_message.clone()),
            },
        )
        .await?;

        if record.attempt_count >= CONSECUTIVE_FAILURE_WARN_THRESHOLD {
            warn!(
                plan_id = %plan.plan_id,
                execution_number,
                attempt_count = record.attempt_count,
                "execution slot failing repeatedly; operator attention recommended"
            );
        }

        Ok(StepEffects {
            outcome: ExecutionOutcome::from_record(&record, false),
            invalidate_owner: Some(plan.owner_id),
            notifications: vec![PlanNotification::PlanExecutionFailed {
                plan_id: plan.plan_id,
                owner_id: plan.owner_id,
                execution_number,
                reason: error_message,
                occurred_at: Utc::now(),
            }],
        })
    }

    /// First attempt creates the record; a retry updates the failed slot
    /// in place and bumps its attempt count.
    async fn persist_outcome(
        txn: &mut R::Txn,
        retrying: bool,
        record: NewExecutionRecord,
    ) -> Result<ExecutionRecord> {
        if retrying {
            txn.update_execution_record(
                record.plan_id,
                record.execution_number,
                ExecutionRecordUpdate::from(&record),
            )
            .await
        } else {
            txn.create_execution_record(record).await
        }
    }

    /// Post-commit side effects: best-effort, never blocking, never able
    /// to roll back the committed write.
    fn apply_side_effects(&self, effects: &StepEffects) {
        if let Some(owner_id) = effects.invalidate_owner {
            self.cache_invalidator
                .invalidate_plan(effects.outcome.plan_id, owner_id);
        }
        for notification in &effects.notifications {
            self.notifications.publish(notification.clone());
        }
    }
}
