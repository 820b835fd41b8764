//! In-memory plan repository.
//!
//! Deterministic stand-in for the PostgreSQL repository in unit and
//! scheduler tests. A transaction holds the store's mutex for its whole
//! lifetime, which makes every transaction trivially serializable; staged
//! writes apply on commit and vanish on rollback or drop.

use crate::database::TransactionOptions;
use crate::error::{DcaError, Result};
use crate::models::{
    ExecutionRecord, ExecutionRecordUpdate, NewExecutionRecord, NewPlan, Plan, PlanRef,
};
use crate::repository::{PlanProgress, PlanRepository, PlanTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    plans: HashMap<Uuid, Plan>,
    records: HashMap<(Uuid, i32), ExecutionRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPlanRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of execution records across all plans.
    pub async fn record_count(&self) -> usize {
        self.state.lock().await.records.len()
    }

    /// All records for one plan, ordered by execution number.
    pub async fn records_for_plan(&self, plan_id: Uuid) -> Vec<ExecutionRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<ExecutionRecord> = state
            .records
            .values()
            .filter(|r| r.plan_id == plan_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.execution_number);
        records
    }
}

pub struct InMemoryPlanTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged_plans: HashMap<Uuid, Plan>,
    staged_records: HashMap<(Uuid, i32), ExecutionRecord>,
}

impl InMemoryPlanTransaction {
    fn lookup_plan(&self, plan_id: Uuid) -> Option<Plan> {
        self.staged_plans
            .get(&plan_id)
            .or_else(|| self.guard.plans.get(&plan_id))
            .cloned()
    }

    fn lookup_record(&self, key: (Uuid, i32)) -> Option<ExecutionRecord> {
        self.staged_records
            .get(&key)
            .or_else(|| self.guard.records.get(&key))
            .cloned()
    }
}

#[async_trait]
impl PlanTransaction for InMemoryPlanTransaction {
    async fn find_plan(&mut self, plan_id: Uuid) -> Result<Option<Plan>> {
        Ok(self.lookup_plan(plan_id))
    }

    async fn find_execution_record(
        &mut self,
        plan_id: Uuid,
        execution_number: i32,
    ) -> Result<Option<ExecutionRecord>> {
        Ok(self.lookup_record((plan_id, execution_number)))
    }

    async fn create_execution_record(
        &mut self,
        record: NewExecutionRecord,
    ) -> Result<ExecutionRecord> {
        let key = (record.plan_id, record.execution_number);
        if self.lookup_record(key).is_some() {
            return Err(DcaError::DatabaseError(format!(
                "duplicate key (plan {}, execution {}) violates unique constraint",
                record.plan_id, record.execution_number
            )));
        }
        let now = Utc::now();
        let stored = ExecutionRecord {
            record_id: Uuid::new_v4(),
            plan_id: record.plan_id,
            execution_number: record.execution_number,
            amount_in: record.amount_in,
            amount_out: record.amount_out,
            price: record.price,
            ledger_tx_id: record.ledger_tx_id,
            status: record.status,
            error_message: record.error_message,
            attempt_count: 1,
            created_at: now,
            updated_at: now,
        };
        self.staged_records.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update_execution_record(
        &mut self,
        plan_id: Uuid,
        execution_number: i32,
        update: ExecutionRecordUpdate,
    ) -> Result<ExecutionRecord> {
        let key = (plan_id, execution_number);
        let mut record = self.lookup_record(key).ok_or_else(|| {
            DcaError::DatabaseError(format!(
                "execution record ({plan_id}, {execution_number}) not found for update"
            ))
        })?;
        record.amount_out = update.amount_out;
        record.price = update.price;
        record.ledger_tx_id = update.ledger_tx_id;
        record.status = update.status;
        record.error_message = update.error_message;
        record.attempt_count += 1;
        record.updated_at = Utc::now();
        self.staged_records.insert(key, record.clone());
        Ok(record)
    }

    async fn update_plan_progress(
        &mut self,
        plan_id: Uuid,
        progress: PlanProgress,
    ) -> Result<Plan> {
        let mut plan = self
            .lookup_plan(plan_id)
            .ok_or(DcaError::PlanNotFound(plan_id))?;
        plan.executions_completed = progress.executions_completed;
        plan.next_execution_at = progress.next_execution_at;
        plan.status = progress.status;
        plan.updated_at = Utc::now();
        self.staged_plans.insert(plan_id, plan.clone());
        Ok(plan)
    }

    async fn commit(mut self) -> Result<()> {
        for (id, plan) in self.staged_plans.drain() {
            self.guard.plans.insert(id, plan);
        }
        for (key, record) in self.staged_records.drain() {
            self.guard.records.insert(key, record);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // Staged writes are simply dropped with the guard.
        Ok(())
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    type Txn = InMemoryPlanTransaction;

    async fn begin(&self, _options: &TransactionOptions) -> Result<Self::Txn> {
        let guard = self.state.clone().lock_owned().await;
        Ok(InMemoryPlanTransaction {
            guard,
            staged_plans: HashMap::new(),
            staged_records: HashMap::new(),
        })
    }

    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>> {
        Ok(self.state.lock().await.plans.get(&plan_id).cloned())
    }

    async fn create_plan(&self, new_plan: NewPlan) -> Result<Plan> {
        new_plan.validate()?;
        let now = Utc::now();
        let plan = Plan {
            plan_id: Uuid::new_v4(),
            owner_id: new_plan.owner_id,
            deposit_asset: new_plan.deposit_asset,
            target_asset: new_plan.target_asset,
            amount_per_execution: new_plan.amount_per_execution,
            deposit_scale: new_plan.deposit_scale,
            total_executions: new_plan.total_executions,
            executions_completed: 0,
            interval: new_plan.interval,
            next_execution_at: new_plan.next_execution_at,
            status: crate::models::PlanStatus::Active,
            ledger_account: new_plan.ledger_account,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .await
            .plans
            .insert(plan.plan_id, plan.clone());
        Ok(plan)
    }

    async fn find_due_plans(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<PlanRef>> {
        let state = self.state.lock().await;
        let mut due: Vec<PlanRef> = state
            .plans
            .values()
            .filter(|p| p.is_due(now))
            .map(|p| PlanRef {
                plan_id: p.plan_id,
                next_execution_at: p.next_execution_at,
            })
            .collect();
        due.sort_by_key(|r| r.next_execution_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionStatus, RecurrenceInterval};
    use chrono::Duration;

    fn new_plan(due_offset_minutes: i64) -> NewPlan {
        NewPlan {
            owner_id: Uuid::new_v4(),
            deposit_asset: "USDC".to_string(),
            target_asset: "BTC".to_string(),
            amount_per_execution: 100_000_000,
            deposit_scale: 6,
            total_executions: 12,
            interval: RecurrenceInterval::Weekly,
            next_execution_at: Utc::now() + Duration::minutes(due_offset_minutes),
            ledger_account: None,
        }
    }

    #[tokio::test]
    async fn test_due_scan_orders_oldest_first_and_bounds() {
        let repository = InMemoryPlanRepository::new();
        let older = repository.create_plan(new_plan(-60)).await.unwrap();
        let newer = repository.create_plan(new_plan(-5)).await.unwrap();
        let _future = repository.create_plan(new_plan(60)).await.unwrap();

        let due = repository.find_due_plans(Utc::now(), 100).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].plan_id, older.plan_id);
        assert_eq!(due[1].plan_id, newer.plan_id);

        let bounded = repository.find_due_plans(Utc::now(), 1).await.unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].plan_id, older.plan_id);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let repository = InMemoryPlanRepository::new();
        let plan = repository.create_plan(new_plan(-5)).await.unwrap();

        let mut txn = repository.begin(&TransactionOptions::default()).await.unwrap();
        txn.create_execution_record(NewExecutionRecord {
            plan_id: plan.plan_id,
            execution_number: 1,
            amount_in: plan.amount_per_execution,
            amount_out: None,
            price: None,
            ledger_tx_id: None,
            status: ExecutionStatus::Failed,
            error_message: Some("boom".to_string()),
        })
        .await
        .unwrap();
        txn.rollback().await.unwrap();

        assert_eq!(repository.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_slot_rejected() {
        let repository = InMemoryPlanRepository::new();
        let plan = repository.create_plan(new_plan(-5)).await.unwrap();

        let mut txn = repository.begin(&TransactionOptions::default()).await.unwrap();
        let record = NewExecutionRecord {
            plan_id: plan.plan_id,
            execution_number: 1,
            amount_in: plan.amount_per_execution,
            amount_out: None,
            price: None,
            ledger_tx_id: None,
            status: ExecutionStatus::Failed,
            error_message: None,
        };
        txn.create_execution_record(record.clone()).await.unwrap();
        let duplicate = txn.create_execution_record(record).await;
        assert!(matches!(duplicate, Err(DcaError::DatabaseError(_))));
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_bumps_attempt_count() {
        let repository = InMemoryPlanRepository::new();
        let plan = repository.create_plan(new_plan(-5)).await.unwrap();

        let mut txn = repository.begin(&TransactionOptions::default()).await.unwrap();
        txn.create_execution_record(NewExecutionRecord {
            plan_id: plan.plan_id,
            execution_number: 1,
            amount_in: plan.amount_per_execution,
            amount_out: None,
            price: None,
            ledger_tx_id: None,
            status: ExecutionStatus::Failed,
            error_message: Some("price unavailable".to_string()),
        })
        .await
        .unwrap();
        txn.commit().await.unwrap();

        let mut txn = repository.begin(&TransactionOptions::default()).await.unwrap();
        let updated = txn
            .update_execution_record(
                plan.plan_id,
                1,
                ExecutionRecordUpdate {
                    amount_out: None,
                    price: None,
                    ledger_tx_id: Some("tx-1".to_string()),
                    status: ExecutionStatus::Success,
                    error_message: None,
                },
            )
            .await
            .unwrap();
        txn.commit().await.unwrap();

        assert_eq!(updated.attempt_count, 2);
        assert_eq!(updated.status, ExecutionStatus::Success);
    }
}
