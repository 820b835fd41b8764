//! PostgreSQL-backed plan repository.
//!
//! Transactions run at serializable isolation with `lock_timeout` and
//! `statement_timeout` applied, so a wedged execution aborts cleanly and
//! the plan stays due for the next tick.

use crate::database::{begin_with_options, TransactionOptions};
use crate::error::{DcaError, Result};
use crate::models::{
    ExecutionRecord, ExecutionRecordUpdate, NewExecutionRecord, NewPlan, Plan, PlanRef,
};
use crate::repository::{PlanProgress, PlanRepository, PlanTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgPlanRepository {
    pool: PgPool,
}

impl PgPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgPlanTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PlanTransaction for PgPlanTransaction {
    async fn find_plan(&mut self, plan_id: Uuid) -> Result<Option<Plan>> {
        Plan::find_by_id(&mut *self.tx, plan_id)
            .await
            .map_err(DcaError::from)
    }

    async fn find_execution_record(
        &mut self,
        plan_id: Uuid,
        execution_number: i32,
    ) -> Result<Option<ExecutionRecord>> {
        ExecutionRecord::find_by_plan_and_number(&mut *self.tx, plan_id, execution_number)
            .await
            .map_err(DcaError::from)
    }

    async fn create_execution_record(
        &mut self,
        record: NewExecutionRecord,
    ) -> Result<ExecutionRecord> {
        ExecutionRecord::create(&mut *self.tx, &record)
            .await
            .map_err(DcaError::from)
    }

    async fn update_execution_record(
        &mut self,
        plan_id: Uuid,
        execution_number: i32,
        update: ExecutionRecordUpdate,
    ) -> Result<ExecutionRecord> {
        ExecutionRecord::update_outcome(&mut *self.tx, plan_id, execution_number, &update)
            .await
            .map_err(DcaError::from)?
            .ok_or_else(|| {
                DcaError::DatabaseError(format!(
                    "execution record ({plan_id}, {execution_number}) vanished during update"
                ))
            })
    }

    async fn update_plan_progress(
        &mut self,
        plan_id: Uuid,
        progress: PlanProgress,
    ) -> Result<Plan> {
        Plan::update_progress(
            &mut *self.tx,
            plan_id,
            progress.executions_completed,
            progress.next_execution_at,
            progress.status,
        )
        .await
        .map_err(DcaError::from)?
        .ok_or(DcaError::PlanNotFound(plan_id))
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(DcaError::from)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(DcaError::from)
    }
}

#[async_trait]
impl PlanRepository for PgPlanRepository {
    type Txn = PgPlanTransaction;

    async fn begin(&self, options: &TransactionOptions) -> Result<Self::Txn> {
        let tx = begin_with_options(&self.pool, options)
            .await
            .map_err(DcaError::from)?;
        Ok(PgPlanTransaction { tx })
    }

    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>> {
        Plan::find_by_id(&self.pool, plan_id)
            .await
            .map_err(DcaError::from)
    }

    async fn create_plan(&self, new_plan: NewPlan) -> Result<Plan> {
        new_plan.validate()?;
        Plan::create(&self.pool, &new_plan)
            .await
            .map_err(DcaError::from)
    }

    async fn find_due_plans(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<PlanRef>> {
        Plan::find_due(&self.pool, now, limit)
            .await
            .map_err(DcaError::from)
    }
}
