//! # Plan Repository
//!
//! Persistence contract for plans and execution records. The execution
//! engine drives every step through [`PlanTransaction`] so that counter
//! advancement and record writes commit as one atomic unit; the pool-level
//! operations on [`PlanRepository`] are plain reads plus plan creation.

use crate::database::TransactionOptions;
use crate::error::Result;
use crate::models::{
    ExecutionRecord, ExecutionRecordUpdate, NewExecutionRecord, NewPlan, Plan, PlanRef, PlanStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryPlanRepository;
pub use postgres::PgPlanRepository;

/// Patch applied to a plan's progress fields in one atomic statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanProgress {
    pub executions_completed: i32,
    pub next_execution_at: DateTime<Utc>,
    pub status: PlanStatus,
}

/// One open transaction against the plan store.
///
/// Implementations must guarantee that all writes staged through a
/// transaction become visible atomically at `commit`, and that dropping an
/// uncommitted transaction discards them.
#[async_trait]
pub trait PlanTransaction: Send {
    async fn find_plan(&mut self, plan_id: Uuid) -> Result<Option<Plan>>;

    async fn find_execution_record(
        &mut self,
        plan_id: Uuid,
        execution_number: i32,
    ) -> Result<Option<ExecutionRecord>>;

    /// First write to an execution slot. Violating the
    /// `(plan_id, execution_number)` uniqueness is a database error.
    async fn create_execution_record(
        &mut self,
        record: NewExecutionRecord,
    ) -> Result<ExecutionRecord>;

    /// Retry write to an existing (failed) execution slot; bumps the
    /// attempt count.
    async fn update_execution_record(
        &mut self,
        plan_id: Uuid,
        execution_number: i32,
        update: ExecutionRecordUpdate,
    ) -> Result<ExecutionRecord>;

    async fn update_plan_progress(
        &mut self,
        plan_id: Uuid,
        progress: PlanProgress,
    ) -> Result<Plan>;

    async fn commit(self) -> Result<()>
    where
        Self: Sized;

    async fn rollback(self) -> Result<()>
    where
        Self: Sized;
}

/// Store of plans and their execution history.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    type Txn: PlanTransaction;

    /// Open a transaction with the requested isolation and timeout bounds.
    async fn begin(&self, options: &TransactionOptions) -> Result<Self::Txn>;

    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>>;

    async fn create_plan(&self, new_plan: NewPlan) -> Result<Plan>;

    /// Plans satisfying `status == Active AND next_execution_at <= now AND
    /// executions_completed < total_executions`, oldest-due first, bounded
    /// by `limit`. Pure read; takes no locks.
    async fn find_due_plans(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<PlanRef>>;
}
