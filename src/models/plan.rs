//! # Plan Model
//!
//! A plan is a recurring purchase commitment: a fixed deposit amount
//! converted into the target asset once per recurrence interval, a bounded
//! number of times.
//!
//! ## Database Schema
//!
//! Maps to the `dca_plans` table:
//! - `plan_id`: Primary key (UUID)
//! - `amount_per_execution`: smallest-unit integer, never floating point
//! - `executions_completed` / `total_executions`: progress counters
//! - `next_execution_at`: due timestamp driving the scanner predicate
//! - `status`: lifecycle state, terminal states are never deleted
//!
//! ## Invariants
//!
//! - `executions_completed <= total_executions`
//! - `status == Completed` exactly when all executions are done
//! - `next_execution_at` is only meaningful while the plan is `Active`

use crate::error::{DcaError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgExecutor, Row};
use uuid::Uuid;

/// Plan lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Paused,
    Cancelled,
    Completed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Paused => "paused",
            PlanStatus::Cancelled => "cancelled",
            PlanStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(PlanStatus::Active),
            "paused" => Some(PlanStatus::Paused),
            "cancelled" => Some(PlanStatus::Cancelled),
            "completed" => Some(PlanStatus::Completed),
            _ => None,
        }
    }

    /// Terminal states accept no further executions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Cancelled | PlanStatus::Completed)
    }
}

/// Fixed recurrence cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl RecurrenceInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceInterval::Daily => "daily",
            RecurrenceInterval::Weekly => "weekly",
            RecurrenceInterval::Biweekly => "biweekly",
            RecurrenceInterval::Monthly => "monthly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(RecurrenceInterval::Daily),
            "weekly" => Some(RecurrenceInterval::Weekly),
            "biweekly" => Some(RecurrenceInterval::Biweekly),
            "monthly" => Some(RecurrenceInterval::Monthly),
            _ => None,
        }
    }

    /// Fixed duration between executions. Monthly is a flat 30 days.
    pub fn duration(&self) -> Duration {
        match self {
            RecurrenceInterval::Daily => Duration::days(1),
            RecurrenceInterval::Weekly => Duration::days(7),
            RecurrenceInterval::Biweekly => Duration::days(14),
            RecurrenceInterval::Monthly => Duration::days(30),
        }
    }
}

/// A recurring purchase plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: Uuid,
    pub owner_id: Uuid,
    pub deposit_asset: String,
    pub target_asset: String,
    /// Fixed per-execution amount in smallest units of the deposit asset.
    pub amount_per_execution: i64,
    /// Smallest-unit exponent of the deposit asset (6 for a 6-decimal coin).
    pub deposit_scale: i16,
    pub total_executions: i32,
    pub executions_completed: i32,
    pub interval: RecurrenceInterval,
    pub next_execution_at: DateTime<Utc>,
    pub status: PlanStatus,
    pub ledger_account: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Plan {
    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let status = PlanStatus::parse(&status_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".into(),
            source: format!("unknown plan status '{status_raw}'").into(),
        })?;

        let interval_raw: String = row.try_get("recurrence_interval")?;
        let interval =
            RecurrenceInterval::parse(&interval_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "recurrence_interval".into(),
                source: format!("unknown recurrence interval '{interval_raw}'").into(),
            })?;

        Ok(Plan {
            plan_id: row.try_get("plan_id")?,
            owner_id: row.try_get("owner_id")?,
            deposit_asset: row.try_get("deposit_asset")?,
            target_asset: row.try_get("target_asset")?,
            amount_per_execution: row.try_get("amount_per_execution")?,
            deposit_scale: row.try_get("deposit_scale")?,
            total_executions: row.try_get("total_executions")?,
            executions_completed: row.try_get("executions_completed")?,
            interval,
            next_execution_at: row.try_get("next_execution_at")?,
            status,
            ledger_account: row.try_get("ledger_account")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// New plan for creation (without generated fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlan {
    pub owner_id: Uuid,
    pub deposit_asset: String,
    pub target_asset: String,
    pub amount_per_execution: i64,
    pub deposit_scale: i16,
    pub total_executions: i32,
    pub interval: RecurrenceInterval,
    pub next_execution_at: DateTime<Utc>,
    pub ledger_account: Option<String>,
}

impl NewPlan {
    pub fn validate(&self) -> Result<()> {
        if self.amount_per_execution <= 0 {
            return Err(DcaError::ValidationError(
                "amount_per_execution must be positive".to_string(),
            ));
        }
        if self.total_executions <= 0 {
            return Err(DcaError::ValidationError(
                "total_executions must be positive".to_string(),
            ));
        }
        if !(0..=18).contains(&self.deposit_scale) {
            return Err(DcaError::ValidationError(format!(
                "deposit_scale {} out of range 0..=18",
                self.deposit_scale
            )));
        }
        if self.deposit_asset.is_empty() || self.target_asset.is_empty() {
            return Err(DcaError::ValidationError(
                "asset identifiers must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lightweight reference returned by the due-plan scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PlanRef {
    pub plan_id: Uuid,
    pub next_execution_at: DateTime<Utc>,
}

impl Plan {
    /// Due-plan predicate, mirrored by the scanner's SQL.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PlanStatus::Active
            && self.next_execution_at <= now
            && self.executions_completed < self.total_executions
    }

    pub fn remaining_executions(&self) -> i32 {
        self.total_executions - self.executions_completed
    }

    pub async fn create(
        executor: impl PgExecutor<'_>,
        new_plan: &NewPlan,
    ) -> std::result::Result<Plan, sqlx::Error> {
        sqlx::query_as::<_, Plan>(
            r#"
            INSERT INTO dca_plans (
                owner_id, deposit_asset, target_asset, amount_per_execution,
                deposit_scale, total_executions, recurrence_interval,
                next_execution_at, ledger_account
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new_plan.owner_id)
        .bind(&new_plan.deposit_asset)
        .bind(&new_plan.target_asset)
        .bind(new_plan.amount_per_execution)
        .bind(new_plan.deposit_scale)
        .bind(new_plan.total_executions)
        .bind(new_plan.interval.as_str())
        .bind(new_plan.next_execution_at)
        .bind(&new_plan.ledger_account)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        plan_id: Uuid,
    ) -> std::result::Result<Option<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>("SELECT * FROM dca_plans WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_optional(executor)
            .await
    }

    /// Oldest-due-first scan of executable plans, bounded by `limit`.
    pub async fn find_due(
        executor: impl PgExecutor<'_>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> std::result::Result<Vec<PlanRef>, sqlx::Error> {
        sqlx::query_as::<_, PlanRef>(
            r#"
            SELECT plan_id, next_execution_at
            FROM dca_plans
            WHERE status = 'active'
              AND next_execution_at <= $1
              AND executions_completed < total_executions
            ORDER BY next_execution_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// Advance progress counters, due timestamp, and status in one statement.
    pub async fn update_progress(
        executor: impl PgExecutor<'_>,
        plan_id: Uuid,
        executions_completed: i32,
        next_execution_at: DateTime<Utc>,
        status: PlanStatus,
    ) -> std::result::Result<Option<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(
            r#"
            UPDATE dca_plans
            SET executions_completed = $2,
                next_execution_at = $3,
                status = $4,
                updated_at = NOW()
            WHERE plan_id = $1
            RETURNING *
            "#,
        )
        .bind(plan_id)
        .bind(executions_completed)
        .bind(next_execution_at)
        .bind(status.as_str())
        .fetch_optional(executor)
        .await
    }
}
