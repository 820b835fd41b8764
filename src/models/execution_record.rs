//! # Execution Record Model
//!
//! One attempted or completed execution step of a plan, keyed by
//! `(plan_id, execution_number)`. The unique index on that pair is the
//! idempotency anchor: a successful record makes every re-attempt of the
//! same slot a read, and a failed record is updated in place on retry so
//! the slot never duplicates.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgExecutor, Row};
use uuid::Uuid;

/// Terminal outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(ExecutionStatus::Success),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// Audit-trail row for one execution slot of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub record_id: Uuid,
    pub plan_id: Uuid,
    /// 1-based sequence number within the plan.
    pub execution_number: i32,
    pub amount_in: i64,
    pub amount_out: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    pub ledger_tx_id: Option<String>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
    /// Attempts made on this slot; grows when a failed slot is retried.
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for ExecutionRecord {
    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let status =
            ExecutionStatus::parse(&status_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "status".into(),
                source: format!("unknown execution status '{status_raw}'").into(),
            })?;

        Ok(ExecutionRecord {
            record_id: row.try_get("record_id")?,
            plan_id: row.try_get("plan_id")?,
            execution_number: row.try_get("execution_number")?,
            amount_in: row.try_get("amount_in")?,
            amount_out: row.try_get("amount_out")?,
            price: row.try_get("price")?,
            ledger_tx_id: row.try_get("ledger_tx_id")?,
            status,
            error_message: row.try_get("error_message")?,
            attempt_count: row.try_get("attempt_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// New record for creation (first attempt on a slot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExecutionRecord {
    pub plan_id: Uuid,
    pub execution_number: i32,
    pub amount_in: i64,
    pub amount_out: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    pub ledger_tx_id: Option<String>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
}

/// In-place update applied when a failed slot is retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecordUpdate {
    pub amount_out: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    pub ledger_tx_id: Option<String>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
}

impl From<&NewExecutionRecord> for ExecutionRecordUpdate {
    fn from(record: &NewExecutionRecord) -> Self {
        Self {
            amount_out: record.amount_out.clone(),
            price: record.price.clone(),
            ledger_tx_id: record.ledger_tx_id.clone(),
            status: record.status,
            error_message: record.error_message.clone(),
        }
    }
}

impl ExecutionRecord {
    pub async fn create(
        executor: impl PgExecutor<'_>,
        record: &NewExecutionRecord,
    ) -> std::result::Result<ExecutionRecord, sqlx::Error> {
        sqlx::query_as::<_, ExecutionRecord>(
            r#"
            INSERT INTO dca_execution_records (
                plan_id, execution_number, amount_in, amount_out, price,
                ledger_tx_id, status, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(record.plan_id)
        .bind(record.execution_number)
        .bind(record.amount_in)
        .bind(&record.amount_out)
        .bind(&record.price)
        .bind(&record.ledger_tx_id)
        .bind(record.status.as_str())
        .bind(&record.error_message)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_plan_and_number(
        executor: impl PgExecutor<'_>,
        plan_id: Uuid,
        execution_number: i32,
    ) -> std::result::Result<Option<ExecutionRecord>, sqlx::Error> {
        sqlx::query_as::<_, ExecutionRecord>(
            "SELECT * FROM dca_execution_records WHERE plan_id = $1 AND execution_number = $2",
        )
        .bind(plan_id)
        .bind(execution_number)
        .fetch_optional(executor)
        .await
    }

    /// Overwrite a retried slot's outcome and bump its attempt count.
    pub async fn update_outcome(
        executor: impl PgExecutor<'_>,
        plan_id: Uuid,
        execution_number: i32,
        update: &ExecutionRecordUpdate,
    ) -> std::result::Result<Option<ExecutionRecord>, sqlx::Error> {
        sqlx::query_as::<_, ExecutionRecord>(
            r#"
            UPDATE dca_execution_records
            SET amount_out = $3,
                price = $4,
                ledger_tx_id = $5,
                status = $6,
                error_message = $7,
                attempt_count = attempt_count + 1,
                updated_at = NOW()
            WHERE plan_id = $1 AND execution_number = $2
            RETURNING *
            "#,
        )
        .bind(plan_id)
        .bind(execution_number)
        .bind(&update.amount_out)
        .bind(&update.price)
        .bind(&update.ledger_tx_id)
        .bind(update.status.as_str())
        .bind(&update.error_message)
        .fetch_optional(executor)
        .await
    }
}
