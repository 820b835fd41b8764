//! # Execution Layer
//!
//! Atomic, idempotent execution of a single plan step, plus the
//! fixed-point conversion it relies on.

use crate::models::{ExecutionRecord, ExecutionStatus, Plan};
use bigdecimal::BigDecimal;
use serde::Serialize;
use uuid::Uuid;

pub mod conversion;
pub mod engine;

pub use engine::{ExecutionEngine, ExecutionEngineConfig};

/// Short-circuit reasons reported without consuming an execution slot.
pub mod failure_reasons {
    /// Plan was paused or cancelled between scan and execution.
    pub const NOT_ACTIVE: &str = "plan is not active";
    /// Defensive: the scheduler re-surfaced an already-finished plan.
    pub const ALL_EXECUTIONS_COMPLETED: &str = "all executions completed";
    /// Defensive: the plan's next execution is still in the future and no
    /// prior record exists to replay.
    pub const NOT_DUE: &str = "plan is not due";
}

/// Outcome of one `execute_plan` call that got past the per-plan lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub plan_id: Uuid,
    pub execution_number: i32,
    pub status: ExecutionStatus,
    pub amount_in: i64,
    pub amount_out: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    pub ledger_tx_id: Option<String>,
    pub error_message: Option<String>,
    /// True when the outcome was served from an existing record
    /// (idempotent replay of a duplicate tick or crash retry).
    pub replayed: bool,
}

impl ExecutionOutcome {
    pub(crate) fn from_record(record: &ExecutionRecord, replayed: bool) -> Self {
        Self {
            plan_id: record.plan_id,
            execution_number: record.execution_number,
            status: record.status,
            amount_in: record.amount_in,
            amount_out: record.amount_out.clone(),
            price: record.price.clone(),
            ledger_tx_id: record.ledger_tx_id.clone(),
            error_message: record.error_message.clone(),
            replayed,
        }
    }

    /// Observability-only failure: no record written, no slot consumed.
    pub(crate) fn short_circuit(plan: &Plan, reason: &str) -> Self {
        Self {
            plan_id: plan.plan_id,
            execution_number: plan.executions_completed + 1,
            status: ExecutionStatus::Failed,
            amount_in: plan.amount_per_execution,
            amount_out: None,
            price: None,
            ledger_tx_id: None,
            error_message: Some(reason.to_string()),
            replayed: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}
