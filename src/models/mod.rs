//! Data layer: plans and their execution records.

pub mod execution_record;
pub mod plan;

pub use execution_record::{
    ExecutionRecord, ExecutionRecordUpdate, ExecutionStatus, NewExecutionRecord,
};
pub use plan::{NewPlan, Plan, PlanRef, PlanStatus, RecurrenceInterval};
