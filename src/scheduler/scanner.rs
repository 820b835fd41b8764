//! # Due-Plan Scanner
//!
//! Bounded, ordered read of plans whose next execution has come due.
//! Selection predicate: `status == Active AND next_execution_at <= now AND
//! executions_completed < total_executions`. Oldest-due first, so a
//! backlog drains fairly instead of starving old plans. Pure read; takes
//! no locks.

use crate::error::Result;
use crate::models::PlanRef;
use crate::repository::PlanRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DuePlanScanner<R: PlanRepository> {
    repository: Arc<R>,
    batch_limit: i64,
}

impl<R: PlanRepository> DuePlanScanner<R> {
    pub fn new(repository: Arc<R>, batch_limit: i64) -> Self {
        Self {
            repository,
            batch_limit,
        }
    }

    pub async fn due_plans(&self, now: DateTime<Utc>) -> Result<Vec<PlanRef>> {
        let due = self.repository.find_due_plans(now, self.batch_limit).await?;
        debug!(count = due.len(), limit = self.batch_limit, "due-plan scan");
        Ok(due)
    }
}
