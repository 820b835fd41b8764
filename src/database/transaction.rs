//! Transaction scoping with configurable isolation and timeouts.
//!
//! Execution steps run inside a single serializable transaction bounded by
//! `lock_timeout` (max wait to acquire transaction resources) and
//! `statement_timeout`. Exceeding either aborts the transaction cleanly and
//! leaves the plan due for retry.

use crate::config::TransactionConfig;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options applied to each transaction opened through [`begin_with_options`].
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub isolation: IsolationLevel,
    pub lock_timeout: Duration,
    pub statement_timeout: Duration,
}

impl TransactionOptions {
    pub fn from_config(config: &TransactionConfig) -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            statement_timeout: Duration::from_millis(config.statement_timeout_ms),
        }
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self::from_config(&TransactionConfig::default())
    }
}

/// Begin a transaction with the requested isolation level and timeouts.
///
/// `SET TRANSACTION` / `SET LOCAL` do not accept bind parameters; the
/// interpolated values come from validated numeric config, never user input.
pub async fn begin_with_options(
    pool: &PgPool,
    options: &TransactionOptions,
) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "SET TRANSACTION ISOLATION LEVEL {}",
        options.isolation.as_sql()
    ))
    .execute(&mut *tx)
    .await?;

    sqlx::query(&format!(
        "SET LOCAL lock_timeout = '{}ms'",
        options.lock_timeout.as_millis()
    ))
    .execute(&mut *tx)
    .await?;

    sqlx::query(&format!(
        "SET LOCAL statement_timeout = '{}ms'",
        options.statement_timeout.as_millis()
    ))
    .execute(&mut *tx)
    .await?;

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
    }

    #[test]
    fn test_default_options_are_serializable_with_timeouts() {
        let options = TransactionOptions::default();
        assert_eq!(options.isolation, IsolationLevel::Serializable);
        assert!(options.lock_timeout > Duration::ZERO);
        assert!(options.statement_timeout >= options.lock_timeout);
    }
}
