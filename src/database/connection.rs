//! PostgreSQL pool setup and connectivity checks.

use crate::config::DatabaseConfig;
use crate::error::{DcaError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Create a connection pool from configuration.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect(&config.url)
        .await
        .map_err(|e| DcaError::DatabaseError(format!("failed to connect: {e}")))?;

    info!(
        max_connections = config.max_connections,
        "database pool established"
    );
    Ok(pool)
}

/// Verify database connectivity with a lightweight round trip.
pub async fn health_check(pool: &PgPool) -> Result<bool> {
    let value: i32 = sqlx::query_scalar("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(DcaError::from)?;
    Ok(value == 1)
}
