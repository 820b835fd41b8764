//! Schema migrations with concurrency safety.
//!
//! Migration SQL is embedded at compile time and applied under a PostgreSQL
//! advisory lock so concurrently starting instances do not race on DDL. The
//! lock is session-scoped, so the whole run holds a single connection.

use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

// Advisory lock key: stable hash of "dca_schema_migrations".
const MIGRATION_LOCK_KEY: i64 = 7_340_410_227_013_582;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20260801000001_create_dca_plans",
        include_str!("../../migrations/20260801000001_create_dca_plans.sql"),
    ),
    (
        "20260801000002_create_dca_execution_records",
        include_str!("../../migrations/20260801000002_create_dca_execution_records.sql"),
    ),
];

/// Apply all embedded migrations. Idempotent; every statement uses
/// `IF NOT EXISTS` guards, so instances that waited on the lock re-apply
/// harmlessly.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await?;

    let result = apply_all(&mut conn).await;

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await?;

    result
}

async fn apply_all(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    for (name, sql) in MIGRATIONS {
        debug!(migration = name, "applying migration");
        sqlx::raw_sql(sql).execute(&mut *conn).await?;
    }
    info!(count = MIGRATIONS.len(), "schema migrations applied");
    Ok(())
}
