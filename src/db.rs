//! Database module
//!
//! Connection and schema checks for the PostgreSQL store. The schema itself
//! lives in raw SQL files under migrations/.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Tables the PostgreSQL store reads and writes
const REQUIRED_TABLES: &[&str] = &["accounts", "transactions"];

/// Open a connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES.iter().copied() {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // The one-primary rule relies on this index under concurrent writers
    let has_primary_index: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_indexes
            WHERE schemaname = 'public' AND indexname = 'idx_accounts_one_primary'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !has_primary_index {
        tracing::error!("Required index 'idx_accounts_one_primary' does not exist");
        return Ok(false);
    }

    tracing::info!("Database schema verified");
    Ok(true)
}
