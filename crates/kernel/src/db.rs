//! Database connection pool management.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::Config;
use crate::datalist::{PgRowSource, RowSource, SqliteRowSource};

/// Connection pool for the configured backend.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Row source executing list queries on this pool.
    pub fn row_source(&self) -> Arc<dyn RowSource> {
        match self {
            DbPool::Postgres(pool) => Arc::new(PgRowSource::new(pool.clone())),
            DbPool::Sqlite(pool) => Arc::new(SqliteRowSource::new(pool.clone())),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            DbPool::Postgres(_) => "postgres",
            DbPool::Sqlite(_) => "sqlite",
        }
    }
}

/// Create a pool, choosing the backend from the URL scheme.
pub async fn create_pool(config: &Config) -> Result<DbPool> {
    if config.database_url.starts_with("sqlite:") {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to SQLite")?;
        return Ok(DbPool::Sqlite(pool));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(DbPool::Postgres(pool))
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &DbPool) -> bool {
    match pool {
        DbPool::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
        DbPool::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
    }
}
