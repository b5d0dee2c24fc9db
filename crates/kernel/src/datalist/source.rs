//! Row sources: execute rendered list statements against a database.
//!
//! The pager and CSV exporter only see the `RowSource` trait; each backend
//! decides how result rows become JSON objects.

use std::pin::Pin;

use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use sqlx::{Column, PgPool, Row as _, SqlitePool, TypeInfo, ValueRef};
use tokio_stream::StreamExt;

use super::query::{SqlDialect, SqlStatement};
use super::types::{ParamValue, Row};

/// Owned stream of result rows.
pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row>> + Send + 'static>>;

/// Executes rendered statements and yields rows as JSON objects.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Dialect statements must be rendered in.
    fn dialect(&self) -> SqlDialect;

    /// Run a count statement. No row counts as zero.
    async fn count(&self, stmt: &SqlStatement) -> Result<u64>;

    /// Run a statement and collect every row.
    async fn fetch(&self, stmt: &SqlStatement) -> Result<Vec<Row>>;

    /// Run a statement and stream its rows without buffering the result.
    fn stream(&self, stmt: SqlStatement) -> RowStream;
}

/// Bind `ParamValue`s onto any sqlx query type, in placeholder order.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                ParamValue::Null => query.bind(Option::<String>::None),
                ParamValue::Bool(b) => query.bind(*b),
                ParamValue::Int(i) => query.bind(*i),
                ParamValue::Float(f) => query.bind(*f),
                ParamValue::Text(s) => query.bind(s.clone()),
            };
        }
        query
    }};
}

fn count_to_u64(count: Option<i64>) -> u64 {
    count.map_or(0, |c| u64::try_from(c).unwrap_or(0))
}

/// PostgreSQL rows, serialized server-side with `row_to_json`.
#[derive(Clone)]
pub struct PgRowSource {
    pool: PgPool,
}

impl PgRowSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn wrap_row_to_json(sql: &str) -> String {
    format!("SELECT row_to_json(t) FROM ({sql}) t")
}

/// A `row_to_json` value is always an object; anything else is a bug upstream.
fn into_row(value: serde_json::Value) -> Result<Row> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object row, got {other}"),
    }
}

fn pg_rows(pool: PgPool, stmt: SqlStatement) -> impl Stream<Item = Result<Row>> + Send + 'static {
    try_stream! {
        let sql = wrap_row_to_json(&stmt.sql);
        let query = bind_values!(sqlx::query_scalar::<_, serde_json::Value>(&sql), &stmt.values);
        let mut rows = query.fetch(&pool);
        while let Some(value) = rows.next().await {
            let value = value.context("failed to read list row")?;
            yield into_row(value)?;
        }
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn count(&self, stmt: &SqlStatement) -> Result<u64> {
        let count: Option<i64> =
            bind_values!(sqlx::query_scalar::<_, i64>(&stmt.sql), &stmt.values)
                .fetch_optional(&self.pool)
                .await
                .context("failed to execute count query")?;
        Ok(count_to_u64(count))
    }

    async fn fetch(&self, stmt: &SqlStatement) -> Result<Vec<Row>> {
        let sql = wrap_row_to_json(&stmt.sql);
        let values: Vec<serde_json::Value> =
            bind_values!(sqlx::query_scalar::<_, serde_json::Value>(&sql), &stmt.values)
                .fetch_all(&self.pool)
                .await
                .context("failed to execute list query")?;
        values.into_iter().map(into_row).collect()
    }

    fn stream(&self, stmt: SqlStatement) -> RowStream {
        Box::pin(pg_rows(self.pool.clone(), stmt))
    }
}

/// SQLite rows, decoded by the storage class of each value.
#[derive(Clone)]
pub struct SqliteRowSource {
    pool: SqlitePool,
}

impl SqliteRowSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Serialize a SQLite row to a JSON object, keeping column order.
fn sqlite_row_to_json(row: &sqlx::sqlite::SqliteRow) -> Row {
    let mut map = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        let type_name = match row.try_get_raw(i) {
            Ok(raw) if raw.is_null() => None,
            Ok(raw) => Some(raw.type_info().name().to_string()),
            Err(_) => None,
        };

        let value = match type_name.as_deref() {
            None => serde_json::Value::Null,
            Some("INTEGER") => row
                .try_get::<i64, _>(i)
                .ok()
                .map(|v| serde_json::Value::Number(v.into()))
                .unwrap_or(serde_json::Value::Null),
            Some("REAL") => row
                .try_get::<f64, _>(i)
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Some("BLOB") => row
                .try_get::<Vec<u8>, _>(i)
                .ok()
                .map(|v| serde_json::Value::String(String::from_utf8_lossy(&v).into_owned()))
                .unwrap_or(serde_json::Value::Null),
            // TEXT and declared affinities all decode as strings
            Some(_) => row
                .try_get::<String, _>(i)
                .ok()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        };
        map.insert(col.name().to_string(), value);
    }
    map
}

fn sqlite_rows(
    pool: SqlitePool,
    stmt: SqlStatement,
) -> impl Stream<Item = Result<Row>> + Send + 'static {
    try_stream! {
        let query = bind_values!(sqlx::query(&stmt.sql), &stmt.values);
        let mut rows = query.fetch(&pool);
        while let Some(row) = rows.next().await {
            let row = row.context("failed to read list row")?;
            yield sqlite_row_to_json(&row);
        }
    }
}

#[async_trait]
impl RowSource for SqliteRowSource {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn count(&self, stmt: &SqlStatement) -> Result<u64> {
        let count: Option<i64> =
            bind_values!(sqlx::query_scalar::<_, i64>(&stmt.sql), &stmt.values)
                .fetch_optional(&self.pool)
                .await
                .context("failed to execute count query")?;
        Ok(count_to_u64(count))
    }

    async fn fetch(&self, stmt: &SqlStatement) -> Result<Vec<Row>> {
        let rows = bind_values!(sqlx::query(&stmt.sql), &stmt.values)
            .fetch_all(&self.pool)
            .await
            .context("failed to execute list query")?;
        Ok(rows.iter().map(sqlite_row_to_json).collect())
    }

    fn stream(&self, stmt: SqlStatement) -> RowStream {
        Box::pin(sqlite_rows(self.pool.clone(), stmt))
    }
}
