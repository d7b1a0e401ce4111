//! Driver session seam
//!
//! The executor talks to the database exclusively through the [`SqlSession`]
//! trait so that transaction orchestration can be exercised without a live
//! server. [`PgSession`] is the production implementation over a pooled
//! PostgreSQL connection.

use crate::classify::classify;
use crate::errors::CarehausError;
use crate::value::{SqlRow, SqlValue};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, Executor, Postgres, Row, TypeInfo};
use uuid::Uuid;

/// One physical database session
///
/// Implementations must serialize statements; the handle layer guarantees a
/// single caller at a time by holding the session behind an async mutex.
#[async_trait]
pub trait SqlSession: Send {
    /// Run one or more parameterless statements outside the prepared-statement
    /// path. Used for transaction control (`BEGIN`, `SAVEPOINT ...`, `COMMIT`).
    async fn batch(&mut self, sql: &str) -> Result<(), CarehausError>;

    /// Run a parameterized statement and return the affected row count
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, CarehausError>;

    /// Run a parameterized statement and return the decoded result rows
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, CarehausError>;
}

/// Production session over a pooled PostgreSQL connection
pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

impl PgSession {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SqlSession for PgSession {
    async fn batch(&mut self, sql: &str) -> Result<(), CarehausError> {
        run_batch(&mut self.conn, sql)
            .await
            .map_err(|e| classify(sql, e))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, CarehausError> {
        let query = bind_params(sqlx::query(sql), params);
        query
            .execute(&mut *self.conn)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| classify(sql, e))
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, CarehausError> {
        let query = bind_params(sqlx::query(sql), params);
        let rows = query
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| classify(sql, e))?;
        rows.iter().map(decode_row).collect()
    }
}

async fn run_batch(conn: &mut PoolConnection<Postgres>, sql: &str) -> Result<(), sqlx::Error> {
    let conn: &mut sqlx::PgConnection = conn;
    let mut stream = conn.fetch_many(sqlx::raw_sql(sql));
    while stream.try_next().await?.is_some() {}
    Ok(())
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::BigInt(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Boolean(v) => query.bind(*v),
            SqlValue::Uuid(v) => query.bind(*v),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.clone()),
            SqlValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<SqlRow, CarehausError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for column in row.columns() {
        let idx = column.ordinal();
        let decoded = match column.type_info().name() {
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map(SqlValue::Text)),
            "UUID" => row
                .try_get::<Option<Uuid>, _>(idx)
                .map(|v| v.map(SqlValue::Uuid)),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .map(|v| v.map(|n| SqlValue::Integer(i32::from(n)))),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .map(|v| v.map(SqlValue::Integer)),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| v.map(SqlValue::BigInt)),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .map(|v| v.map(|n| SqlValue::Float(f64::from(n)))),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)
                .map(|v| v.map(SqlValue::Float)),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map(SqlValue::Boolean)),
            "JSON" | "JSONB" => row
                .try_get::<Option<serde_json::Value>, _>(idx)
                .map(|v| v.map(SqlValue::Json)),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map(|v| v.map(SqlValue::Timestamp)),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .map(|v| v.map(|n| SqlValue::Timestamp(n.and_utc()))),
            other => {
                return Err(CarehausError::internal(format!(
                    "unsupported column type '{}' for column '{}'",
                    other,
                    column.name()
                )))
            }
        }
        .map_err(|e| {
            CarehausError::internal(format!("failed to decode column '{}': {}", column.name(), e))
        })?;

        columns.push(column.name().to_string());
        values.push(decoded.unwrap_or(SqlValue::Null));
    }

    Ok(SqlRow::new(columns, values))
}
