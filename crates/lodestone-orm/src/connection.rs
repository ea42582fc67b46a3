//! Narrow connection wrapper over a SQLite pool.
//!
//! The rest of the crate only sees this surface: execute a statement, fetch
//! rows decoded into [`Row`] maps, introspect a table, begin a transaction.
//! Driver failures surface as opaque `OrmError::Database` values.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use lodestone_sql::SqlValue;

use crate::error::Result;

/// One result row, keyed by the column names the statement produced.
pub type Row = BTreeMap<String, SqlValue>;

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy)]
pub struct ExecResult {
    /// Number of rows the statement affected.
    pub rows_affected: u64,
    /// Rowid generated by the last INSERT, when applicable.
    pub last_insert_rowid: i64,
}

/// Description of one introspected column.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Storage column name.
    pub name: String,
    /// Declared SQL type.
    pub sql_type: String,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

/// A connection to a SQLite database.
///
/// Cheap to clone; all clones share the pool. The statement counter counts
/// every statement issued through this wrapper, which the eager-loading
/// tests rely on.
#[derive(Debug, Clone)]
pub struct Connection {
    pool: SqlitePool,
    statements: Arc<AtomicU64>,
}

impl Connection {
    /// Connects to the given database URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        Ok(Self {
            pool,
            statements: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Opens an in-memory database on a single pooled connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;
        Ok(Self {
            pool,
            statements: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns how many statements have been issued so far.
    #[must_use]
    pub fn statement_count(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    /// Executes a statement and returns the affected-row count and last
    /// insert rowid.
    pub async fn execute(&self, sql: &str) -> Result<ExecResult> {
        debug!(sql = %sql, "executing statement");
        self.statements.fetch_add(1, Ordering::Relaxed);
        let outcome = sqlx::query(sql).execute(&self.pool).await?;
        Ok(ExecResult {
            rows_affected: outcome.rows_affected(),
            last_insert_rowid: outcome.last_insert_rowid(),
        })
    }

    /// Runs a query and decodes every row.
    pub async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql = %sql, "executing query");
        self.statements.fetch_add(1, Ordering::Relaxed);
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    /// Runs a query and decodes at most one row.
    pub async fn fetch_optional(&self, sql: &str) -> Result<Option<Row>> {
        debug!(sql = %sql, "executing query");
        self.statements.fetch_add(1, Ordering::Relaxed);
        let row = sqlx::query(sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode_row).transpose()
    }

    /// Checks the connection is alive.
    pub async fn validate(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Closes the pool.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Begins a transaction.
    pub async fn begin(&self) -> Result<Transaction> {
        let inner = self.pool.begin().await?;
        Ok(Transaction { inner })
    }

    /// Returns the ordered column list of a table.
    pub async fn introspect(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info({table})");
        self.statements.fetch_add(1, Ordering::Relaxed);
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(_cid, name, sql_type, notnull, _default, pk)| ColumnInfo {
                name,
                sql_type,
                nullable: notnull == 0,
                primary_key: pk > 0,
            })
            .collect())
    }
}

/// An open transaction; statements run on the transaction's connection.
pub struct Transaction {
    inner: sqlx::Transaction<'static, sqlx::Sqlite>,
}

impl Transaction {
    /// Executes a statement inside the transaction.
    pub async fn execute(&mut self, sql: &str) -> Result<ExecResult> {
        debug!(sql = %sql, "executing statement in transaction");
        let outcome = sqlx::query(sql).execute(&mut *self.inner).await?;
        Ok(ExecResult {
            rows_affected: outcome.rows_affected(),
            last_insert_rowid: outcome.last_insert_rowid(),
        })
    }

    /// Runs a query inside the transaction and decodes every row.
    pub async fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>> {
        let rows = sqlx::query(sql).fetch_all(&mut *self.inner).await?;
        rows.iter().map(decode_row).collect()
    }

    /// Commits the transaction.
    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await?;
        Ok(())
    }

    /// Rolls the transaction back.
    pub async fn rollback(self) -> Result<()> {
        self.inner.rollback().await?;
        Ok(())
    }
}

/// Decodes a SQLite row by runtime value type.
fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let ordinal = column.ordinal();
        let raw = row.try_get_raw(ordinal)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => SqlValue::Int(row.try_get::<i64, _>(ordinal)?),
                "REAL" => SqlValue::Float(row.try_get::<f64, _>(ordinal)?),
                "BLOB" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(ordinal)?),
                _ => SqlValue::Text(row.try_get::<String, _>(ordinal)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}
