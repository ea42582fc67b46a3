//! Lazy, immutable, chainable query datasets.
//!
//! Datasets are immutable — each chain method returns a new Dataset with
//! the modification applied, so a base query can be shared and derived from
//! freely. SQL is compiled on demand, never at chain time, and execution
//! suspends on the [`Connection`](crate::Connection).

use std::fmt;
use std::sync::Arc;

use lodestone_sql::{col, func, Compiler, Expr, ExpressionError, Join, JoinKind, SelectQuery, SqlValue, ToSqlValue};
use tracing::debug;

use crate::connection::{Connection, ExecResult, Row};
use crate::error::{OrmError, Result};

/// Callback applied to each fetched row before it reaches the caller.
pub type RowFn = Arc<dyn Fn(Row) -> Row + Send + Sync>;

/// An immutable, chainable query over one table.
#[derive(Clone)]
pub struct Dataset {
    query: SelectQuery,
    compiler: Compiler,
    row_fn: Option<RowFn>,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("query", &self.query)
            .field("row_fn", &self.row_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Dataset {
    /// Creates a dataset over the given table.
    #[must_use]
    pub fn new(table: impl Into<String>, compiler: Compiler) -> Self {
        Self {
            query: SelectQuery::new(table),
            compiler,
            row_fn: None,
        }
    }

    /// Returns the source table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.query.table
    }

    /// Returns the underlying query options.
    #[must_use]
    pub fn query(&self) -> &SelectQuery {
        &self.query
    }

    /// ANDs a predicate into the filter.
    ///
    /// Fails fast at chain-build time if the expression is not a valid
    /// predicate (for example, it contains an ASC/DESC marker).
    pub fn filter(mut self, predicate: Expr) -> Result<Self> {
        validate_predicate(&predicate)?;
        self.query.and_filter(predicate);
        Ok(self)
    }

    /// ANDs a conjunction of equality comparisons built from pairs.
    #[must_use]
    pub fn filter_by<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: ToSqlValue,
        I: IntoIterator<Item = (K, V)>,
    {
        if let Some(predicate) = Expr::from_pairs(pairs) {
            self.query.and_filter(predicate);
        }
        self
    }

    /// ANDs the negation of a predicate into the filter.
    pub fn exclude(mut self, predicate: Expr) -> Result<Self> {
        validate_predicate(&predicate)?;
        self.query.and_filter(predicate.not());
        Ok(self)
    }

    /// Appends an ORDER BY expression.
    #[must_use]
    pub fn order(mut self, expr: Expr) -> Self {
        self.query.order.push(expr);
        self
    }

    /// Sets the LIMIT clause.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.query.limit = Some(n as i64);
        self
    }

    /// Sets the OFFSET clause.
    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.query.offset = Some(n as i64);
        self
    }

    /// Adds an INNER JOIN.
    pub fn join(mut self, table: impl Into<String>, on: Expr) -> Result<Self> {
        validate_predicate(&on)?;
        self.query.joins.push(Join {
            kind: JoinKind::Inner,
            table: table.into(),
            on,
        });
        Ok(self)
    }

    /// Adds a LEFT JOIN.
    pub fn left_join(mut self, table: impl Into<String>, on: Expr) -> Result<Self> {
        validate_predicate(&on)?;
        self.query.joins.push(Join {
            kind: JoinKind::Left,
            table: table.into(),
            on,
        });
        Ok(self)
    }

    /// Sets the GROUP BY expressions.
    #[must_use]
    pub fn group_by(mut self, columns: Vec<Expr>) -> Self {
        self.query.group_by = columns;
        self
    }

    /// Sets the HAVING predicate.
    pub fn having(mut self, predicate: Expr) -> Result<Self> {
        validate_predicate(&predicate)?;
        self.query.having = Some(predicate);
        Ok(self)
    }

    /// Sets the projected columns.
    #[must_use]
    pub fn select(mut self, columns: Vec<Expr>) -> Self {
        self.query.columns = columns;
        self
    }

    /// Makes the query return distinct rows.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    /// Installs a callback applied to each fetched row.
    #[must_use]
    pub fn with_row_fn(mut self, f: RowFn) -> Self {
        self.row_fn = Some(f);
        self
    }

    /// Compiles and returns the SELECT statement for this dataset.
    pub fn sql(&self) -> Result<String> {
        Ok(self.compiler.select(&self.query)?)
    }

    fn apply_row_fn(&self, row: Row) -> Row {
        match &self.row_fn {
            Some(f) => f(row),
            None => row,
        }
    }

    /// Fetches all matching rows.
    pub async fn all(&self, conn: &Connection) -> Result<Vec<Row>> {
        let sql = self.sql()?;
        let rows = conn.fetch_all(&sql).await?;
        Ok(rows.into_iter().map(|r| self.apply_row_fn(r)).collect())
    }

    /// Fetches the first matching row, if any.
    pub async fn first(&self, conn: &Connection) -> Result<Option<Row>> {
        let limited = self.clone().limit(1);
        let sql = limited.sql()?;
        let row = conn.fetch_optional(&sql).await?;
        Ok(row.map(|r| self.apply_row_fn(r)))
    }

    /// Fetches exactly one matching row.
    ///
    /// Fails with `NotFound` for zero rows and `MultipleRows` for more
    /// than one.
    pub async fn one(&self, conn: &Connection) -> Result<Row> {
        let limited = self.clone().limit(2);
        let sql = limited.sql()?;
        let mut rows = conn.fetch_all(&sql).await?;
        match rows.len() {
            0 => Err(OrmError::NotFound),
            1 => Ok(self.apply_row_fn(rows.remove(0))),
            _ => Err(OrmError::MultipleRows),
        }
    }

    /// Fetches all matching rows and applies `f` to each in order.
    pub async fn for_each<F>(&self, conn: &Connection, mut f: F) -> Result<()>
    where
        F: FnMut(Row),
    {
        for row in self.all(conn).await? {
            f(row);
        }
        Ok(())
    }

    /// Returns the number of matching rows.
    ///
    /// Fails on a grouped dataset, where `COUNT(*)` would count rows per
    /// group instead of matches.
    pub async fn count(&self, conn: &Connection) -> Result<i64> {
        if !self.query.group_by.is_empty() {
            return Err(OrmError::Dataset(String::from(
                "cannot count a grouped dataset",
            )));
        }
        let mut query = self.query.clone();
        query.columns = vec![func("count", vec![Expr::Wildcard { table: None }])];
        query.order.clear();
        query.limit = None;
        query.offset = None;

        let sql = self.compiler.select(&query)?;
        let row = conn
            .fetch_optional(&sql)
            .await?
            .ok_or(OrmError::NotFound)?;
        match row.values().next() {
            Some(SqlValue::Int(n)) => Ok(*n),
            _ => Err(OrmError::Dataset(String::from(
                "count did not return an integer",
            ))),
        }
    }

    /// Deletes all matching rows and returns the deleted-row count.
    ///
    /// Zero matches is success, not an error.
    pub async fn remove(&self, conn: &Connection) -> Result<u64> {
        if !self.query.joins.is_empty() {
            return Err(OrmError::Dataset(String::from(
                "cannot delete from a joined dataset",
            )));
        }
        let sql = self
            .compiler
            .delete(&self.query.table, self.query.filter.as_ref())?;
        debug!(table = %self.query.table, "deleting rows");
        let outcome = conn.execute(&sql).await?;
        Ok(outcome.rows_affected)
    }

    /// Inserts one row from column/value pairs.
    pub async fn insert<K, V, I>(&self, conn: &Connection, pairs: I) -> Result<ExecResult>
    where
        K: Into<String>,
        V: ToSqlValue,
        I: IntoIterator<Item = (K, V)>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_sql_value()))
            .unzip();
        let sql = self
            .compiler
            .insert(&self.query.table, &columns, &[values])?;
        conn.execute(&sql).await
    }

    /// Inserts many rows in one statement.
    pub async fn multi_insert(
        &self,
        conn: &Connection,
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        if rows.iter().any(|row| row.len() != columns.len()) {
            return Err(OrmError::Dataset(String::from(
                "row arity does not match the column list",
            )));
        }
        let sql = self.compiler.insert(&self.query.table, &columns, &rows)?;
        let outcome = conn.execute(&sql).await?;
        Ok(outcome.rows_affected)
    }

    /// Updates all matching rows with the given assignments.
    pub async fn update(
        &self,
        conn: &Connection,
        assignments: Vec<(String, SqlValue)>,
    ) -> Result<u64> {
        if assignments.is_empty() {
            return Err(OrmError::Dataset(String::from(
                "update requires at least one assignment",
            )));
        }
        let sql =
            self.compiler
                .update(&self.query.table, &assignments, self.query.filter.as_ref())?;
        let outcome = conn.execute(&sql).await?;
        Ok(outcome.rows_affected)
    }
}

/// Convenience: an IN-list predicate over a column.
#[must_use]
pub fn key_in(column: &str, values: Vec<SqlValue>) -> Expr {
    col(column).in_list(values)
}

fn validate_predicate(predicate: &Expr) -> std::result::Result<(), ExpressionError> {
    if predicate.contains_ordering() {
        return Err(ExpressionError::InvalidPredicate(String::from(
            "ASC/DESC markers are not valid in a filter predicate",
        )));
    }
    Ok(())
}
