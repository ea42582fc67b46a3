//! Compilation of expression trees into dialect-correct SQL text.
//!
//! Compilation is pure: the same tree with the same dialect and config
//! always yields the same string, and nothing is deferred to execution
//! time. Literals are rendered inline with escaping, so the compiled text
//! is the complete statement.

use std::sync::Arc;

use crate::ast::{Expr, Join, SelectQuery};
use crate::dialect::{Dialect, SqliteDialect};
use crate::error::{CompileError, Result};
use crate::ident::{quote_identifier, NameStyle};
use crate::temporal::TemporalFormat;
use crate::value::SqlValue;

/// Immutable compilation configuration.
///
/// Threaded explicitly through compiler and dataset construction; the
/// process-wide default is only `Config::default()` at the composition
/// point, never ambient global state.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Surface/storage identifier transform.
    pub names: NameStyle,
    /// Temporal rendering formats.
    pub temporal: TemporalFormat,
}

/// Compiles AST nodes and query options into SQL strings.
#[derive(Debug, Clone)]
pub struct Compiler {
    dialect: Arc<dyn Dialect>,
    config: Config,
}

impl Compiler {
    /// Creates a compiler for the given dialect and configuration.
    pub fn new(dialect: impl Dialect + 'static, config: Config) -> Self {
        Self {
            dialect: Arc::new(dialect),
            config,
        }
    }

    /// Creates a compiler for the SQLite dialect.
    #[must_use]
    pub fn sqlite(config: Config) -> Self {
        Self::new(SqliteDialect::new(), config)
    }

    /// Returns the compilation configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compiles a single expression node.
    pub fn expr(&self, expr: &Expr) -> Result<String> {
        if matches!(expr, Expr::Ordered { .. }) {
            return Err(CompileError::MisplacedOrdering);
        }
        self.expr_prec(expr, 0)
    }

    /// Renders a literal value with the dialect's escaping rules.
    pub fn literal(&self, value: &SqlValue) -> Result<String> {
        match value {
            SqlValue::Null => Ok(String::from("NULL")),
            SqlValue::Bool(b) => Ok(self.dialect.boolean_literal(*b).to_string()),
            SqlValue::Int(n) => Ok(n.to_string()),
            SqlValue::Float(f) => Ok(format_float(*f)),
            SqlValue::Text(s) => Ok(self.quote_text(s)),
            SqlValue::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                Ok(format!("X'{hex}'"))
            }
            SqlValue::Date(d) => Ok(self.quote_text(&self.config.temporal.date_to_string(*d))),
            SqlValue::Time(t) => Ok(self.quote_text(&self.config.temporal.time_to_string(*t))),
            SqlValue::DateTime(dt) => {
                Ok(self.quote_text(&self.config.temporal.datetime_to_string(*dt)))
            }
            SqlValue::Timestamp(ts) => {
                Ok(self.quote_text(&self.config.temporal.timestamp_to_string(*ts)))
            }
            SqlValue::Year(y) => self.config.temporal.year_to_string(*y),
            SqlValue::List(items) => {
                let rendered: Result<Vec<String>> =
                    items.iter().map(|item| self.literal(item)).collect();
                Ok(format!("({})", rendered?.join(", ")))
            }
        }
    }

    /// Escapes with the dialect's string rules, then wraps in single quotes.
    fn quote_text(&self, s: &str) -> String {
        format!("'{}'", self.dialect.escape_text(s))
    }

    /// Renders an identifier, applying the surface-to-storage transform and
    /// quoting when the storage name is not a plain word.
    #[must_use]
    pub fn identifier(&self, table: Option<&str>, name: &str) -> String {
        let quote = self.dialect.identifier_quote();
        let column = quote_identifier(&self.config.names.to_storage(name), quote);
        match table {
            Some(t) => {
                let table = quote_identifier(&self.config.names.to_storage(t), quote);
                format!("{table}.{column}")
            }
            None => column,
        }
    }

    fn expr_prec(&self, expr: &Expr, parent: u8) -> Result<String> {
        match expr {
            Expr::Literal(value) => self.literal(value),
            Expr::Identifier { table, name } => Ok(self.identifier(table.as_deref(), name)),
            Expr::Binary { left, op, right } => {
                let prec = op.precedence();
                let sql = format!(
                    "{} {} {}",
                    self.expr_prec(left, prec)?,
                    op.as_str(),
                    self.expr_prec(right, prec + 1)?
                );
                if prec < parent {
                    Ok(format!("({sql})"))
                } else {
                    Ok(sql)
                }
            }
            Expr::Not(inner) => Ok(format!("NOT ({})", self.expr_prec(inner, 0)?)),
            Expr::Function { name, args } => {
                if name.is_empty() {
                    return Err(CompileError::EmptyFunction);
                }
                let rendered: Result<Vec<String>> =
                    args.iter().map(|arg| self.expr_prec(arg, 0)).collect();
                Ok(format!("{}({})", name.to_uppercase(), rendered?.join(", ")))
            }
            Expr::Ordered { .. } => Err(CompileError::MisplacedOrdering),
            Expr::Aliased { expr, alias } => {
                let quote = self.dialect.identifier_quote();
                Ok(format!(
                    "{} AS {}",
                    self.expr_prec(expr, 0)?,
                    quote_identifier(alias, quote)
                ))
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                // An empty candidate list matches nothing (or everything,
                // negated) without touching the database.
                if list.is_empty() {
                    return Ok(String::from(if *negated { "1 = 1" } else { "1 = 0" }));
                }
                let rendered: Result<Vec<String>> =
                    list.iter().map(|item| self.expr_prec(item, 0)).collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                Ok(format!(
                    "{} {} ({})",
                    self.expr_prec(expr, u8::MAX)?,
                    keyword,
                    rendered?.join(", ")
                ))
            }
            Expr::IsNull { expr, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                Ok(format!("{} {}", self.expr_prec(expr, u8::MAX)?, keyword))
            }
            Expr::Subquery(query) => Ok(format!("({})", self.select(query)?)),
            Expr::Wildcard { table } => match table {
                Some(t) => {
                    let quote = self.dialect.identifier_quote();
                    Ok(format!(
                        "{}.*",
                        quote_identifier(&self.config.names.to_storage(t), quote)
                    ))
                }
                None => Ok(String::from("*")),
            },
        }
    }

    /// Compiles a full SELECT statement.
    pub fn select(&self, query: &SelectQuery) -> Result<String> {
        if query.table.is_empty() {
            return Err(CompileError::MissingFrom);
        }

        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }

        if query.columns.is_empty() {
            sql.push('*');
        } else {
            let rendered: Result<Vec<String>> = query
                .columns
                .iter()
                .map(|column| self.expr_prec(column, 0))
                .collect();
            sql.push_str(&rendered?.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.identifier(None, &query.table));

        for join in &query.joins {
            sql.push(' ');
            sql.push_str(&self.join_clause(join)?);
        }

        if let Some(ref filter) = query.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter)?);
        }

        if !query.group_by.is_empty() {
            let rendered: Result<Vec<String>> = query
                .group_by
                .iter()
                .map(|column| self.expr_prec(column, 0))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&rendered?.join(", "));
        }

        if let Some(ref having) = query.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.expr(having)?);
        }

        if !query.order.is_empty() {
            let rendered: Result<Vec<String>> = query
                .order
                .iter()
                .map(|item| self.order_item(item))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&rendered?.join(", "));
        }

        match (query.limit, query.offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => {
                // SQLite only accepts OFFSET after a LIMIT clause.
                if self.dialect.requires_limit_for_offset() {
                    sql.push_str(&format!(" LIMIT -1 OFFSET {offset}"));
                } else {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            (None, None) => {}
        }

        Ok(sql)
    }

    fn join_clause(&self, join: &Join) -> Result<String> {
        Ok(format!(
            "{} {} ON {}",
            join.kind.as_str(),
            self.identifier(None, &join.table),
            self.expr(&join.on)?
        ))
    }

    fn order_item(&self, item: &Expr) -> Result<String> {
        match item {
            Expr::Ordered { expr, direction } => {
                let keyword = match direction {
                    crate::ast::Direction::Asc => "ASC",
                    crate::ast::Direction::Desc => "DESC",
                };
                Ok(format!("{} {}", self.expr_prec(expr, 0)?, keyword))
            }
            other => self.expr_prec(other, 0),
        }
    }

    /// Compiles an INSERT statement. With no columns, inserts default values.
    pub fn insert(&self, table: &str, columns: &[String], rows: &[Vec<SqlValue>]) -> Result<String> {
        if table.is_empty() {
            return Err(CompileError::MissingFrom);
        }
        let table = self.identifier(None, table);
        if columns.is_empty() {
            return Ok(format!("INSERT INTO {table} DEFAULT VALUES"));
        }

        let column_list: Vec<String> = columns
            .iter()
            .map(|column| self.identifier(None, column))
            .collect();

        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let rendered: Result<Vec<String>> =
                row.iter().map(|value| self.literal(value)).collect();
            tuples.push(format!("({})", rendered?.join(", ")));
        }

        Ok(format!(
            "INSERT INTO {table} ({}) VALUES {}",
            column_list.join(", "),
            tuples.join(", ")
        ))
    }

    /// Compiles an UPDATE statement over column/value assignments.
    pub fn update(
        &self,
        table: &str,
        assignments: &[(String, SqlValue)],
        filter: Option<&Expr>,
    ) -> Result<String> {
        if table.is_empty() {
            return Err(CompileError::MissingFrom);
        }
        let mut sets = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            sets.push(format!(
                "{} = {}",
                self.identifier(None, column),
                self.literal(value)?
            ));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.identifier(None, table),
            sets.join(", ")
        );
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter)?);
        }
        Ok(sql)
    }

    /// Compiles a DELETE statement.
    pub fn delete(&self, table: &str, filter: Option<&Expr>) -> Result<String> {
        if table.is_empty() {
            return Err(CompileError::MissingFrom);
        }
        let mut sql = format!("DELETE FROM {}", self.identifier(None, table));
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter)?);
        }
        Ok(sql)
    }
}

/// Integral floats render without a decimal point, others with the
/// minimal precision Rust's formatter produces.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        #[allow(clippy::cast_possible_truncation)]
        return format!("{}", f as i64);
    }
    format!("{f}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, func, lit, qualified_col, JoinKind};
    use crate::dialect::GenericDialect;

    fn compiler() -> Compiler {
        Compiler::new(GenericDialect::new(), Config::default())
    }

    #[test]
    fn test_literal_floats() {
        let c = compiler();
        assert_eq!(c.literal(&SqlValue::Float(1.0)).unwrap(), "1");
        assert_eq!(c.literal(&SqlValue::Float(1.01)).unwrap(), "1.01");
        assert_eq!(c.literal(&SqlValue::Float(-2.0)).unwrap(), "-2");
    }

    #[test]
    fn test_literal_null_bool_list() {
        let c = compiler();
        assert_eq!(c.literal(&SqlValue::Null).unwrap(), "NULL");
        assert_eq!(c.literal(&SqlValue::Bool(true)).unwrap(), "'t'");
        assert_eq!(c.literal(&SqlValue::Bool(false)).unwrap(), "'f'");
        let list = SqlValue::List(vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]);
        assert_eq!(c.literal(&list).unwrap(), "(1, 2, 3)");
    }

    #[test]
    fn test_literal_text_escaping() {
        let c = compiler();
        assert_eq!(
            c.literal(&SqlValue::Text(String::from("it's"))).unwrap(),
            "'it''s'"
        );
        assert_eq!(
            c.literal(&SqlValue::Text(String::from("a\\b"))).unwrap(),
            "'a\\\\b'"
        );
    }

    #[test]
    fn test_sqlite_text_keeps_backslashes() {
        let c = Compiler::sqlite(Config::default());
        assert_eq!(
            c.literal(&SqlValue::Text(String::from("a\\b"))).unwrap(),
            "'a\\b'"
        );
        assert_eq!(
            c.literal(&SqlValue::Text(String::from("it's"))).unwrap(),
            "'it''s'"
        );
    }

    #[test]
    fn test_expr_precedence_parentheses() {
        let c = compiler();
        let expr = col("a").eq(1_i64).or(col("b").eq(2_i64)).and(col("c").eq(3_i64));
        assert_eq!(
            c.expr(&expr).unwrap(),
            "(a = 1 OR b = 2) AND c = 3"
        );
    }

    #[test]
    fn test_expr_is_deterministic() {
        let c = compiler();
        let expr = col("age").gt(18_i64).and(col("name").like("a%"));
        assert_eq!(c.expr(&expr).unwrap(), c.expr(&expr).unwrap());
    }

    #[test]
    fn test_mapping_filter_compiles_to_conjunction() {
        let c = compiler();
        let expr = Expr::from_pairs(vec![("age", 30_i64), ("id", 7_i64)]).unwrap();
        assert_eq!(c.expr(&expr).unwrap(), "age = 30 AND id = 7");
    }

    #[test]
    fn test_ordered_rejected_in_predicate() {
        let c = compiler();
        let err = c.expr(&col("name").asc()).unwrap_err();
        assert!(matches!(err, CompileError::MisplacedOrdering));
    }

    #[test]
    fn test_camel_identifier_transform() {
        let c = Compiler::new(
            GenericDialect::new(),
            Config {
                names: NameStyle::camel(),
                temporal: TemporalFormat::default(),
            },
        );
        let expr = qualified_col("companies", "companyId").eq(1_i64);
        assert_eq!(c.expr(&expr).unwrap(), "companies.company_id = 1");
    }

    #[test]
    fn test_select_clause_order() {
        let c = compiler();
        let mut q = SelectQuery::new("users");
        q.columns = vec![col("id"), col("name")];
        q.joins.push(Join {
            kind: JoinKind::Left,
            table: String::from("orders"),
            on: qualified_col("users", "id").eq_expr(qualified_col("orders", "user_id")),
        });
        q.and_filter(col("active").eq(true));
        q.group_by = vec![col("id")];
        q.having = Some(func("count", vec![Expr::Wildcard { table: None }]).gt(1_i64));
        q.order = vec![col("name").desc()];
        q.limit = Some(10);
        q.offset = Some(20);

        assert_eq!(
            c.select(&q).unwrap(),
            "SELECT id, name FROM users \
             LEFT JOIN orders ON users.id = orders.user_id \
             WHERE active = 't' GROUP BY id HAVING COUNT(*) > 1 \
             ORDER BY name DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_subquery_without_table_fails() {
        let c = compiler();
        let expr = Expr::Subquery(Box::new(SelectQuery::new("")));
        assert!(matches!(
            c.expr(&expr).unwrap_err(),
            CompileError::MissingFrom
        ));
    }

    #[test]
    fn test_offset_without_limit_on_sqlite() {
        let c = Compiler::sqlite(Config::default());
        let mut q = SelectQuery::new("users");
        q.offset = Some(5);
        assert_eq!(
            c.select(&q).unwrap(),
            "SELECT * FROM users LIMIT -1 OFFSET 5"
        );
    }

    #[test]
    fn test_in_list() {
        let c = compiler();
        let expr = col("id").in_list(vec![1_i64, 2, 3]);
        assert_eq!(c.expr(&expr).unwrap(), "id IN (1, 2, 3)");

        let empty = col("id").in_list(Vec::<i64>::new());
        assert_eq!(c.expr(&empty).unwrap(), "1 = 0");
    }

    #[test]
    fn test_insert_update_delete() {
        let c = compiler();
        assert_eq!(
            c.insert(
                "users",
                &[String::from("name"), String::from("age")],
                &[vec![SqlValue::Text(String::from("ann")), SqlValue::Int(30)]],
            )
            .unwrap(),
            "INSERT INTO users (name, age) VALUES ('ann', 30)"
        );
        assert_eq!(
            c.update(
                "users",
                &[(String::from("age"), SqlValue::Int(31))],
                Some(&col("id").eq(7_i64)),
            )
            .unwrap(),
            "UPDATE users SET age = 31 WHERE id = 7"
        );
        assert_eq!(
            c.delete("users", Some(&col("id").eq(7_i64))).unwrap(),
            "DELETE FROM users WHERE id = 7"
        );
        assert_eq!(c.insert("logs", &[], &[]).unwrap(), "INSERT INTO logs DEFAULT VALUES");
    }

    #[test]
    fn test_lit_helper() {
        let c = compiler();
        assert_eq!(c.expr(&lit(1.0_f64)).unwrap(), "1");
        assert_eq!(c.expr(&lit(vec![1_i64, 2, 3])).unwrap(), "(1, 2, 3)");
    }
}
