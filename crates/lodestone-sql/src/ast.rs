//! Expression AST types.
//!
//! Nodes are immutable trees: composing two nodes consumes and boxes them,
//! never mutating either side.

use crate::value::{SqlValue, ToSqlValue};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Logical
    And,
    Or,

    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Returns the SQL representation of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    /// Returns the precedence of the operator (higher = binds tighter).
    #[must_use]
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => 3,
            Self::Like => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div => 6,
        }
    }
}

/// Sort direction for an ordered expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending order (ASC).
    Asc,
    /// Descending order (DESC).
    Desc,
}

/// An SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(SqlValue),

    /// A column or table identifier (optionally qualified).
    Identifier {
        /// Qualifying table name (optional).
        table: Option<String>,
        /// Column name, in surface form.
        name: String,
    },

    /// A binary expression.
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr>,
    },

    /// Logical NOT.
    Not(Box<Expr>),

    /// A function call.
    Function {
        /// Function name.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
    },

    /// An expression with a sort direction, valid only in ORDER BY.
    Ordered {
        /// The expression to sort by.
        expr: Box<Expr>,
        /// Sort direction.
        direction: Direction,
    },

    /// An expression with an output alias.
    Aliased {
        /// The projected expression.
        expr: Box<Expr>,
        /// Output column name.
        alias: String,
    },

    /// IN list check.
    InList {
        /// The expression to check.
        expr: Box<Expr>,
        /// Candidate values.
        list: Vec<Expr>,
        /// Whether this is NOT IN.
        negated: bool,
    },

    /// IS NULL check.
    IsNull {
        /// The expression to check.
        expr: Box<Expr>,
        /// Whether this is IS NOT NULL.
        negated: bool,
    },

    /// A sub-select.
    Subquery(Box<SelectQuery>),

    /// Wildcard (*) projection.
    Wildcard {
        /// Table qualifier (optional).
        table: Option<String>,
    },
}

/// Creates a column reference.
#[must_use]
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Identifier {
        table: None,
        name: name.into(),
    }
}

/// Creates a qualified column reference.
#[must_use]
pub fn qualified_col(table: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Identifier {
        table: Some(table.into()),
        name: name.into(),
    }
}

/// Creates a literal expression.
#[must_use]
pub fn lit(value: impl ToSqlValue) -> Expr {
    Expr::Literal(value.to_sql_value())
}

/// Creates a function call expression.
#[must_use]
pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
    }
}

impl Expr {
    /// Creates a binary expression.
    #[must_use]
    pub fn binary(self, op: BinaryOp, right: Self) -> Self {
        Self::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an equality expression.
    #[must_use]
    pub fn eq(self, right: impl ToSqlValue) -> Self {
        self.binary(BinaryOp::Eq, Self::Literal(right.to_sql_value()))
    }

    /// Creates an inequality expression.
    #[must_use]
    pub fn not_eq(self, right: impl ToSqlValue) -> Self {
        self.binary(BinaryOp::NotEq, Self::Literal(right.to_sql_value()))
    }

    /// Creates a less-than expression.
    #[must_use]
    pub fn lt(self, right: impl ToSqlValue) -> Self {
        self.binary(BinaryOp::Lt, Self::Literal(right.to_sql_value()))
    }

    /// Creates a less-than-or-equal expression.
    #[must_use]
    pub fn lt_eq(self, right: impl ToSqlValue) -> Self {
        self.binary(BinaryOp::LtEq, Self::Literal(right.to_sql_value()))
    }

    /// Creates a greater-than expression.
    #[must_use]
    pub fn gt(self, right: impl ToSqlValue) -> Self {
        self.binary(BinaryOp::Gt, Self::Literal(right.to_sql_value()))
    }

    /// Creates a greater-than-or-equal expression.
    #[must_use]
    pub fn gt_eq(self, right: impl ToSqlValue) -> Self {
        self.binary(BinaryOp::GtEq, Self::Literal(right.to_sql_value()))
    }

    /// Creates a LIKE expression.
    #[must_use]
    pub fn like(self, pattern: impl Into<String>) -> Self {
        self.binary(BinaryOp::Like, Self::Literal(SqlValue::Text(pattern.into())))
    }

    /// Compares against another expression rather than a literal.
    #[must_use]
    pub fn eq_expr(self, right: Self) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    /// Creates an AND expression.
    #[must_use]
    pub fn and(self, right: Self) -> Self {
        self.binary(BinaryOp::And, right)
    }

    /// Creates an OR expression.
    #[must_use]
    pub fn or(self, right: Self) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    /// Negates this expression with NOT.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Creates an IN expression over literal values.
    #[must_use]
    pub fn in_list<V: ToSqlValue>(self, values: Vec<V>) -> Self {
        Self::InList {
            expr: Box::new(self),
            list: values
                .into_iter()
                .map(|v| Self::Literal(v.to_sql_value()))
                .collect(),
            negated: false,
        }
    }

    /// Creates a NOT IN expression over literal values.
    #[must_use]
    pub fn not_in_list<V: ToSqlValue>(self, values: Vec<V>) -> Self {
        Self::InList {
            expr: Box::new(self),
            list: values
                .into_iter()
                .map(|v| Self::Literal(v.to_sql_value()))
                .collect(),
            negated: true,
        }
    }

    /// Creates an IS NULL expression.
    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// Creates an IS NOT NULL expression.
    #[must_use]
    pub fn is_not_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Marks this expression as ascending for ORDER BY.
    #[must_use]
    pub fn asc(self) -> Self {
        Self::Ordered {
            expr: Box::new(self),
            direction: Direction::Asc,
        }
    }

    /// Marks this expression as descending for ORDER BY.
    #[must_use]
    pub fn desc(self) -> Self {
        Self::Ordered {
            expr: Box::new(self),
            direction: Direction::Desc,
        }
    }

    /// Projects this expression under an output alias.
    #[must_use]
    pub fn alias(self, alias: impl Into<String>) -> Self {
        Self::Aliased {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    /// Builds a conjunction of equality comparisons from column/value pairs.
    ///
    /// Returns `None` for an empty mapping.
    pub fn from_pairs<K, V, I>(pairs: I) -> Option<Self>
    where
        K: Into<String>,
        V: ToSqlValue,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| col(k.into()).eq(v))
            .reduce(Expr::and)
    }

    /// Returns true if the node contains an ASC/DESC marker anywhere,
    /// which makes it invalid as a filter predicate.
    #[must_use]
    pub fn contains_ordering(&self) -> bool {
        match self {
            Self::Ordered { .. } => true,
            Self::Binary { left, right, .. } => {
                left.contains_ordering() || right.contains_ordering()
            }
            Self::Not(inner) => inner.contains_ordering(),
            Self::Aliased { expr, .. } | Self::IsNull { expr, .. } => expr.contains_ordering(),
            Self::InList { expr, list, .. } => {
                expr.contains_ordering() || list.iter().any(Expr::contains_ordering)
            }
            Self::Function { args, .. } => args.iter().any(Expr::contains_ordering),
            _ => false,
        }
    }
}

/// Kind of join clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// INNER JOIN.
    Inner,
    /// LEFT JOIN.
    Left,
}

impl JoinKind {
    /// Returns the SQL keyword for this join kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// One join clause: a table, a predicate and a join kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join kind.
    pub kind: JoinKind,
    /// Joined table.
    pub table: String,
    /// Join predicate.
    pub on: Expr,
}

/// The query options of a SELECT statement.
///
/// A plain value type; chain semantics live in the dataset layer above.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Source table.
    pub table: String,
    /// Projected columns; empty means `*`.
    pub columns: Vec<Expr>,
    /// Joins, in application order.
    pub joins: Vec<Join>,
    /// Filter predicate (conjunction built by the caller).
    pub filter: Option<Expr>,
    /// GROUP BY expressions.
    pub group_by: Vec<Expr>,
    /// HAVING predicate.
    pub having: Option<Expr>,
    /// ORDER BY expressions, in application order.
    pub order: Vec<Expr>,
    /// LIMIT clause.
    pub limit: Option<i64>,
    /// OFFSET clause.
    pub offset: Option<i64>,
    /// Whether to select DISTINCT rows.
    pub distinct: bool,
}

impl SelectQuery {
    /// Creates a query over the given table with default options.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// ANDs a predicate into the existing filter.
    pub fn and_filter(&mut self, predicate: Expr) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }
}
