//! # lodestone-sql
//!
//! Typed SQL expression trees and a dialect-aware compiler.
//!
//! This crate provides:
//! - An immutable expression AST with consuming builder methods
//! - A pure compiler from trees to dialect-correct SQL text
//! - Invertible surface/storage identifier transforms
//! - Configurable temporal literal formats with exact-inverse parsing
//!
//! ## Building expressions
//!
//! ```rust
//! use lodestone_sql::{col, Compiler, Config};
//!
//! let compiler = Compiler::sqlite(Config::default());
//! let predicate = col("age").gt(18_i64).and(col("status").eq("active"));
//! let sql = compiler.expr(&predicate).unwrap();
//! assert_eq!(sql, "age > 18 AND status = 'active'");
//! ```
//!
//! ## Literal rendering rules
//!
//! Strings escape by doubling quotes and backslashes; integral floats drop
//! the decimal point; booleans render as `'t'`/`'f'` unless the dialect
//! overrides; lists render as parenthesized comma-joined literals.

pub mod ast;
pub mod compile;
pub mod dialect;
pub mod error;
pub mod ident;
pub mod temporal;
pub mod value;

pub use ast::{col, func, lit, qualified_col, BinaryOp, Direction, Expr, Join, JoinKind, SelectQuery};
pub use compile::{Compiler, Config};
pub use dialect::{Dialect, GenericDialect, SqliteDialect};
pub use error::{CompileError, ExpressionError};
pub use ident::{NameFn, NameStyle};
pub use temporal::TemporalFormat;
pub use value::{SqlValue, ToSqlValue};
