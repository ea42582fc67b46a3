//! Error types for expression construction and compilation.

use thiserror::Error;

/// Errors raised while compiling an expression tree to SQL.
///
/// Compilation is pure and synchronous; these errors never surface
/// mid-execution.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A sub-select has no source table.
    #[error("subquery has no source table")]
    MissingFrom,

    /// A function call node has an empty function name.
    #[error("function call has no name")]
    EmptyFunction,

    /// An ASC/DESC node appeared outside an ORDER BY clause.
    #[error("ordering expression is only valid in an ORDER BY clause")]
    MisplacedOrdering,

    /// A temporal value could not be rendered with the configured format.
    #[error("temporal value out of range: {0}")]
    Temporal(String),
}

/// Errors raised while constructing a predicate or converting values.
///
/// These fail fast at chain-build time, before any SQL is compiled.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// A string could not be parsed back with the configured format.
    #[error("cannot parse '{value}' with temporal format '{format}'")]
    InvalidTemporal {
        /// The input string.
        value: String,
        /// The format it was parsed with.
        format: String,
    },

    /// An expression of the wrong shape was used as a filter predicate.
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),
}

/// Result type alias for compilation.
pub type Result<T, E = CompileError> = std::result::Result<T, E>;
