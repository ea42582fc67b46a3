//! Error types for the ORM layer.

use thiserror::Error;

/// ORM-specific errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Expression compilation failure.
    #[error("compile error: {0}")]
    Compile(#[from] lodestone_sql::CompileError),

    /// Invalid predicate construction.
    #[error("expression error: {0}")]
    Expression(#[from] lodestone_sql::ExpressionError),

    /// Invalid dataset configuration.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Model lifecycle or registration violation.
    #[error("model error: {0}")]
    Model(String),

    /// Association declaration or key-resolution failure.
    #[error("association error: {0}")]
    Association(String),

    /// No row found matching the query.
    #[error("object not found")]
    NotFound,

    /// Multiple rows found when exactly one was expected.
    #[error("multiple rows returned when one was expected")]
    MultipleRows,
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;
