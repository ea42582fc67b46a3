//! Error types for the migration engine.

use thiserror::Error;

use crate::unit::UnitId;

/// Migration errors.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The plan mixes sequential and timestamp unit ids.
    #[error("migration plan mixes sequential and timestamp unit ids")]
    MixedOrdering,

    /// Two units share an id.
    #[error("duplicate migration unit id {0}")]
    DuplicateUnit(UnitId),

    /// The requested target is not in the plan.
    #[error("unknown migration target {0}")]
    UnknownTarget(UnitId),

    /// A unit's step failed; nothing after it ran.
    #[error("migration unit {id} ('{name}') failed: {source}")]
    UnitFailed {
        /// Id of the failing unit.
        id: UnitId,
        /// Name of the failing unit.
        name: String,
        /// The underlying failure.
        #[source]
        source: Box<MigrateError>,
    },

    /// A revert was requested for a unit without a down step.
    #[error("migration unit {0} has no down step")]
    Irreversible(UnitId),
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
