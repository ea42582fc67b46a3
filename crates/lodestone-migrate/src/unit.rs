//! Migration units.
//!
//! A unit carries an id, a name, and `up`/`down` steps. Steps are stored
//! as one uniform boxed-future shape, so synchronous work, async work,
//! and plain SQL strings all normalize at the boundary.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::sqlite::SqlitePool;

use crate::error::Result;

/// A migration unit id: sequential integers or timestamps.
///
/// A single plan must use one scheme throughout; the runner rejects a mix
/// before running anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitId {
    /// Sequential id, applied in numeric order.
    Seq(u32),
    /// Timestamp id, applied in chronological order.
    Stamp(i64),
}

impl UnitId {
    /// Stable key used in the tracking table.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Seq(n) => format!("seq:{n:010}"),
            Self::Stamp(s) => format!("stamp:{s:020}"),
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seq(n) => write!(f, "{n}"),
            Self::Stamp(s) => write!(f, "{s}"),
        }
    }
}

/// A stored migration step.
pub type StepFn = Arc<dyn Fn(SqlitePool) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One migration unit.
#[derive(Clone)]
pub struct MigrationUnit {
    pub(crate) id: UnitId,
    pub(crate) name: String,
    pub(crate) up: StepFn,
    pub(crate) down: Option<StepFn>,
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("reversible", &self.down.is_some())
            .finish()
    }
}

impl MigrationUnit {
    /// Creates a unit with a no-op up step; attach steps with the builder
    /// methods.
    pub fn new(id: UnitId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            up: Arc::new(|_pool| -> BoxFuture<'static, Result<()>> {
                Box::pin(async { Ok(()) })
            }),
            down: None,
        }
    }

    /// Unit id.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the up step from a future-returning callback.
    #[must_use]
    pub fn up<F>(mut self, step: F) -> Self
    where
        F: Fn(SqlitePool) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.up = Arc::new(step);
        self
    }

    /// Sets the down step from a future-returning callback.
    #[must_use]
    pub fn down<F>(mut self, step: F) -> Self
    where
        F: Fn(SqlitePool) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.down = Some(Arc::new(step));
        self
    }

    /// Sets the up step to a single SQL statement.
    #[must_use]
    pub fn up_sql(self, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        self.up(move |pool| {
            let sql = sql.clone();
            Box::pin(async move {
                sqlx::query(&sql).execute(&pool).await?;
                Ok(())
            })
        })
    }

    /// Sets the down step to a single SQL statement.
    #[must_use]
    pub fn down_sql(self, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        self.down(move |pool| {
            let sql = sql.clone();
            Box::pin(async move {
                sqlx::query(&sql).execute(&pool).await?;
                Ok(())
            })
        })
    }
}
