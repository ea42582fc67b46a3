//! The migration runner and its tracking table.
//!
//! The runner validates the whole plan before touching the database:
//! mixed id schemes, duplicate ids, and unknown targets are hard
//! failures with no unit run. Each unit is awaited to definitive
//! completion before the next starts; a failing step halts the run and
//! the tracking table reflects only fully completed units.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::unit::{MigrationUnit, UnitId};

/// Name of the reserved tracking table.
pub const TRACKING_TABLE: &str = "lodestone_migrations";

/// Where a migration run should end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Apply forward or revert backward until this unit is the head.
    Unit(UnitId),
    /// Revert this many applied units from the head.
    Back(usize),
}

/// Applies and reverts migration units against one pool.
pub struct Runner {
    pool: SqlitePool,
    units: Vec<MigrationUnit>,
}

impl Runner {
    /// Creates a runner with an empty plan.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            units: Vec::new(),
        }
    }

    /// Adds a unit to the plan. Order of addition does not matter; the
    /// plan is sorted by id before running.
    pub fn add(&mut self, unit: MigrationUnit) -> &mut Self {
        self.units.push(unit);
        self
    }

    /// Creates the tracking table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {TRACKING_TABLE} (\
             id TEXT PRIMARY KEY, \
             name TEXT NOT NULL, \
             applied_at TEXT NOT NULL)"
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Returns the ids of applied units, in application order.
    pub async fn applied(&self) -> Result<Vec<String>> {
        self.init().await?;
        let rows: Vec<(String,)> =
            sqlx::query_as(&format!("SELECT id FROM {TRACKING_TABLE} ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Validates the plan and returns it sorted ascending by id.
    fn plan(&self) -> Result<Vec<&MigrationUnit>> {
        let mut seq = false;
        let mut stamp = false;
        for unit in &self.units {
            match unit.id {
                UnitId::Seq(_) => seq = true,
                UnitId::Stamp(_) => stamp = true,
            }
        }
        if seq && stamp {
            return Err(MigrateError::MixedOrdering);
        }

        let mut plan: Vec<&MigrationUnit> = self.units.iter().collect();
        plan.sort_by_key(|unit| unit.id);
        for pair in plan.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(MigrateError::DuplicateUnit(pair[0].id));
            }
        }
        Ok(plan)
    }

    /// Runs the plan toward the given target.
    ///
    /// `None` applies every unapplied unit in ascending order.
    /// `Target::Unit(id)` applies forward or reverts backward until `id`
    /// is the newest applied unit. `Target::Back(n)` reverts the `n`
    /// newest applied units.
    pub async fn migrate(&self, target: Option<Target>) -> Result<()> {
        let plan = self.plan()?;
        if let Some(Target::Unit(id)) = target {
            if !plan.iter().any(|unit| unit.id == id) {
                return Err(MigrateError::UnknownTarget(id));
            }
        }
        self.init().await?;

        let applied: HashSet<String> = self.applied().await?.into_iter().collect();

        match target {
            None => {
                for unit in &plan {
                    if applied.contains(&unit.id.key()) {
                        warn!(unit = %unit.id, "already applied, skipping");
                        continue;
                    }
                    self.apply(unit).await?;
                }
            }
            Some(Target::Unit(id)) => {
                let position = plan
                    .iter()
                    .position(|unit| unit.id == id)
                    .ok_or(MigrateError::UnknownTarget(id))?;
                // Revert anything newer than the target, newest first.
                for unit in plan[position + 1..].iter().rev() {
                    if applied.contains(&unit.id.key()) {
                        self.revert(unit).await?;
                    }
                }
                // Then apply anything missing up to and including it.
                for unit in &plan[..=position] {
                    if !applied.contains(&unit.id.key()) {
                        self.apply(unit).await?;
                    }
                }
            }
            Some(Target::Back(n)) => {
                let mut reverted = 0;
                for unit in plan.iter().rev() {
                    if reverted == n {
                        break;
                    }
                    if applied.contains(&unit.id.key()) {
                        self.revert(unit).await?;
                        reverted += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn apply(&self, unit: &MigrationUnit) -> Result<()> {
        info!(unit = %unit.id, name = %unit.name, "applying migration");
        (unit.up)(self.pool.clone())
            .await
            .map_err(|source| MigrateError::UnitFailed {
                id: unit.id,
                name: unit.name.clone(),
                source: Box::new(source),
            })?;

        let sql = format!(
            "INSERT INTO {TRACKING_TABLE} (id, name, applied_at) VALUES (?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(unit.id.key())
            .bind(&unit.name)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revert(&self, unit: &MigrationUnit) -> Result<()> {
        info!(unit = %unit.id, name = %unit.name, "reverting migration");
        let down = unit
            .down
            .as_ref()
            .ok_or(MigrateError::Irreversible(unit.id))?;
        down(self.pool.clone())
            .await
            .map_err(|source| MigrateError::UnitFailed {
                id: unit.id,
                name: unit.name.clone(),
                source: Box::new(source),
            })?;

        let sql = format!("DELETE FROM {TRACKING_TABLE} WHERE id = ?");
        sqlx::query(&sql)
            .bind(unit.id.key())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
