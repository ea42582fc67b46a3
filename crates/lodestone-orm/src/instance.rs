//! Model instances: value maps with a lifecycle state machine.
//!
//! An instance starts `New`, becomes `Persisted` on save, and ends
//! `Removed` after a delete. `Removed` is terminal: any further mutation
//! or save fails. Saves of persisted instances write only the columns
//! changed since the last save or refresh.

use std::collections::{BTreeMap, BTreeSet};

use lodestone_sql::{col, Expr, SqlValue, ToSqlValue};
use tracing::debug;

use crate::association::{AssociationKind, ResolvedAssociation};
use crate::connection::Row;
use crate::error::{OrmError, Result};
use crate::hooks::HookPoint;
use crate::loader;
use crate::model::{Model, Related};

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Built in memory, not yet inserted.
    New,
    /// Backed by a database row.
    Persisted,
    /// Deleted; terminal.
    Removed,
}

/// One row of a model, addressed by surface column names.
#[derive(Clone)]
pub struct Instance {
    model: Model,
    values: Row,
    state: InstanceState,
    changed: BTreeSet<String>,
    related: BTreeMap<String, Related>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model.name())
            .field("state", &self.state)
            .field("values", &self.values)
            .finish()
    }
}

impl Instance {
    pub(crate) fn empty(model: Model) -> Self {
        Self {
            model,
            values: Row::new(),
            state: InstanceState::New,
            changed: BTreeSet::new(),
            related: BTreeMap::new(),
        }
    }

    pub(crate) fn persisted(model: Model, values: Row) -> Self {
        Self {
            model,
            values,
            state: InstanceState::Persisted,
            changed: BTreeSet::new(),
            related: BTreeMap::new(),
        }
    }

    /// The model this instance belongs to.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// True once the instance is backed by a database row.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.state == InstanceState::Persisted
    }

    /// Reads a column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// All current values, by surface column name.
    #[must_use]
    pub fn values(&self) -> &Row {
        &self.values
    }

    /// Columns changed since the last save or refresh.
    #[must_use]
    pub fn changed(&self) -> &BTreeSet<String> {
        &self.changed
    }

    /// Sets a column value, marking it changed.
    ///
    /// Fails on a removed instance or an unknown column.
    pub fn set(&mut self, column: impl Into<String>, value: impl ToSqlValue) -> Result<()> {
        if self.state == InstanceState::Removed {
            return Err(OrmError::Model(String::from(
                "cannot mutate a removed instance",
            )));
        }
        let column = column.into();
        if self.model.meta.column(&column).is_none() {
            return Err(OrmError::Model(format!(
                "column '{}' not found on table '{}'",
                column,
                self.model.table()
            )));
        }
        self.values.insert(column.clone(), value.to_sql_value());
        self.changed.insert(column);
        Ok(())
    }

    /// Primary-key values, in declared order.
    ///
    /// Fails if any key column is unset.
    pub fn pk_values(&self) -> Result<Vec<SqlValue>> {
        self.model
            .meta
            .pk
            .iter()
            .map(|column| {
                self.values
                    .get(column)
                    .filter(|value| !matches!(value, SqlValue::Null))
                    .cloned()
                    .ok_or_else(|| {
                        OrmError::Model(format!("primary-key column '{column}' is not set"))
                    })
            })
            .collect()
    }

    fn pk_predicate(&self) -> Result<Expr> {
        let keys = self.pk_values()?;
        let mut predicate: Option<Expr> = None;
        for (column, value) in self.model.meta.pk.iter().zip(keys) {
            let clause = col(column.clone()).eq(value);
            predicate = Some(match predicate {
                Some(existing) => existing.and(clause),
                None => clause,
            });
        }
        predicate.ok_or_else(|| {
            OrmError::Model(format!(
                "model '{}' declares no primary key",
                self.model.name()
            ))
        })
    }

    /// Saves the instance: INSERT for new instances (reloading a generated
    /// primary key), UPDATE of changed columns only for persisted ones.
    ///
    /// Pre-save hooks run before any statement; a hook failure leaves the
    /// database and the lifecycle state untouched.
    pub async fn save(&mut self) -> Result<()> {
        if self.state == InstanceState::Removed {
            return Err(OrmError::Model(String::from(
                "cannot save a removed instance",
            )));
        }
        let hooks = self.model.meta.hooks.clone();
        hooks.run(HookPoint::PreSave, self).await?;

        match self.state {
            InstanceState::New => {
                let (columns, values): (Vec<String>, Vec<SqlValue>) = self
                    .values
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .unzip();
                let sql = self
                    .model
                    .compiler()
                    .insert(self.model.table(), &columns, &[values])?;
                let outcome = self.model.conn().execute(&sql).await?;

                if self.model.meta.generates_pk() {
                    let pk = self.model.meta.pk[0].clone();
                    let unset = !matches!(
                        self.values.get(&pk),
                        Some(value) if !matches!(value, SqlValue::Null)
                    );
                    if unset {
                        self.values
                            .insert(pk, SqlValue::Int(outcome.last_insert_rowid));
                    }
                }
                self.state = InstanceState::Persisted;
                self.changed.clear();
                debug!(model = %self.model.name(), "inserted instance");
            }
            InstanceState::Persisted => {
                if !self.changed.is_empty() {
                    let assignments: Vec<(String, SqlValue)> = self
                        .changed
                        .iter()
                        .filter_map(|column| {
                            self.values
                                .get(column)
                                .map(|value| (column.clone(), value.clone()))
                        })
                        .collect();
                    let filter = self.pk_predicate()?;
                    let sql = self.model.compiler().update(
                        self.model.table(),
                        &assignments,
                        Some(&filter),
                    )?;
                    self.model.conn().execute(&sql).await?;
                    self.changed.clear();
                    debug!(
                        model = %self.model.name(),
                        columns = assignments.len(),
                        "updated instance"
                    );
                }
            }
            InstanceState::Removed => unreachable!(),
        }

        hooks.run(HookPoint::PostSave, self).await
    }

    /// Deletes the backing row; the instance becomes terminal.
    pub async fn remove(&mut self) -> Result<()> {
        if self.state != InstanceState::Persisted {
            return Err(OrmError::Model(String::from(
                "only a persisted instance can be removed",
            )));
        }
        let hooks = self.model.meta.hooks.clone();
        hooks.run(HookPoint::PreRemove, self).await?;

        let filter = self.pk_predicate()?;
        let sql = self.model.compiler().delete(self.model.table(), Some(&filter))?;
        self.model.conn().execute(&sql).await?;
        self.state = InstanceState::Removed;
        debug!(model = %self.model.name(), "removed instance");

        hooks.run(HookPoint::PostRemove, self).await
    }

    /// Reloads all columns from the database, discarding unsaved changes
    /// and cached associations.
    pub async fn refresh(&mut self) -> Result<()> {
        if self.state != InstanceState::Persisted {
            return Err(OrmError::Model(String::from(
                "only a persisted instance can be refreshed",
            )));
        }
        let filter = self.pk_predicate()?;
        let refreshed = self.model.query().filter(filter)?.one().await?;
        self.values = refreshed.values;
        self.changed.clear();
        self.related.clear();
        Ok(())
    }

    fn association(&self, name: &str) -> Result<ResolvedAssociation> {
        self.model.meta.association(name).cloned().ok_or_else(|| {
            OrmError::Association(format!(
                "model '{}' has no association '{}'",
                self.model.name(),
                name
            ))
        })
    }

    /// Resolves an association, returning the cached value when present.
    pub async fn related(&mut self, name: &str) -> Result<Related> {
        if let Some(cached) = self.related.get(name) {
            return Ok(cached.clone());
        }
        let assoc = self.association(name)?;
        let value = loader::load_for_instance(&self.model, &assoc, self).await?;
        self.related.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Peeks at a cached association value without touching the database.
    #[must_use]
    pub fn related_cached(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    pub(crate) fn cache_related(&mut self, name: String, value: Related) {
        self.related.insert(name, value);
    }

    /// Links one instance through the named association.
    ///
    /// For associations where the other side carries the key, the other
    /// instance's key columns are written and it is saved; for
    /// many-to-many a join row is inserted; for many-to-one this
    /// instance's own key columns are written and it is saved. The cached
    /// collection reflects the addition without a re-fetch.
    pub async fn add_related(&mut self, name: &str, other: &mut Instance) -> Result<()> {
        let assoc = self.association(name)?;
        match assoc.def.kind {
            AssociationKind::OneToMany | AssociationKind::OneToOne => {
                let keys = self.association_key(&assoc.owner_columns)?;
                for (column, value) in assoc.target_columns.iter().zip(keys) {
                    other.set(column.clone(), value)?;
                }
                other.save().await?;
                match self.related.get_mut(name) {
                    Some(Related::Many(items)) => items.push(other.clone()),
                    Some(slot @ Related::One(_)) => {
                        *slot = Related::One(Some(Box::new(other.clone())));
                    }
                    None => {}
                }
            }
            AssociationKind::ManyToMany => {
                let owner_keys = self.association_key(&assoc.owner_columns)?;
                let other_keys = other.association_key(&assoc.target_columns)?;
                let join_table = assoc.join_table.as_deref().ok_or_else(|| {
                    OrmError::Association(format!("association '{name}' has no join table"))
                })?;
                let columns: Vec<String> = assoc
                    .join_owner_columns
                    .iter()
                    .chain(&assoc.join_target_columns)
                    .cloned()
                    .collect();
                let values: Vec<SqlValue> =
                    owner_keys.into_iter().chain(other_keys).collect();
                let sql = self.model.compiler().insert(join_table, &columns, &[values])?;
                self.model.conn().execute(&sql).await?;
                if let Some(Related::Many(items)) = self.related.get_mut(name) {
                    items.push(other.clone());
                }
            }
            AssociationKind::ManyToOne => {
                let keys = other.association_key(&assoc.target_columns)?;
                for (column, value) in assoc.owner_columns.iter().zip(keys) {
                    self.set(column.clone(), value)?;
                }
                self.save().await?;
                self.related.insert(
                    name.to_string(),
                    Related::One(Some(Box::new(other.clone()))),
                );
            }
        }
        Ok(())
    }

    /// Links each instance in turn; see [`Instance::add_related`].
    pub async fn add_all_related(
        &mut self,
        name: &str,
        others: &mut [Instance],
    ) -> Result<()> {
        for other in others {
            self.add_related(name, other).await?;
        }
        Ok(())
    }

    /// Unlinks one instance from the named association.
    ///
    /// Fails if the two instances are not actually linked, so an unrelated
    /// instance is never detached from its real owner. `destroy`
    /// additionally deletes the other instance's row; otherwise the foreign
    /// key is cleared (or the join row deleted). The cached collection
    /// reflects the removal.
    pub async fn remove_related(
        &mut self,
        name: &str,
        other: &mut Instance,
        destroy: bool,
    ) -> Result<()> {
        let assoc = self.association(name)?;
        match assoc.def.kind {
            AssociationKind::OneToMany | AssociationKind::OneToOne => {
                let keys = self.association_key(&assoc.owner_columns)?;
                require_linked(name, &assoc.target_columns, &keys, other)?;
                if destroy {
                    other.remove().await?;
                } else {
                    for column in &assoc.target_columns {
                        other.set(column.clone(), SqlValue::Null)?;
                    }
                    other.save().await?;
                }
            }
            AssociationKind::ManyToMany => {
                let owner_keys = self.association_key(&assoc.owner_columns)?;
                let other_keys = other.association_key(&assoc.target_columns)?;
                let join_table = assoc.join_table.as_deref().ok_or_else(|| {
                    OrmError::Association(format!("association '{name}' has no join table"))
                })?;
                let mut filter: Option<Expr> = None;
                for (column, value) in assoc
                    .join_owner_columns
                    .iter()
                    .zip(owner_keys)
                    .chain(assoc.join_target_columns.iter().zip(other_keys))
                {
                    let clause = col(column.clone()).eq(value);
                    filter = Some(match filter {
                        Some(existing) => existing.and(clause),
                        None => clause,
                    });
                }
                let sql = self.model.compiler().delete(join_table, filter.as_ref())?;
                self.model.conn().execute(&sql).await?;
                if destroy {
                    other.remove().await?;
                }
            }
            AssociationKind::ManyToOne => {
                let keys = other.association_key(&assoc.target_columns)?;
                require_linked(name, &assoc.owner_columns, &keys, self)?;
                for column in &assoc.owner_columns {
                    self.set(column.clone(), SqlValue::Null)?;
                }
                self.save().await?;
                if destroy {
                    other.remove().await?;
                }
            }
        }
        self.forget_related(name, other);
        Ok(())
    }

    /// Unlinks every related instance in one bulk statement.
    ///
    /// Zero matches is success. The cached collection is dropped rather
    /// than patched; the next getter access re-resolves.
    pub async fn remove_all_related(&mut self, name: &str, destroy: bool) -> Result<()> {
        let assoc = self.association(name)?;
        match assoc.def.kind {
            AssociationKind::OneToMany | AssociationKind::OneToOne => {
                let keys = self.association_key(&assoc.owner_columns)?;
                let filter = key_equals(&assoc.target_columns, keys);
                let target = self.model.sibling(&assoc.target_model)?;
                let sql = if destroy {
                    self.model.compiler().delete(target.table(), filter.as_ref())?
                } else {
                    let assignments: Vec<(String, SqlValue)> = assoc
                        .target_columns
                        .iter()
                        .map(|column| (column.clone(), SqlValue::Null))
                        .collect();
                    self.model
                        .compiler()
                        .update(target.table(), &assignments, filter.as_ref())?
                };
                self.model.conn().execute(&sql).await?;
            }
            AssociationKind::ManyToMany => {
                let keys = self.association_key(&assoc.owner_columns)?;
                let join_table = assoc.join_table.as_deref().ok_or_else(|| {
                    OrmError::Association(format!("association '{name}' has no join table"))
                })?;
                if destroy {
                    // Delete the target rows first, while the join rows
                    // still identify them.
                    let target = self.model.sibling(&assoc.target_model)?;
                    let mut subquery = lodestone_sql::SelectQuery::new(join_table);
                    subquery.columns = assoc
                        .join_target_columns
                        .iter()
                        .map(|column| col(column.clone()))
                        .collect();
                    subquery.filter =
                        key_equals(&assoc.join_owner_columns, keys.clone());
                    let filter = Expr::InList {
                        expr: Box::new(col(assoc.target_columns[0].clone())),
                        list: vec![Expr::Subquery(Box::new(subquery))],
                        negated: false,
                    };
                    let sql = self.model.compiler().delete(target.table(), Some(&filter))?;
                    self.model.conn().execute(&sql).await?;
                }
                let filter = key_equals(&assoc.join_owner_columns, keys);
                let sql = self.model.compiler().delete(join_table, filter.as_ref())?;
                self.model.conn().execute(&sql).await?;
            }
            AssociationKind::ManyToOne => {
                for column in &assoc.owner_columns {
                    self.set(column.clone(), SqlValue::Null)?;
                }
                self.save().await?;
            }
        }
        self.related.remove(name);
        Ok(())
    }

    /// Reads the key tuple for an association side.
    fn association_key(&self, columns: &[String]) -> Result<Vec<SqlValue>> {
        columns
            .iter()
            .map(|column| {
                self.values
                    .get(column)
                    .filter(|value| !matches!(value, SqlValue::Null))
                    .cloned()
                    .ok_or_else(|| {
                        OrmError::Association(format!(
                            "key column '{column}' is not set; save the instance first"
                        ))
                    })
            })
            .collect()
    }

    /// Drops one instance from a cached collection by key comparison.
    fn forget_related(&mut self, name: &str, other: &Instance) {
        let Some(cached) = self.related.get_mut(name) else {
            return;
        };
        match cached {
            Related::One(slot) => *slot = None,
            Related::Many(items) => {
                let other_pk = other.pk_values().ok();
                items.retain(|item| {
                    match (item.pk_values().ok(), &other_pk) {
                        (Some(a), Some(b)) => a != *b,
                        _ => true,
                    }
                });
            }
        }
    }

    /// Merges extra columns into the value map without marking them
    /// changed; used by class-table composition.
    pub(crate) fn merge_values(&mut self, extra: Row) {
        for (column, value) in extra {
            self.values.entry(column).or_insert(value);
        }
    }
}

/// Checks that `holder` carries exactly `keys` in `columns`, i.e. the two
/// sides of the association being mutated are actually linked.
fn require_linked(
    name: &str,
    columns: &[String],
    keys: &[SqlValue],
    holder: &Instance,
) -> Result<()> {
    let linked = columns
        .iter()
        .zip(keys)
        .all(|(column, key)| holder.get(column) == Some(key));
    if linked {
        Ok(())
    } else {
        Err(OrmError::Association(format!(
            "instance is not linked through association '{name}'"
        )))
    }
}

fn key_equals(columns: &[String], keys: Vec<SqlValue>) -> Option<Expr> {
    let mut filter: Option<Expr> = None;
    for (column, value) in columns.iter().zip(keys) {
        let clause = col(column.clone()).eq(value);
        filter = Some(match filter {
            Some(existing) => existing.and(clause),
            None => clause,
        });
    }
    filter
}
