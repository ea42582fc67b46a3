//! Model handles and instance-producing queries.

use std::sync::Arc;

use lodestone_sql::{Compiler, Expr, SqlValue, ToSqlValue};

use crate::connection::{Connection, Row};
use crate::dataset::Dataset;
use crate::error::{OrmError, Result};
use crate::instance::Instance;
use crate::loader;
use crate::registry::{ColumnMeta, ModelMeta, RegistryInner};

/// A cheap handle to one registered model.
#[derive(Clone)]
pub struct Model {
    pub(crate) inner: Arc<RegistryInner>,
    pub(crate) meta: Arc<ModelMeta>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.meta.name)
            .field("table", &self.meta.table)
            .finish()
    }
}

impl Model {
    pub(crate) fn new(inner: Arc<RegistryInner>, meta: Arc<ModelMeta>) -> Self {
        Self { inner, meta }
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Bound table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.meta.table
    }

    /// Introspected columns, in table order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.meta.columns
    }

    /// Primary-key column names (surface form).
    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.meta.pk
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.inner.conn
    }

    pub(crate) fn compiler(&self) -> &Compiler {
        &self.inner.compiler
    }

    pub(crate) fn sibling(&self, model_name: &str) -> Result<Model> {
        let meta = self
            .inner
            .models
            .get(model_name)
            .cloned()
            .ok_or_else(|| OrmError::Model(format!("model '{model_name}' is not registered")))?;
        Ok(Model::new(self.inner.clone(), meta))
    }

    /// Creates an unsaved instance from column/value pairs.
    ///
    /// Every column name must exist on the table.
    pub fn create<K, V, I>(&self, values: I) -> Result<Instance>
    where
        K: Into<String>,
        V: ToSqlValue,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut instance = Instance::empty(self.clone());
        for (column, value) in values {
            instance.set(column.into(), value)?;
        }
        Ok(instance)
    }

    /// Starts an instance-producing query over this model's table.
    #[must_use]
    pub fn query(&self) -> ModelQuery {
        ModelQuery {
            model: self.clone(),
            dataset: Dataset::new(self.meta.table.clone(), self.inner.compiler.clone()),
        }
    }

    /// Fetches one instance by primary-key value.
    ///
    /// Only models with a single-column primary key can be fetched this
    /// way; use `query()` with an explicit filter otherwise.
    pub async fn get(&self, pk: impl ToSqlValue) -> Result<Instance> {
        if self.meta.pk.len() != 1 {
            return Err(OrmError::Model(format!(
                "model '{}' has a composite primary key",
                self.meta.name
            )));
        }
        self.query()
            .filter_by(vec![(self.meta.pk[0].clone(), pk.to_sql_value())])
            .one()
            .await
    }

    /// Counts all rows of the table.
    pub async fn count(&self) -> Result<i64> {
        self.query().count().await
    }

    /// Converts a fetched storage-named row into a persisted instance.
    pub(crate) fn instance_from_row(&self, row: Row) -> Instance {
        let names = &self.inner.compiler.config().names;
        let values = row
            .into_iter()
            .map(|(storage, value)| (names.to_surface(&storage), value))
            .collect();
        Instance::persisted(self.clone(), values)
    }
}

/// An instance-producing query layered on [`Dataset`].
///
/// Materializing results runs the eager-association phase after the
/// primary fetch: one batched query per eager association.
#[derive(Debug, Clone)]
pub struct ModelQuery {
    model: Model,
    dataset: Dataset,
}

impl ModelQuery {
    /// ANDs a predicate into the filter.
    pub fn filter(mut self, predicate: Expr) -> Result<Self> {
        self.dataset = self.dataset.filter(predicate)?;
        Ok(self)
    }

    /// ANDs a conjunction of equalities built from pairs.
    #[must_use]
    pub fn filter_by<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: ToSqlValue,
        I: IntoIterator<Item = (K, V)>,
    {
        self.dataset = self.dataset.filter_by(pairs);
        self
    }

    /// ANDs the negation of a predicate into the filter.
    pub fn exclude(mut self, predicate: Expr) -> Result<Self> {
        self.dataset = self.dataset.exclude(predicate)?;
        Ok(self)
    }

    /// Appends an ORDER BY expression.
    #[must_use]
    pub fn order(mut self, expr: Expr) -> Self {
        self.dataset = self.dataset.order(expr);
        self
    }

    /// Sets the LIMIT clause.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.dataset = self.dataset.limit(n);
        self
    }

    /// Sets the OFFSET clause.
    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.dataset = self.dataset.offset(n);
        self
    }

    /// Fetches all matching instances, then eagerly loads associations.
    pub async fn all(&self) -> Result<Vec<Instance>> {
        let rows = self.dataset.all(self.model.conn()).await?;
        let mut instances: Vec<Instance> = rows
            .into_iter()
            .map(|row| self.model.instance_from_row(row))
            .collect();
        loader::eager_load(&self.model, &mut instances).await?;
        Ok(instances)
    }

    /// Fetches the first matching instance, if any.
    pub async fn first(&self) -> Result<Option<Instance>> {
        match self.dataset.first(self.model.conn()).await? {
            Some(row) => {
                let mut instance = self.model.instance_from_row(row);
                loader::eager_load(&self.model, std::slice::from_mut(&mut instance)).await?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    /// Fetches exactly one matching instance.
    pub async fn one(&self) -> Result<Instance> {
        let row = self.dataset.one(self.model.conn()).await?;
        let mut instance = self.model.instance_from_row(row);
        loader::eager_load(&self.model, std::slice::from_mut(&mut instance)).await?;
        Ok(instance)
    }

    /// Counts matching rows without materializing instances.
    pub async fn count(&self) -> Result<i64> {
        self.dataset.count(self.model.conn()).await
    }

    /// Returns the SELECT statement this query would run.
    pub fn sql(&self) -> Result<String> {
        self.dataset.sql()
    }
}

/// A resolved association value.
#[derive(Debug, Clone)]
pub enum Related {
    /// To-one result: at most one instance.
    One(Option<Box<Instance>>),
    /// To-many result: zero or more instances.
    Many(Vec<Instance>),
}

impl Related {
    /// Unwraps a to-one result.
    #[must_use]
    pub fn one(self) -> Option<Instance> {
        match self {
            Self::One(inner) => inner.map(|boxed| *boxed),
            Self::Many(mut items) => {
                if items.is_empty() {
                    None
                } else {
                    Some(items.remove(0))
                }
            }
        }
    }

    /// Unwraps a to-many result.
    #[must_use]
    pub fn many(self) -> Vec<Instance> {
        match self {
            Self::Many(items) => items,
            Self::One(inner) => inner.map(|boxed| vec![*boxed]).unwrap_or_default(),
        }
    }

    /// Number of resolved instances.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(inner) => usize::from(inner.is_some()),
            Self::Many(items) => items.len(),
        }
    }

    /// True when nothing resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Positional key-tuple comparison, used to partition batched association
/// rows back onto their owners.
pub(crate) fn values_match(a: &[SqlValue], b: &[SqlValue]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}
