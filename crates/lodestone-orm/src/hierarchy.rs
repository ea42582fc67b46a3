//! Class-table composition.
//!
//! A concrete row is united from a base table plus zero or more
//! child-table layers, selected by a discriminator column on the base.
//! This is composition over shared keys, not language inheritance: each
//! layer is an ordinary model whose columns are merged into the base
//! instance after a batched fetch.

use lodestone_sql::{Expr, SqlValue, ToSqlValue};
use tracing::debug;

use crate::error::{OrmError, Result};
use crate::instance::Instance;
use crate::model::values_match;
use crate::registry::Registry;

/// One child-table layer, keyed by a discriminator value.
#[derive(Debug, Clone)]
struct Layer {
    discriminator: SqlValue,
    model: String,
    join_column: String,
}

/// A base model composed with per-discriminator child layers.
#[derive(Debug, Clone)]
pub struct ClassTable {
    registry: Registry,
    base: String,
    discriminator: String,
    layers: Vec<Layer>,
}

impl ClassTable {
    /// Starts a composition over a base model and its discriminator
    /// column.
    #[must_use]
    pub fn new(
        registry: Registry,
        base: impl Into<String>,
        discriminator: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            base: base.into(),
            discriminator: discriminator.into(),
            layers: Vec::new(),
        }
    }

    /// Adds a layer: rows whose discriminator equals `value` merge the
    /// columns of `model`, joined through `join_column` on the child
    /// table.
    #[must_use]
    pub fn layer(
        mut self,
        value: impl ToSqlValue,
        model: impl Into<String>,
        join_column: impl Into<String>,
    ) -> Self {
        self.layers.push(Layer {
            discriminator: value.to_sql_value(),
            model: model.into(),
            join_column: join_column.into(),
        });
        self
    }

    /// Loads composed instances: one query for the base rows, then one
    /// batched query per layer actually touched by the result set.
    pub async fn load(&self, filter: Option<Expr>) -> Result<Vec<Instance>> {
        let base = self.registry.model(&self.base)?;
        if base.primary_key().len() != 1 {
            return Err(OrmError::Model(format!(
                "class-table base '{}' must have a single-column primary key",
                self.base
            )));
        }
        let pk = base.primary_key()[0].clone();

        let mut query = base.query();
        if let Some(filter) = filter {
            query = query.filter(filter)?;
        }
        let mut instances = query.all().await?;

        for layer in &self.layers {
            // Keys of the base rows selecting this layer.
            let keys: Vec<SqlValue> = instances
                .iter()
                .filter(|instance| {
                    instance.get(&self.discriminator) == Some(&layer.discriminator)
                })
                .filter_map(|instance| instance.get(&pk).cloned())
                .filter(|value| !matches!(value, SqlValue::Null))
                .collect();
            if keys.is_empty() {
                continue;
            }
            debug!(layer = %layer.model, rows = keys.len(), "merging layer");

            let child = self.registry.model(&layer.model)?;
            let dataset = child
                .query()
                .filter(loader_key_in(&layer.join_column, keys))?;
            let children = dataset.all().await?;

            for instance in &mut instances {
                if instance.get(&self.discriminator) != Some(&layer.discriminator) {
                    continue;
                }
                let Some(key) = instance.get(&pk).cloned() else {
                    continue;
                };
                let matched = children.iter().find(|c| {
                    c.get(&layer.join_column)
                        .is_some_and(|v| values_match(std::slice::from_ref(v), std::slice::from_ref(&key)))
                });
                if let Some(matched) = matched {
                    let mut extra = matched.values().clone();
                    extra.remove(&layer.join_column);
                    instance.merge_values(extra);
                }
            }
        }

        Ok(instances)
    }
}

fn loader_key_in(column: &str, keys: Vec<SqlValue>) -> Expr {
    lodestone_sql::col(column).in_list(keys)
}
