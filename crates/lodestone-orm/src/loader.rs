//! Association resolution: batched eager loading and the per-instance
//! lazy path.
//!
//! Eager loading runs as a second phase after the owning query: for each
//! eager association, exactly one batched query fetches every related row
//! (`WHERE key IN (...)`, or a single join through the join table for
//! many-to-many), and the results are partitioned back onto their owners
//! by key value. An empty owner set issues no query at all.

use lodestone_sql::{col, qualified_col, Expr, Join, JoinKind, SelectQuery, SqlValue};
use tracing::debug;

use crate::association::{AssociationKind, FetchMode, ResolvedAssociation};
use crate::error::{OrmError, Result};
use crate::instance::Instance;
use crate::model::{values_match, Model, Related};

/// Runs the eager phase over a freshly materialized collection.
pub(crate) async fn eager_load(model: &Model, instances: &mut [Instance]) -> Result<()> {
    let eager: Vec<ResolvedAssociation> = model
        .meta
        .associations
        .iter()
        .filter(|assoc| assoc.def.fetch == FetchMode::Eager)
        .cloned()
        .collect();
    for assoc in &eager {
        load_association(model, assoc, instances).await?;
    }
    Ok(())
}

/// Resolves one association for a whole collection with a single query.
pub(crate) async fn load_association(
    model: &Model,
    assoc: &ResolvedAssociation,
    instances: &mut [Instance],
) -> Result<()> {
    let keys: Vec<Option<Vec<SqlValue>>> = instances
        .iter()
        .map(|instance| owner_key(instance, &assoc.owner_columns))
        .collect();

    let mut distinct: Vec<Vec<SqlValue>> = Vec::new();
    for key in keys.iter().flatten() {
        if !distinct.iter().any(|seen| values_match(seen, key)) {
            distinct.push(key.clone());
        }
    }

    let fetched = if distinct.is_empty() {
        Vec::new()
    } else {
        debug!(
            association = %assoc.def.name,
            owners = distinct.len(),
            "batch-loading association"
        );
        fetch_keyed(model, assoc, &distinct).await?
    };

    for (instance, key) in instances.iter_mut().zip(keys) {
        let matched: Vec<Instance> = match &key {
            Some(key) => fetched
                .iter()
                .filter(|(row_key, _)| values_match(row_key, key))
                .map(|(_, related)| related.clone())
                .collect(),
            None => Vec::new(),
        };
        instance.cache_related(assoc.def.name.clone(), to_related(assoc.def.kind, matched));
    }
    Ok(())
}

/// Resolves one association for a single instance (the lazy path).
pub(crate) async fn load_for_instance(
    model: &Model,
    assoc: &ResolvedAssociation,
    instance: &Instance,
) -> Result<Related> {
    let Some(key) = owner_key(instance, &assoc.owner_columns) else {
        return Ok(to_related(assoc.def.kind, Vec::new()));
    };
    let fetched = fetch_keyed(model, assoc, std::slice::from_ref(&key)).await?;
    let matched = fetched
        .into_iter()
        .filter(|(row_key, _)| values_match(row_key, &key))
        .map(|(_, related)| related)
        .collect();
    Ok(to_related(assoc.def.kind, matched))
}

/// Fetches related instances for the given owner keys in one query,
/// returning each row tagged with the owner key it partitions under.
async fn fetch_keyed(
    model: &Model,
    assoc: &ResolvedAssociation,
    keys: &[Vec<SqlValue>],
) -> Result<Vec<(Vec<SqlValue>, Instance)>> {
    let target = model.sibling(&assoc.target_model)?;

    match assoc.def.kind {
        AssociationKind::ManyToOne
        | AssociationKind::OneToMany
        | AssociationKind::OneToOne => {
            let mut query = SelectQuery::new(target.table());
            if let Some(predicate) = keys_predicate(&assoc.target_columns, None, keys) {
                query.and_filter(predicate);
            }
            if let Some(extra) = &assoc.def.filter {
                query.and_filter(extra.clone());
            }
            let sql = model.compiler().select(&query)?;
            let rows = model.conn().fetch_all(&sql).await?;

            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let related = target.instance_from_row(row);
                let row_key: Vec<SqlValue> = assoc
                    .target_columns
                    .iter()
                    .map(|column| related.get(column).cloned().unwrap_or(SqlValue::Null))
                    .collect();
                out.push((row_key, related));
            }
            Ok(out)
        }
        AssociationKind::ManyToMany => {
            let join_table = assoc.join_table.as_deref().ok_or_else(|| {
                OrmError::Association(format!(
                    "association '{}' has no join table",
                    assoc.def.name
                ))
            })?;

            // Project the target's columns plus the join table's owner-key
            // columns, aliased out so rows can be partitioned back onto
            // owners without a second query.
            let mut query = SelectQuery::new(target.table());
            query.columns = vec![Expr::Wildcard {
                table: Some(target.table().to_string()),
            }];
            for (index, join_column) in assoc.join_owner_columns.iter().enumerate() {
                query.columns.push(
                    qualified_col(join_table, join_column.clone()).alias(owner_alias(index)),
                );
            }

            let mut on: Option<Expr> = None;
            for (target_column, join_column) in
                assoc.target_columns.iter().zip(&assoc.join_target_columns)
            {
                let clause = qualified_col(target.table(), target_column.clone())
                    .eq_expr(qualified_col(join_table, join_column.clone()));
                on = Some(match on {
                    Some(existing) => existing.and(clause),
                    None => clause,
                });
            }
            query.joins.push(Join {
                kind: JoinKind::Inner,
                table: join_table.to_string(),
                on: on.ok_or_else(|| {
                    OrmError::Association(format!(
                        "association '{}' resolves no key columns",
                        assoc.def.name
                    ))
                })?,
            });

            if let Some(predicate) =
                keys_predicate(&assoc.join_owner_columns, Some(join_table), keys)
            {
                query.and_filter(predicate);
            }
            if let Some(extra) = &assoc.def.filter {
                query.and_filter(extra.clone());
            }

            let sql = model.compiler().select(&query)?;
            let rows = model.conn().fetch_all(&sql).await?;

            let mut out = Vec::with_capacity(rows.len());
            for mut row in rows {
                let mut row_key = Vec::with_capacity(assoc.join_owner_columns.len());
                for index in 0..assoc.join_owner_columns.len() {
                    row_key.push(row.remove(&owner_alias(index)).unwrap_or(SqlValue::Null));
                }
                out.push((row_key, target.instance_from_row(row)));
            }
            Ok(out)
        }
    }
}

/// Output alias for the i-th partitioning column of a many-to-many fetch.
fn owner_alias(index: usize) -> String {
    format!("_assoc_owner_{index}")
}

/// Reads an owner's key tuple; `None` when any part is unset or NULL,
/// in which case the association resolves empty without a query.
fn owner_key(instance: &Instance, columns: &[String]) -> Option<Vec<SqlValue>> {
    columns
        .iter()
        .map(|column| {
            instance
                .get(column)
                .filter(|value| !matches!(value, SqlValue::Null))
                .cloned()
        })
        .collect()
}

/// Builds the batched key predicate: a single IN list for one-column keys,
/// an OR of per-tuple conjunctions for composite keys.
fn keys_predicate(
    columns: &[String],
    table: Option<&str>,
    keys: &[Vec<SqlValue>],
) -> Option<Expr> {
    if keys.is_empty() || columns.is_empty() {
        return None;
    }
    let make_col = |name: &str| match table {
        Some(t) => qualified_col(t, name),
        None => col(name),
    };

    if columns.len() == 1 {
        let values: Vec<SqlValue> = keys.iter().map(|key| key[0].clone()).collect();
        return Some(make_col(&columns[0]).in_list(values));
    }

    let mut out: Option<Expr> = None;
    for key in keys {
        let mut conjunction: Option<Expr> = None;
        for (column, value) in columns.iter().zip(key) {
            let clause = make_col(column).eq(value.clone());
            conjunction = Some(match conjunction {
                Some(existing) => existing.and(clause),
                None => clause,
            });
        }
        if let Some(conjunction) = conjunction {
            out = Some(match out {
                Some(existing) => existing.or(conjunction),
                None => conjunction,
            });
        }
    }
    out
}

fn to_related(kind: AssociationKind, mut matched: Vec<Instance>) -> Related {
    match kind {
        AssociationKind::ManyToOne | AssociationKind::OneToOne => Related::One(
            if matched.is_empty() {
                None
            } else {
                Some(Box::new(matched.remove(0)))
            },
        ),
        AssociationKind::OneToMany | AssociationKind::ManyToMany => Related::Many(matched),
    }
}
