//! Model definitions and the synced registry.
//!
//! Definitions are collected on a [`RegistryBuilder`], then frozen in one
//! async `sync` pass that introspects every table, fixes the surface/storage
//! column mapping, and resolves every association. After sync the registry
//! is immutable; model handles are cheap clones over shared metadata.

use std::collections::BTreeMap;
use std::sync::Arc;

use lodestone_sql::{Compiler, Config};
use tracing::{debug, info};

use crate::association::{
    derived_join_table, derived_key_column, AssociationDef, AssociationKind, KeySpec,
    ResolvedAssociation,
};
use crate::connection::Connection;
use crate::error::{OrmError, Result};
use crate::hooks::{HookFn, Hooks};
use crate::model::Model;

/// A model definition awaiting sync.
#[derive(Clone)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) pk: Vec<String>,
    pub(crate) hooks: Hooks,
    pub(crate) associations: Vec<AssociationDef>,
}

impl ModelDef {
    /// Starts a definition binding a model name to a table.
    ///
    /// The primary key defaults to a single `id` column.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            pk: vec![String::from("id")],
            hooks: Hooks::default(),
            associations: Vec::new(),
        }
    }

    /// Overrides the primary-key column list (surface names).
    #[must_use]
    pub fn primary_key(mut self, columns: Vec<String>) -> Self {
        self.pk = columns;
        self
    }

    /// Appends a pre-save hook.
    #[must_use]
    pub fn pre_save(mut self, hook: HookFn) -> Self {
        self.hooks.pre_save.push(hook);
        self
    }

    /// Appends a post-save hook.
    #[must_use]
    pub fn post_save(mut self, hook: HookFn) -> Self {
        self.hooks.post_save.push(hook);
        self
    }

    /// Appends a pre-remove hook.
    #[must_use]
    pub fn pre_remove(mut self, hook: HookFn) -> Self {
        self.hooks.pre_remove.push(hook);
        self
    }

    /// Appends a post-remove hook.
    #[must_use]
    pub fn post_remove(mut self, hook: HookFn) -> Self {
        self.hooks.post_remove.push(hook);
        self
    }

    /// Attaches an association declaration.
    #[must_use]
    pub fn associate(mut self, def: AssociationDef) -> Self {
        self.associations.push(def);
        self
    }
}

/// One introspected column with its surface/storage name pair.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    /// Name as seen by callers.
    pub surface: String,
    /// Name in the database.
    pub storage: String,
    /// Declared SQL type.
    pub sql_type: String,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

/// Frozen metadata for one model.
pub(crate) struct ModelMeta {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) pk: Vec<String>,
    pub(crate) columns: Vec<ColumnMeta>,
    pub(crate) hooks: Hooks,
    pub(crate) associations: Vec<ResolvedAssociation>,
}

impl ModelMeta {
    pub(crate) fn column(&self, surface: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.surface == surface)
    }

    pub(crate) fn association(&self, name: &str) -> Option<&ResolvedAssociation> {
        self.associations.iter().find(|a| a.def.name == name)
    }

    /// True when the primary key is a single rowid-backed integer column,
    /// in which case saves can reload the generated key.
    pub(crate) fn generates_pk(&self) -> bool {
        if self.pk.len() != 1 {
            return false;
        }
        self.column(&self.pk[0])
            .is_some_and(|c| c.sql_type.eq_ignore_ascii_case("INTEGER") && c.primary_key)
    }
}

/// Collects model definitions before sync.
pub struct RegistryBuilder {
    config: Config,
    defs: Vec<ModelDef>,
}

impl RegistryBuilder {
    /// Starts an empty builder with the given compiler configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            defs: Vec::new(),
        }
    }

    /// Registers a model definition.
    ///
    /// Fails if another definition already claims the same model name or
    /// the same table.
    pub fn define(&mut self, def: ModelDef) -> Result<&mut Self> {
        if self.defs.iter().any(|d| d.name == def.name) {
            return Err(OrmError::Model(format!(
                "model '{}' is already defined",
                def.name
            )));
        }
        if self.defs.iter().any(|d| d.table == def.table) {
            return Err(OrmError::Model(format!(
                "table '{}' is already bound to another model",
                def.table
            )));
        }
        debug!(model = %def.name, table = %def.table, "defining model");
        self.defs.push(def);
        Ok(self)
    }

    /// Introspects every table, resolves every association, and freezes the
    /// registry.
    pub async fn sync(self, conn: Connection) -> Result<Registry> {
        let compiler = Compiler::sqlite(self.config.clone());

        // First pass: introspect tables and fix the column mapping.
        let mut metas: Vec<ModelMeta> = Vec::with_capacity(self.defs.len());
        for def in &self.defs {
            let columns = introspect_columns(&conn, &self.config, &def.table).await?;
            if columns.is_empty() {
                return Err(OrmError::Model(format!(
                    "table '{}' for model '{}' does not exist",
                    def.table, def.name
                )));
            }
            for pk in &def.pk {
                if !columns.iter().any(|c| &c.surface == pk) {
                    return Err(OrmError::Model(format!(
                        "primary-key column '{}' not found on table '{}'",
                        pk, def.table
                    )));
                }
            }
            metas.push(ModelMeta {
                name: def.name.clone(),
                table: def.table.clone(),
                pk: def.pk.clone(),
                columns,
                hooks: def.hooks.clone(),
                associations: Vec::new(),
            });
        }

        // Second pass: resolve associations against the full model set.
        for (index, def) in self.defs.iter().enumerate() {
            let mut resolved = Vec::with_capacity(def.associations.len());
            for assoc in &def.associations {
                if resolved
                    .iter()
                    .any(|r: &ResolvedAssociation| r.def.name == assoc.name)
                {
                    return Err(OrmError::Association(format!(
                        "model '{}' declares association '{}' twice",
                        def.name, assoc.name
                    )));
                }
                resolved.push(resolve_association(&conn, &self.config, &metas, index, assoc).await?);
            }
            metas[index].associations = resolved;
        }

        check_reciprocal_pairs(&metas)?;

        let models = metas
            .into_iter()
            .map(|meta| (meta.name.clone(), Arc::new(meta)))
            .collect::<BTreeMap<_, _>>();
        info!(models = models.len(), "registry synced");

        Ok(Registry {
            inner: Arc::new(RegistryInner {
                conn,
                compiler,
                models,
            }),
        })
    }
}

pub(crate) struct RegistryInner {
    pub(crate) conn: Connection,
    pub(crate) compiler: Compiler,
    pub(crate) models: BTreeMap<String, Arc<ModelMeta>>,
}

/// The synced, immutable model registry.
#[derive(Clone)]
pub struct Registry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl Registry {
    /// Returns a handle to a registered model.
    pub fn model(&self, name: &str) -> Result<Model> {
        let meta = self
            .inner
            .models
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::Model(format!("model '{name}' is not registered")))?;
        Ok(Model::new(self.inner.clone(), meta))
    }

    /// Returns the connection the registry was synced against.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.conn
    }

    /// Returns the compiler used for all model queries.
    #[must_use]
    pub fn compiler(&self) -> &Compiler {
        &self.inner.compiler
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("models", &self.inner.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

async fn introspect_columns(
    conn: &Connection,
    config: &Config,
    table: &str,
) -> Result<Vec<ColumnMeta>> {
    let raw = conn.introspect(table).await?;
    Ok(raw
        .into_iter()
        .map(|c| ColumnMeta {
            surface: config.names.to_surface(&c.name),
            storage: c.name,
            sql_type: c.sql_type,
            nullable: c.nullable,
            primary_key: c.primary_key,
        })
        .collect())
}

fn find_model<'a>(metas: &'a [ModelMeta], name: &str) -> Option<&'a ModelMeta> {
    metas.iter().find(|m| m.name == name)
}

fn require_columns(meta: &ModelMeta, columns: &[String], role: &str) -> Result<()> {
    for column in columns {
        if meta.column(column).is_none() {
            return Err(OrmError::Association(format!(
                "{role} column '{}' not found on table '{}'",
                column, meta.table
            )));
        }
    }
    Ok(())
}

async fn resolve_association(
    conn: &Connection,
    config: &Config,
    metas: &[ModelMeta],
    owner_index: usize,
    def: &AssociationDef,
) -> Result<ResolvedAssociation> {
    let owner = &metas[owner_index];
    let target = find_model(metas, &def.target).ok_or_else(|| {
        OrmError::Association(format!(
            "association '{}' on model '{}' targets unknown model '{}'",
            def.name, owner.name, def.target
        ))
    })?;

    let mut resolved = ResolvedAssociation {
        def: def.clone(),
        target_model: target.name.clone(),
        owner_columns: Vec::new(),
        target_columns: Vec::new(),
        join_table: None,
        join_owner_columns: Vec::new(),
        join_target_columns: Vec::new(),
    };

    match def.kind {
        AssociationKind::ManyToOne => {
            // The owner carries the key.
            match &def.key {
                KeySpec::Derived => {
                    resolved.owner_columns =
                        vec![derived_key_column(&target.name, &target.pk[0])];
                    resolved.target_columns = target.pk.clone();
                }
                KeySpec::Column(column) => {
                    resolved.owner_columns = vec![column.clone()];
                    resolved.target_columns = target.pk.clone();
                }
                KeySpec::Composite(pairs) => {
                    for (local, foreign) in pairs {
                        resolved.owner_columns.push(local.clone());
                        resolved.target_columns.push(foreign.clone());
                    }
                }
            }
            require_columns(owner, &resolved.owner_columns, "foreign-key")?;
            require_columns(target, &resolved.target_columns, "referenced")?;
        }
        AssociationKind::OneToMany | AssociationKind::OneToOne => {
            // The target carries the key pointing back at the owner.
            match &def.key {
                KeySpec::Derived => {
                    resolved.owner_columns = owner.pk.clone();
                    resolved.target_columns =
                        vec![derived_key_column(&owner.name, &owner.pk[0])];
                }
                KeySpec::Column(column) => {
                    resolved.owner_columns = owner.pk.clone();
                    resolved.target_columns = vec![column.clone()];
                }
                KeySpec::Composite(pairs) => {
                    for (local, foreign) in pairs {
                        resolved.owner_columns.push(local.clone());
                        resolved.target_columns.push(foreign.clone());
                    }
                }
            }
            require_columns(owner, &resolved.owner_columns, "referenced")?;
            require_columns(target, &resolved.target_columns, "foreign-key")?;
        }
        AssociationKind::ManyToMany => {
            if !matches!(def.key, KeySpec::Derived) {
                return Err(OrmError::Association(format!(
                    "many-to-many association '{}' cannot use an explicit key; \
                     join-table columns are derived from the model names",
                    def.name
                )));
            }
            let join_table = def
                .join_table
                .clone()
                .unwrap_or_else(|| derived_join_table(&owner.table, &target.table));
            resolved.owner_columns = owner.pk.clone();
            resolved.target_columns = target.pk.clone();
            resolved.join_owner_columns = vec![derived_key_column(&owner.name, &owner.pk[0])];
            resolved.join_target_columns =
                vec![derived_key_column(&target.name, &target.pk[0])];

            let join_columns = introspect_columns(conn, config, &join_table).await?;
            if join_columns.is_empty() {
                return Err(OrmError::Association(format!(
                    "join table '{}' for association '{}' does not exist",
                    join_table, def.name
                )));
            }
            for column in resolved
                .join_owner_columns
                .iter()
                .chain(&resolved.join_target_columns)
            {
                if !join_columns.iter().any(|c| &c.surface == column) {
                    return Err(OrmError::Association(format!(
                        "join-table column '{}' not found on '{}'",
                        column, join_table
                    )));
                }
            }
            resolved.join_table = Some(join_table);
        }
    }

    Ok(resolved)
}

/// Checks that reciprocal many-to-one / one-to-many declarations agree on
/// their key columns.
fn check_reciprocal_pairs(metas: &[ModelMeta]) -> Result<()> {
    for owner in metas {
        for assoc in &owner.associations {
            if assoc.def.kind != AssociationKind::OneToMany {
                continue;
            }
            let Some(target) = find_model(metas, &assoc.target_model) else {
                continue;
            };
            for back in &target.associations {
                if back.def.kind == AssociationKind::ManyToOne
                    && back.target_model == owner.name
                    && (back.owner_columns != assoc.target_columns
                        || back.target_columns != assoc.owner_columns)
                {
                    return Err(OrmError::Association(format!(
                        "associations '{}' on '{}' and '{}' on '{}' disagree on key columns",
                        assoc.def.name, owner.name, back.def.name, target.name
                    )));
                }
            }
        }
    }
    Ok(())
}
