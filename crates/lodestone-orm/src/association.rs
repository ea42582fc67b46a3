//! Association declarations between models.
//!
//! Declarations are plain data attached to a model definition; key columns
//! default from naming conventions and are resolved and validated once, when
//! the registry syncs. Query time never discovers a bad association.

use lodestone_sql::Expr;

/// The four association shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// This model holds a foreign key to one target row.
    ManyToOne,
    /// The target holds a foreign key back to this model; many target rows.
    OneToMany,
    /// The target holds a foreign key back to this model; at most one row.
    OneToOne,
    /// Rows pair through a join table.
    ManyToMany,
}

/// When the association is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Batched alongside the owning query, one extra query per association.
    Eager,
    /// Resolved on first access, cached per instance.
    #[default]
    Lazy,
}

/// How the key columns joining the two sides are determined.
#[derive(Debug, Clone, Default)]
pub enum KeySpec {
    /// Derive from the one side's model name and primary key
    /// (`company` with pk `id` gives `company_id`).
    #[default]
    Derived,
    /// Explicit single foreign-key column on the many side.
    Column(String),
    /// Explicit composite mapping of owner columns to target columns.
    Composite(Vec<(String, String)>),
}

/// One association declaration on a model.
#[derive(Clone)]
pub struct AssociationDef {
    pub(crate) name: String,
    pub(crate) kind: AssociationKind,
    pub(crate) target: String,
    pub(crate) key: KeySpec,
    pub(crate) fetch: FetchMode,
    pub(crate) filter: Option<Expr>,
    pub(crate) join_table: Option<String>,
}

impl std::fmt::Debug for AssociationDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("fetch", &self.fetch)
            .finish()
    }
}

impl AssociationDef {
    fn new(name: impl Into<String>, kind: AssociationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            key: KeySpec::Derived,
            fetch: FetchMode::Lazy,
            filter: None,
            join_table: None,
        }
    }

    /// Declares a many-to-one association (this model carries the key).
    pub fn many_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::ManyToOne, target)
    }

    /// Declares a one-to-many association (the target carries the key).
    pub fn one_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::OneToMany, target)
    }

    /// Declares a one-to-one association (the target carries the key).
    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::OneToOne, target)
    }

    /// Declares a many-to-many association through a join table.
    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::ManyToMany, target)
    }

    /// Overrides the derived foreign-key column.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.key = KeySpec::Column(column.into());
        self
    }

    /// Overrides the key with an explicit owner-column to target-column
    /// mapping.
    #[must_use]
    pub fn composite(mut self, pairs: Vec<(String, String)>) -> Self {
        self.key = KeySpec::Composite(pairs);
        self
    }

    /// Switches the association to eager loading.
    #[must_use]
    pub fn eager(mut self) -> Self {
        self.fetch = FetchMode::Eager;
        self
    }

    /// Attaches a predicate restricting resolved rows.
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(predicate);
        self
    }

    /// Overrides the derived join table (many-to-many only).
    #[must_use]
    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    /// Association name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Association kind.
    #[must_use]
    pub fn kind(&self) -> AssociationKind {
        self.kind
    }
}

/// A fully resolved association, produced at registry sync.
///
/// `owner_columns` and `target_columns` are parallel surface-name lists;
/// row `i` of one joins row `i` of the other. For many-to-many the join
/// table sits between them with its own parallel column lists.
#[derive(Clone)]
pub(crate) struct ResolvedAssociation {
    pub(crate) def: AssociationDef,
    pub(crate) target_model: String,
    pub(crate) owner_columns: Vec<String>,
    pub(crate) target_columns: Vec<String>,
    pub(crate) join_table: Option<String>,
    pub(crate) join_owner_columns: Vec<String>,
    pub(crate) join_target_columns: Vec<String>,
}

impl std::fmt::Debug for ResolvedAssociation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAssociation")
            .field("name", &self.def.name)
            .field("target_model", &self.target_model)
            .field("owner_columns", &self.owner_columns)
            .field("target_columns", &self.target_columns)
            .field("join_table", &self.join_table)
            .finish()
    }
}

/// Derives the conventional foreign-key column pointing at a model:
/// model name lowercased, underscore, the model's primary-key column.
pub(crate) fn derived_key_column(model_name: &str, pk: &str) -> String {
    format!("{}_{}", model_name.to_lowercase(), pk)
}

/// Derives the conventional join-table name: the two table names sorted
/// and joined with an underscore.
pub(crate) fn derived_join_table(left_table: &str, right_table: &str) -> String {
    let mut names = [left_table, right_table];
    names.sort_unstable();
    format!("{}_{}", names[0], names[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_key_column() {
        assert_eq!(derived_key_column("company", "id"), "company_id");
        assert_eq!(derived_key_column("Company", "id"), "company_id");
    }

    #[test]
    fn test_derived_join_table_is_alphabetical() {
        assert_eq!(derived_join_table("students", "courses"), "courses_students");
        assert_eq!(derived_join_table("courses", "students"), "courses_students");
    }

    #[test]
    fn test_builder_defaults() {
        let def = AssociationDef::many_to_one("company", "company");
        assert_eq!(def.fetch, FetchMode::Lazy);
        assert!(matches!(def.key, KeySpec::Derived));
        assert!(def.join_table.is_none());

        let def = AssociationDef::many_to_many("courses", "course").eager();
        assert_eq!(def.fetch, FetchMode::Eager);
        assert_eq!(def.kind(), AssociationKind::ManyToMany);
    }
}
