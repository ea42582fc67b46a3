//! # lodestone-orm
//!
//! Datasets, a runtime model registry, instance lifecycle, and association
//! resolution over SQLite.
//!
//! The layering is:
//! - [`Connection`] — a narrow async wrapper over a sqlx SQLite pool;
//! - [`Dataset`] — an immutable, chainable, lazily compiled query;
//! - [`Registry`] / [`Model`] / [`Instance`] — dynamic models introspected
//!   and validated once at sync time, with lifecycle hooks;
//! - associations with batched eager loading (one extra query per
//!   association, regardless of collection size) and cached lazy loading;
//! - [`ClassTable`] — class-table composition over a discriminator column.

pub mod association;
pub mod connection;
pub mod dataset;
pub mod error;
pub mod hierarchy;
pub mod hooks;
pub mod instance;
mod loader;
pub mod model;
pub mod registry;

pub use association::{AssociationDef, AssociationKind, FetchMode, KeySpec};
pub use connection::{ColumnInfo, Connection, ExecResult, Row, Transaction};
pub use dataset::Dataset;
pub use error::{OrmError, Result};
pub use hierarchy::ClassTable;
pub use hooks::{hook, sync_hook, HookFn, Hooks};
pub use instance::{Instance, InstanceState};
pub use model::{Model, ModelQuery, Related};
pub use registry::{ColumnMeta, ModelDef, Registry, RegistryBuilder};
