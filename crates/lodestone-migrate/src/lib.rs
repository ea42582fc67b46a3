//! # lodestone-migrate
//!
//! Ordered migration units and a tracked runner.
//!
//! Units are identified by sequential integers or timestamps (one scheme
//! per plan), carry uniform boxed-future `up`/`down` steps, and are
//! recorded in a reserved tracking table as they complete. Runs can apply
//! everything, move to a target unit (forward or backward, never both),
//! or step back a fixed number of units.

pub mod error;
pub mod runner;
pub mod unit;

pub use error::{MigrateError, Result};
pub use runner::{Runner, Target, TRACKING_TABLE};
pub use unit::{MigrationUnit, StepFn, UnitId};
