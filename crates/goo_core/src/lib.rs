//! Core of the goo persistence layer.
//!
//! Entity types declare a schema, register with a [`Store`] and then get
//! create/get/list/update/commit/delete through [`EntityBase`].

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod identifier;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::{ConfigError, GooConfig};
pub use db::{DbError, Store};
pub use error::{GooError, GooResult};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings};
pub use model::entity::{Entity, EntityBase, EntityCore, LifecycleState};
pub use model::schema::{FieldDef, FieldError, SchemaBuilder, SchemaError};
pub use model::value::{FieldKind, FieldMap, FieldType, Value};
pub use repo::query::{Condition, GetQuery, ListQuery, Op, SortOrder};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
