//! Entity model: typed field values, schema declarations and the shared
//! entity behavior.
//!
//! # Responsibility
//! - Describe how an entity struct maps onto a table (`schema`).
//! - Convert between Rust field types and stored values (`value`).
//! - Provide create/get/list/update/commit/delete for every entity (`entity`).
//!
//! # Invariants
//! - Every entity has an immutable string `id` primary key.

pub mod entity;
pub mod schema;
pub mod value;
