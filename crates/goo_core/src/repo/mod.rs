//! Query composition for entity reads.
//!
//! # Responsibility
//! - Turn `GetQuery` / `ListQuery` selectors into parameterized SELECTs.
//! - Keep SQL text free of caller-supplied values.

pub mod query;
