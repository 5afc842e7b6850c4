//! Crate-level error type.
//!
//! # Responsibility
//! - Wrap the errors of lower layers (`db`, `config`, `model::schema`) so
//!   entity operations can use `?` across them.
//! - Add the lifecycle failures only entity operations can produce.

use crate::config::ConfigError;
use crate::db::DbError;
use crate::model::entity::LifecycleState;
use crate::model::schema::{FieldError, SchemaError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type GooResult<T> = Result<T, GooError>;

#[derive(Debug)]
pub enum GooError {
    Db(DbError),
    Config(ConfigError),
    Schema(SchemaError),
    Field(FieldError),
    /// The entity type was never passed to `Store::register`.
    NotRegistered(&'static str),
    /// A stored row does not decode into its declared field types.
    InvalidData(String),
    /// A refresh found no row for a persisted instance.
    ObjectDeleted {
        table: &'static str,
        id: String,
    },
    /// A flushed UPDATE matched no row.
    StaleRow {
        table: &'static str,
        id: String,
    },
    InvalidState {
        id: String,
        state: LifecycleState,
        operation: &'static str,
    },
}

impl Display for GooError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::Field(err) => write!(f, "{err}"),
            Self::NotRegistered(name) => {
                write!(f, "entity type `{name}` is not registered with the store")
            }
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::ObjectDeleted { table, id } => {
                write!(f, "row `{id}` no longer exists in `{table}`")
            }
            Self::StaleRow { table, id } => {
                write!(f, "update of `{table}` row `{id}` matched no row")
            }
            Self::InvalidState {
                id,
                state,
                operation,
            } => write!(f, "cannot {operation} entity `{id}` in state {state}"),
        }
    }
}

impl Error for GooError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::Field(err) => Some(err),
            Self::NotRegistered(_)
            | Self::InvalidData(_)
            | Self::ObjectDeleted { .. }
            | Self::StaleRow { .. }
            | Self::InvalidState { .. } => None,
        }
    }
}

impl From<DbError> for GooError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GooError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConfigError> for GooError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<SchemaError> for GooError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<FieldError> for GooError {
    fn from(value: FieldError) -> Self {
        Self::Field(value)
    }
}
