//! Storage binding: connection bootstrap, schema registry and unit of work.
//!
//! # Responsibility
//! - Open and configure SQLite connections from a database URL.
//! - Provision and tear down the tables of registered entity types.
//! - Track pending writes and flush them on commit.
//!
//! # Invariants
//! - A `Store` is used from one execution context at a time (`!Send`).
//! - Pending writes reach the database only through `Store::commit`.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
mod store;
mod unit_of_work;

pub use open::{parse_url, ConnectionTarget};
pub use store::Store;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    InvalidUrl(String),
    UnsupportedScheme(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidUrl(url) => write!(f, "invalid database url `{url}`"),
            Self::UnsupportedScheme(scheme) => {
                write!(f, "unsupported database url scheme `{scheme}`; only sqlite is available")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidUrl(_) | Self::UnsupportedScheme(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
