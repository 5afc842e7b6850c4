//! Environment-driven store configuration.
//!
//! # Responsibility
//! - Resolve the database URL and echo flag a process should open.
//!
//! # Invariants
//! - `GOO_URL` wins over the URL file.
//! - The URL file is read only when it exists; its first trimmed line is the URL.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const URL_ENV: &str = "GOO_URL";
pub const FILE_ENV: &str = "GOO_FILE";
pub const ECHO_ENV: &str = "GOO_ECHO";
pub const DEFAULT_GOO_FILE: &str = ".goo";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    EmptyUrl {
        path: PathBuf,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::EmptyUrl { path } => {
                write!(f, "`{}` does not start with a database url", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::EmptyUrl { .. } => None,
        }
    }
}

/// Database URL plus SQL echo flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GooConfig {
    pub url: String,
    pub echo: bool,
}

impl GooConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            echo: false,
        }
    }

    /// Resolves configuration from the process environment.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `lookup` instead of the process
    /// environment.
    ///
    /// Returns `Ok(None)` when neither `GOO_URL` nor an existing URL file
    /// provides a database URL.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let echo = lookup(ECHO_ENV).is_some_and(|value| value == "1");

        if let Some(url) = lookup(URL_ENV) {
            return Ok(Some(Self { url, echo }));
        }

        let path = PathBuf::from(lookup(FILE_ENV).unwrap_or_else(|| DEFAULT_GOO_FILE.to_string()));
        Ok(read_url_file(&path)?.map(|url| Self { url, echo }))
    }
}

fn read_url_file(path: &Path) -> Result<Option<String>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let url = content.lines().next().unwrap_or_default().trim();
    if url.is_empty() {
        return Err(ConfigError::EmptyUrl {
            path: path.to_path_buf(),
        });
    }
    Ok(Some(url.to_string()))
}
