//! Dynamic field values shared by field maps, filters and SQL parameters.
//!
//! # Responsibility
//! - Represent one column value independently of the entity type.
//! - Convert between typed Rust fields and `Value` (`FieldType`).
//! - Encode values as SQLite parameters and decode them back per `FieldKind`.
//!
//! # Invariants
//! - `Boolean` is stored as INTEGER 0/1.
//! - `Timestamp` is stored as RFC 3339 text with microseconds and a `Z`
//!   suffix, so lexical order in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Field name to value mapping used by `create`, `update`, `filter_by` and
/// `to_dict`.
pub type FieldMap = BTreeMap<String, Value>;

/// Semantic type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Boolean,
    Timestamp,
}

impl FieldKind {
    /// Column type used in generated DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Text | Self::Timestamp => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Boolean(_) => "boolean",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A value could not be converted into the Rust type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTypeError {
    pub expected: FieldKind,
    pub found: &'static str,
}

impl Display for ValueTypeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {} value, found {}", self.expected, self.found)
    }
}

impl Error for ValueTypeError {}

/// Rust types that can back a declared entity field.
///
/// `Option<T>` marks the column nullable; every other implementation is
/// `NOT NULL`.
pub trait FieldType: Sized + 'static {
    const KIND: FieldKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, ValueTypeError>;
}

fn mismatch<T>(expected: FieldKind, value: &Value) -> Result<T, ValueTypeError> {
    Err(ValueTypeError {
        expected,
        found: value.type_name(),
    })
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::Text(text) => Ok(text),
            other => mismatch(Self::KIND, &other),
        }
    }
}

impl FieldType for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::Integer(number) => Ok(number),
            other => mismatch(Self::KIND, &other),
        }
    }
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::Real;

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::Real(number) => Ok(number),
            Value::Integer(number) => Ok(number as f64),
            other => mismatch(Self::KIND, &other),
        }
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::Boolean(flag) => Ok(flag),
            other => mismatch(Self::KIND, &other),
        }
    }
}

impl FieldType for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Timestamp;

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::Timestamp(at) => Ok(at),
            Value::Text(ref text) => parse_timestamp(text).ok_or(ValueTypeError {
                expected: Self::KIND,
                found: "text",
            }),
            other => mismatch(Self::KIND, &other),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, FieldType::to_value)
    }

    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Canonical storage form of a timestamp.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
            Self::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            Self::Integer(number) => ToSqlOutput::Owned(SqlValue::Integer(*number)),
            Self::Real(number) => ToSqlOutput::Owned(SqlValue::Real(*number)),
            Self::Boolean(flag) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*flag))),
            Self::Timestamp(at) => ToSqlOutput::Owned(SqlValue::Text(format_timestamp(at))),
        };
        Ok(output)
    }
}

/// Decodes one stored column according to the declared field kind.
///
/// Returns a human-readable message when the stored data does not fit.
pub(crate) fn decode_column(kind: FieldKind, raw: ValueRef<'_>) -> Result<Value, String> {
    match (kind, raw) {
        (_, ValueRef::Null) => Ok(Value::Null),
        (FieldKind::Text, ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
            .map(|text| Value::Text(text.to_string()))
            .map_err(|err| format!("text column is not valid UTF-8: {err}")),
        (FieldKind::Integer, ValueRef::Integer(number)) => Ok(Value::Integer(number)),
        (FieldKind::Real, ValueRef::Real(number)) => Ok(Value::Real(number)),
        (FieldKind::Real, ValueRef::Integer(number)) => Ok(Value::Real(number as f64)),
        (FieldKind::Boolean, ValueRef::Integer(0)) => Ok(Value::Boolean(false)),
        (FieldKind::Boolean, ValueRef::Integer(1)) => Ok(Value::Boolean(true)),
        (FieldKind::Timestamp, ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
            .ok()
            .and_then(parse_timestamp)
            .map(Value::Timestamp)
            .ok_or_else(|| {
                format!(
                    "invalid timestamp `{}`",
                    String::from_utf8_lossy(bytes)
                )
            }),
        (kind, other) => Err(format!(
            "stored {:?} does not fit a {kind} field",
            other.data_type()
        )),
    }
}
