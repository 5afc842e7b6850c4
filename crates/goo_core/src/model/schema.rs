//! Explicit per-entity schema and typed field accessor registry.
//!
//! # Responsibility
//! - Describe each persistent field: name, kind, nullability, index, default.
//! - Hold typed getter/setter pairs so that generic code can read and assign
//!   fields by name without reflection.
//! - Render table DDL for `create_all` / `drop_all`.
//!
//! # Invariants
//! - Every schema starts with the `id` field, which is text, not null,
//!   primary key and immutable through `update`.
//! - Table and field names are plain SQL identifiers, checked when the
//!   schema is built (`Store::register`).
//! - Field names are unique within a schema.

use crate::error::{GooError, GooResult};
use crate::identifier;
use crate::model::entity::Entity;
use crate::model::value::{decode_column, FieldKind, FieldMap, FieldType, Value};
use once_cell::sync::Lazy;
use rusqlite::Row;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Name of the primary key field shared by every entity.
pub const ID_FIELD: &str = "id";

static IDENTIFIER_RE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex")
});

type Reader<E> = Box<dyn Fn(&E) -> Value>;
type Writer<E> = Box<dyn Fn(&mut E, Value) -> Result<(), crate::model::value::ValueTypeError>>;
type DefaultFn = Box<dyn Fn() -> Value>;

/// Schema declaration errors, reported by `Store::register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidIdentifier(String),
    ReservedField {
        table: &'static str,
        field: &'static str,
    },
    DuplicateField {
        table: &'static str,
        field: &'static str,
    },
    DuplicateTable(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(value) => write!(f, "invalid sql identifier `{value}`"),
            Self::ReservedField { table, field } => {
                write!(f, "field `{field}` is reserved and cannot be declared on `{table}`")
            }
            Self::DuplicateField { table, field } => {
                write!(f, "field `{field}` is declared twice on `{table}`")
            }
            Self::DuplicateTable(table) => {
                write!(f, "table `{table}` is already registered by another entity type")
            }
        }
    }
}

impl Error for SchemaError {}

/// Field-level assignment and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    UnknownField {
        table: &'static str,
        field: String,
    },
    InvalidValue {
        field: &'static str,
        expected: FieldKind,
        found: &'static str,
    },
    Immutable {
        field: &'static str,
    },
    /// A non-nullable field without default was not supplied to `create`.
    Missing {
        table: &'static str,
        field: &'static str,
    },
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField { table, field } => write!(f, "`{table}` has no field `{field}`"),
            Self::InvalidValue {
                field,
                expected,
                found,
            } => write!(f, "field `{field}` expects {expected}, got {found}"),
            Self::Immutable { field } => write!(f, "field `{field}` cannot be reassigned"),
            Self::Missing { table, field } => {
                write!(f, "`{table}` requires a value for not-null field `{field}`")
            }
        }
    }
}

impl Error for FieldError {}

/// One declared field with its typed accessors.
pub struct FieldDef<E> {
    name: &'static str,
    kind: FieldKind,
    nullable: bool,
    indexed: bool,
    immutable: bool,
    default: Option<DefaultFn>,
    read: Reader<E>,
    write: Writer<E>,
}

impl<E: 'static> FieldDef<E> {
    /// Declares a field backed by a struct member of type `T`.
    ///
    /// Kind and nullability come from `T` (`Option<_>` is nullable).
    ///
    /// ```ignore
    /// FieldDef::new("name", |e: &Person| &e.name, |e: &mut Person| &mut e.name)
    /// ```
    pub fn new<T: FieldType>(
        name: &'static str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        Self {
            name,
            kind: T::KIND,
            nullable: T::NULLABLE,
            indexed: false,
            immutable: false,
            default: None,
            read: Box::new(move |entity: &E| get(entity).to_value()),
            write: Box::new(move |entity: &mut E, value: Value| {
                *get_mut(entity) = T::from_value(value)?;
                Ok(())
            }),
        }
    }

    /// Adds a secondary index on this column.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Value used by `create` when the caller does not supply this field.
    pub fn with_default(mut self, default: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(Box::new(default));
        self
    }

    fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub(crate) fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(|default| default())
    }

    pub(crate) fn read_value(&self, entity: &E) -> Value {
        (self.read)(entity)
    }

    pub(crate) fn assign(&self, entity: &mut E, value: Value) -> Result<(), FieldError> {
        (self.write)(entity, value).map_err(|err| FieldError::InvalidValue {
            field: self.name,
            expected: err.expected,
            found: err.found,
        })
    }

    fn column_sql(&self) -> String {
        let mut column = format!("{} {}", quote_ident(self.name), self.kind.sql_type());
        if !self.nullable {
            column.push_str(" NOT NULL");
        }
        if self.name == ID_FIELD {
            column.push_str(" PRIMARY KEY");
        }
        column
    }
}

impl<E> Debug for FieldDef<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("indexed", &self.indexed)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Declaration of one entity table, validated by `build`.
pub struct SchemaBuilder<E> {
    table: &'static str,
    id_generator: fn() -> String,
    fields: Vec<FieldDef<E>>,
}

impl<E: Entity> SchemaBuilder<E> {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            id_generator: identifier::generate,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef<E>) -> Self {
        self.fields.push(field);
        self
    }

    /// Replaces the default UUID v4 generator used for `id`.
    pub fn id_generator(mut self, generator: fn() -> String) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub(crate) fn build(self) -> Result<EntitySchema<E>, SchemaError> {
        if !is_identifier(self.table) {
            return Err(SchemaError::InvalidIdentifier(self.table.to_string()));
        }

        let mut seen = BTreeSet::from([ID_FIELD]);
        for field in &self.fields {
            if field.name == ID_FIELD {
                return Err(SchemaError::ReservedField {
                    table: self.table,
                    field: field.name,
                });
            }
            if !is_identifier(field.name) {
                return Err(SchemaError::InvalidIdentifier(field.name.to_string()));
            }
            if !seen.insert(field.name) {
                return Err(SchemaError::DuplicateField {
                    table: self.table,
                    field: field.name,
                });
            }
        }

        let generator = self.id_generator;
        let id = FieldDef::new(ID_FIELD, id_ref::<E>, id_mut::<E>)
            .with_default(move || Value::Text(generator()))
            .immutable();

        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        fields.push(id);
        fields.extend(self.fields);

        Ok(EntitySchema {
            table: self.table,
            fields,
        })
    }
}

fn id_ref<E: Entity>(entity: &E) -> &String {
    &entity.core().id
}

fn id_mut<E: Entity>(entity: &mut E) -> &mut String {
    &mut entity.core_mut().id
}

fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

/// Type-erased DDL for one registered table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableDef {
    pub table: &'static str,
    pub create_sql: String,
    pub drop_sql: String,
}

/// Validated schema of one entity type.
pub struct EntitySchema<E> {
    table: &'static str,
    fields: Vec<FieldDef<E>>,
}

impl<E: Entity> EntitySchema<E> {
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Declared fields, `id` first.
    pub fn fields(&self) -> &[FieldDef<E>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef<E>> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub(crate) fn id_field(&self) -> &FieldDef<E> {
        &self.fields[0]
    }

    pub(crate) fn require_field(&self, name: &str) -> Result<&FieldDef<E>, FieldError> {
        self.field(name).ok_or_else(|| FieldError::UnknownField {
            table: self.table,
            field: name.to_string(),
        })
    }

    /// Current in-memory values of every declared field.
    pub fn snapshot(&self, entity: &E) -> FieldMap {
        self.fields
            .iter()
            .map(|field| (field.name.to_string(), field.read_value(entity)))
            .collect()
    }

    pub(crate) fn column_values(&self, entity: &E) -> Vec<(&'static str, Value)> {
        self.fields
            .iter()
            .map(|field| (field.name, field.read_value(entity)))
            .collect()
    }

    pub(crate) fn column_list(&self) -> String {
        self.fields
            .iter()
            .map(|field| quote_ident(field.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Builds a detached entity from a row selected with `column_list`.
    pub(crate) fn decode_row(&self, row: &Row<'_>) -> GooResult<E> {
        let mut entity = E::default();
        for (index, field) in self.fields.iter().enumerate() {
            let raw = row.get_ref(index)?;
            let value = decode_column(field.kind, raw).map_err(|message| {
                GooError::InvalidData(format!("{}.{}: {message}", self.table, field.name))
            })?;
            if value.is_null() && !field.nullable {
                return Err(GooError::InvalidData(format!(
                    "{}.{}: null in a not-null field",
                    self.table, field.name
                )));
            }
            field.assign(&mut entity, value)?;
        }
        Ok(entity)
    }

    pub(crate) fn table_def(&self) -> TableDef {
        let table = quote_ident(self.table);
        let columns = self
            .fields
            .iter()
            .map(FieldDef::column_sql)
            .collect::<Vec<_>>()
            .join(",\n    ");

        let mut create_sql = format!("CREATE TABLE IF NOT EXISTS {table} (\n    {columns}\n);");
        for field in self.fields.iter().filter(|field| field.indexed) {
            create_sql.push_str(&format!(
                "\nCREATE INDEX IF NOT EXISTS {} ON {table} ({});",
                quote_ident(&format!("ix_{}_{}", self.table, field.name)),
                quote_ident(field.name)
            ));
        }

        TableDef {
            table: self.table,
            create_sql,
            drop_sql: format!("DROP TABLE IF EXISTS {table};"),
        }
    }
}

impl<E> Debug for EntitySchema<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySchema")
            .field("table", &self.table)
            .field("fields", &self.fields)
            .finish()
    }
}
