//! Entity base: identity, serialization and CRUD verbs for every entity type.
//!
//! # Responsibility
//! - `Entity` is implemented once per persistent type. Its `create`, `get`
//!   and `list` are hooks that may be overridden to add validation or
//!   defaulting around the base implementation.
//! - `EntityBase` is implemented for every `Entity` and holds the logic that
//!   touches the store. It cannot be overridden.
//!
//! # Invariants
//! - `create_entity` is the only path that instantiates and stages a new row.
//! - An entity returned by `create` has a non-empty `id` before any commit.
//! - `EntityCore` bookkeeping never appears in `to_dict` output.
//! - Every `Store::commit` expires all persisted, attached instances loaded
//!   before it; `to_dict` refreshes an expired instance unless it carries
//!   unflushed local changes. Only an instance whose own `commit` flushed
//!   its insert is re-attached at the new epoch.
//! - A pending instance whose insert was discarded by a failed commit is
//!   transient again.
//! - `create` rejects a missing non-nullable field that has no default.

use crate::db::Store;
use crate::error::{GooError, GooResult};
use crate::model::schema::{EntitySchema, FieldError, SchemaBuilder, ID_FIELD};
use crate::model::value::{FieldMap, Value};
use crate::repo::query::{self, GetQuery, ListQuery, SelectStatement, Selector};
use log::warn;
use std::fmt::{Display, Formatter};

/// Stored lifecycle phase; the public view is `LifecycleState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Transient,
    Pending,
    Persisted,
}

/// Lifecycle of an entity instance relative to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, not staged in any live unit of work.
    Transient,
    /// Insert staged, not committed yet.
    Pending,
    /// Committed and loaded since the last commit.
    Persisted,
    /// Committed, but a commit happened after it was loaded.
    Expired,
    /// Committed, but its store session has been closed.
    Detached,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Pending => "pending",
            Self::Persisted => "persisted",
            Self::Expired => "expired",
            Self::Detached => "detached",
        }
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and bookkeeping embedded in every entity struct.
#[derive(Debug, Clone, Default)]
pub struct EntityCore {
    pub(crate) id: String,
    table: &'static str,
    phase: Phase,
    session: Option<u64>,
    loaded_epoch: u64,
    committed: Option<FieldMap>,
}

impl EntityCore {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn attach(
        &mut self,
        store: &Store,
        table: &'static str,
        phase: Phase,
        committed: Option<FieldMap>,
    ) {
        self.table = table;
        self.phase = phase;
        self.session = Some(store.generation());
        self.loaded_epoch = store.epoch();
        self.committed = committed;
    }

    fn is_attached(&self, store: &Store) -> bool {
        self.session == Some(store.generation())
    }
}

/// A persistent record type.
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct Person {
///     core: EntityCore,
///     name: String,
/// }
///
/// impl Entity for Person {
///     fn schema() -> SchemaBuilder<Self> {
///         SchemaBuilder::new("person")
///             .field(FieldDef::new("name", |p: &Person| &p.name, |p: &mut Person| &mut p.name))
///     }
///     fn core(&self) -> &EntityCore { &self.core }
///     fn core_mut(&mut self) -> &mut EntityCore { &mut self.core }
/// }
/// ```
pub trait Entity: Default + 'static {
    /// Table name and declared fields. `id` is added automatically.
    fn schema() -> SchemaBuilder<Self>;

    fn core(&self) -> &EntityCore;

    fn core_mut(&mut self) -> &mut EntityCore;

    /// Creates and stages a new entity. Call `commit` to persist it.
    ///
    /// Override to add side effects; delegate to `create_entity` for the
    /// actual construction.
    fn create(store: &Store, fields: FieldMap) -> GooResult<Self> {
        <Self as EntityBase>::create_entity(store, fields)
    }

    /// Fetches the first entity matching the query.
    ///
    /// Override to add side effects; delegate to `get_entity`.
    fn get(store: &Store, query: &GetQuery) -> GooResult<Option<Self>> {
        <Self as EntityBase>::get_entity(store, query)
    }

    /// Fetches every entity matching the query.
    ///
    /// Override to add side effects; delegate to `list_entities`.
    fn list(store: &Store, query: &ListQuery) -> GooResult<Vec<Self>> {
        <Self as EntityBase>::list_entities(store, query)
    }
}

/// Store-backed operations shared by all entity types.
pub trait EntityBase: Entity {
    /// Instantiates `Self`, applies defaults and `fields`, stages the insert.
    ///
    /// Unknown field names are ignored with a warning.
    fn create_entity(store: &Store, fields: FieldMap) -> GooResult<Self>;

    /// First match by `id`, else `filter`, else `filter_by`.
    ///
    /// Without an explicit order, the row picked among several matches is
    /// whatever SQLite returns first.
    fn get_entity(store: &Store, query: &GetQuery) -> GooResult<Option<Self>>;

    /// All matches by `filter_by`, else `filter`, ordered and limited.
    fn list_entities(store: &Store, query: &ListQuery) -> GooResult<Vec<Self>>;

    fn id(&self) -> &str;

    fn lifecycle(&self, store: &Store) -> LifecycleState;

    fn is_expired(&self, store: &Store) -> bool {
        self.lifecycle(store) == LifecycleState::Expired
    }

    /// Reloads every field from storage and re-attaches the instance.
    fn refresh(&mut self, store: &Store) -> GooResult<()>;

    /// Field values keyed by name, refreshed first when expired.
    fn to_dict(&mut self, store: &Store) -> GooResult<FieldMap>;

    /// Assigns fields in memory and stages them. Call `commit` to persist.
    fn update(&mut self, store: &Store, fields: FieldMap) -> GooResult<&mut Self>;

    /// Stages this instance's direct changes and flushes the whole unit of work.
    fn commit(&mut self, store: &Store) -> GooResult<&mut Self>;

    /// Deletes and commits immediately, returning the pre-delete snapshot.
    fn delete(self, store: &Store) -> GooResult<FieldMap>;
}

impl<E: Entity> EntityBase for E {
    fn create_entity(store: &Store, mut fields: FieldMap) -> GooResult<Self> {
        let schema = store.schema::<Self>()?;

        let blank_id = match fields.get(ID_FIELD) {
            Some(Value::Null) => true,
            Some(value) => value.as_str() == Some(""),
            None => false,
        };
        if blank_id {
            fields.remove(ID_FIELD);
        }

        let mut entity = Self::default();
        for field in schema.fields() {
            if fields.contains_key(field.name()) {
                continue;
            }
            match field.default_value() {
                Some(value) => field.assign(&mut entity, value)?,
                None if !field.is_nullable() => {
                    return Err(FieldError::Missing {
                        table: schema.table(),
                        field: field.name(),
                    }
                    .into());
                }
                None => {}
            }
        }

        for (name, value) in fields {
            match schema.field(&name) {
                Some(field) => field.assign(&mut entity, value)?,
                None => warn!(
                    "event=entity_create module=model status=ignored table={} field={}",
                    schema.table(),
                    name
                ),
            }
        }

        store.stage_insert(
            schema.table(),
            entity.core().id.clone(),
            schema.column_values(&entity),
        );
        entity
            .core_mut()
            .attach(store, schema.table(), Phase::Pending, None);
        Ok(entity)
    }

    fn get_entity(store: &Store, query: &GetQuery) -> GooResult<Option<Self>> {
        let schema = store.schema::<Self>()?;
        let statement = query::compose_select(&schema, query.selector(), None, Some(1))?;
        Ok(load(store, &schema, &statement)?.into_iter().next())
    }

    fn list_entities(store: &Store, query: &ListQuery) -> GooResult<Vec<Self>> {
        let schema = store.schema::<Self>()?;
        let order_field = match query.order_by.as_deref() {
            Some(name) if !name.is_empty() => schema.require_field(name)?,
            _ => schema.id_field(),
        };
        let statement = query::compose_select(
            &schema,
            query.selector(),
            Some((order_field.name(), query.order)),
            query.effective_limit(),
        )?;
        load(store, &schema, &statement)
    }

    fn id(&self) -> &str {
        self.core().id()
    }

    fn lifecycle(&self, store: &Store) -> LifecycleState {
        let core = self.core();
        let attached = core.is_attached(store);
        match core.phase {
            Phase::Transient => LifecycleState::Transient,
            Phase::Pending if !attached => LifecycleState::Transient,
            Phase::Pending if store.has_pending_insert(core.table, &core.id) => {
                LifecycleState::Pending
            }
            // The first commit after creation took the insert; if it failed,
            // nothing was ever stored.
            Phase::Pending if store.commit_failed(core.loaded_epoch + 1) => {
                LifecycleState::Transient
            }
            _ if !attached => LifecycleState::Detached,
            _ if core.loaded_epoch < store.epoch() => LifecycleState::Expired,
            _ => LifecycleState::Persisted,
        }
    }

    fn refresh(&mut self, store: &Store) -> GooResult<()> {
        let state = self.lifecycle(store);
        if matches!(state, LifecycleState::Transient | LifecycleState::Pending) {
            return Err(GooError::InvalidState {
                id: self.core().id.clone(),
                state,
                operation: "refresh",
            });
        }

        let schema = store.schema::<Self>()?;
        let id = self.core().id.clone();
        let statement = query::compose_select(&schema, Selector::Id(&id), None, Some(1))?;
        let fresh = load(store, &schema, &statement)?
            .into_iter()
            .next()
            .ok_or_else(|| GooError::ObjectDeleted {
                table: schema.table(),
                id: id.clone(),
            })?;

        for field in schema.fields() {
            field.assign(self, field.read_value(&fresh))?;
        }
        let snapshot = schema.snapshot(self);
        self.core_mut()
            .attach(store, schema.table(), Phase::Persisted, Some(snapshot));
        Ok(())
    }

    fn to_dict(&mut self, store: &Store) -> GooResult<FieldMap> {
        let schema = store.schema::<Self>()?;
        if self.is_expired(store) && !has_local_changes(self, &schema) {
            self.refresh(store)?;
        }
        Ok(schema.snapshot(self))
    }

    fn update(&mut self, store: &Store, fields: FieldMap) -> GooResult<&mut Self> {
        let schema = store.schema::<Self>()?;
        let mut changes = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let field = schema.require_field(&name)?;
            if field.is_immutable() {
                return Err(FieldError::Immutable {
                    field: field.name(),
                }
                .into());
            }
            field.assign(self, value)?;
            changes.push((field.name(), field.read_value(self)));
        }
        stage_changes(self, store, &schema, changes);
        Ok(self)
    }

    fn commit(&mut self, store: &Store) -> GooResult<&mut Self> {
        let schema = store.schema::<Self>()?;
        let state = self.lifecycle(store);
        let tracked = matches!(
            state,
            LifecycleState::Pending | LifecycleState::Persisted | LifecycleState::Expired
        );
        if tracked {
            let changes = local_changes(self, &schema);
            stage_changes(self, store, &schema, changes);
        }

        store.commit()?;

        if !tracked {
            return Ok(self);
        }
        let snapshot = schema.snapshot(self);
        let core = self.core_mut();
        if state == LifecycleState::Pending {
            // A full-row insert: storage holds exactly the in-memory values.
            core.attach(store, schema.table(), Phase::Persisted, Some(snapshot));
        } else {
            // Only changed columns were written; other columns may have been
            // committed elsewhere, so the instance stays behind the epoch and
            // the next `to_dict` reloads it.
            core.phase = Phase::Persisted;
            core.committed = Some(snapshot);
        }
        Ok(self)
    }

    fn delete(mut self, store: &Store) -> GooResult<FieldMap> {
        let state = self.lifecycle(store);
        if state == LifecycleState::Transient {
            return Err(GooError::InvalidState {
                id: self.core().id.clone(),
                state,
                operation: "delete",
            });
        }

        let schema = store.schema::<Self>()?;
        let snapshot = self.to_dict(store)?;
        store.stage_delete(schema.table(), self.core().id.clone());
        store.commit()?;
        Ok(snapshot)
    }
}

fn load<E: Entity>(
    store: &Store,
    schema: &EntitySchema<E>,
    statement: &SelectStatement,
) -> GooResult<Vec<E>> {
    let mut entities = store.query_rows(&statement.sql, &statement.params, |row| {
        schema.decode_row(row)
    })?;
    for entity in &mut entities {
        let snapshot = schema.snapshot(entity);
        entity
            .core_mut()
            .attach(store, schema.table(), Phase::Persisted, Some(snapshot));
    }
    Ok(entities)
}

fn has_local_changes<E: Entity>(entity: &E, schema: &EntitySchema<E>) -> bool {
    entity
        .core()
        .committed
        .as_ref()
        .is_some_and(|committed| *committed != schema.snapshot(entity))
}

/// Fields that differ from the last committed snapshot, `id` excluded.
///
/// Without a snapshot every field counts as changed.
fn local_changes<E: Entity>(entity: &E, schema: &EntitySchema<E>) -> Vec<(&'static str, Value)> {
    let committed = entity.core().committed.as_ref();
    schema
        .fields()
        .iter()
        .filter(|field| field.name() != ID_FIELD)
        .map(|field| (field.name(), field.read_value(entity)))
        .filter(|(name, value)| committed.map_or(true, |map| map.get(*name) != Some(value)))
        .collect()
}

fn stage_changes<E: Entity>(
    entity: &E,
    store: &Store,
    schema: &EntitySchema<E>,
    changes: Vec<(&'static str, Value)>,
) {
    let id = entity.core().id.clone();
    match entity.lifecycle(store) {
        LifecycleState::Pending => {
            store.stage_insert(schema.table(), id, schema.column_values(entity));
        }
        LifecycleState::Persisted | LifecycleState::Expired => {
            store.stage_update(schema.table(), id, changes);
        }
        LifecycleState::Transient | LifecycleState::Detached => {}
    }
}
