//! `Store`: the explicit storage context passed to every entity operation.
//!
//! # Responsibility
//! - Own the SQLite connection, the registry of entity schemas and the
//!   unit of work.
//! - Provision (`create_all`) and tear down (`drop_all`) registered tables.
//! - Flush pending writes atomically on `commit`.
//!
//! # Invariants
//! - `epoch` advances on every commit, successful or not; instances loaded
//!   in an earlier epoch are expired.
//! - `generation` advances on every `close`; instances attached to an
//!   earlier generation are detached.
//! - A failed flush rolls back and discards every pending write; the epoch
//!   it ended is remembered so discarded inserts read as transient.

use super::open::open_url;
use super::unit_of_work::{PendingWrite, UnitOfWork, WriteKind};
use crate::config::GooConfig;
use crate::error::{GooError, GooResult};
use crate::model::entity::Entity;
use crate::model::schema::{EntitySchema, SchemaError, TableDef};
use crate::model::value::Value;
use log::{debug, error, info, warn};
use rusqlite::{params_from_iter, Connection, Row};
use std::any::{type_name, Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::time::Instant;

#[derive(Default)]
struct SchemaRegistry {
    schemas: HashMap<TypeId, Rc<dyn Any>>,
    tables: Vec<TableDef>,
}

/// Storage context: connection, schema metadata and unit of work.
pub struct Store {
    conn: RefCell<Connection>,
    url: String,
    echo: bool,
    registry: RefCell<SchemaRegistry>,
    unit_of_work: RefCell<UnitOfWork>,
    epoch: Cell<u64>,
    failed_epochs: RefCell<BTreeSet<u64>>,
    generation: Cell<u64>,
}

impl Store {
    /// Opens the database at `url`.
    ///
    /// With `echo` enabled every executed statement is logged at `info`.
    pub fn init(url: &str, echo: bool) -> GooResult<Self> {
        let conn = open_url(url)?;
        Ok(Self {
            conn: RefCell::new(conn),
            url: url.trim().to_string(),
            echo,
            registry: RefCell::new(SchemaRegistry::default()),
            unit_of_work: RefCell::new(UnitOfWork::default()),
            epoch: Cell::new(0),
            failed_epochs: RefCell::new(BTreeSet::new()),
            generation: Cell::new(0),
        })
    }

    pub fn from_config(config: &GooConfig) -> GooResult<Self> {
        Self::init(&config.url, config.echo)
    }

    /// Opens the store described by `GOO_URL` / `GOO_FILE` / `GOO_ECHO`.
    ///
    /// Returns `Ok(None)` when no database URL is configured.
    pub fn from_env() -> GooResult<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, resolving variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GooResult<Option<Self>> {
        match GooConfig::from_lookup(lookup)? {
            Some(config) => Self::from_config(&config).map(Some),
            None => Ok(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Validates the schema of `E` and adds its table to the metadata.
    ///
    /// Registering the same type twice is a no-op.
    pub fn register<E: Entity>(&self) -> GooResult<()> {
        let type_id = TypeId::of::<E>();
        if self.registry.borrow().schemas.contains_key(&type_id) {
            return Ok(());
        }

        let schema = E::schema().build()?;
        let mut registry = self.registry.borrow_mut();
        if registry
            .tables
            .iter()
            .any(|table| table.table == schema.table())
        {
            return Err(SchemaError::DuplicateTable(schema.table().to_string()).into());
        }

        info!(
            "event=entity_register module=db status=ok table={} fields={}",
            schema.table(),
            schema.fields().len()
        );
        registry.tables.push(schema.table_def());
        let schema: Rc<dyn Any> = Rc::new(schema);
        registry.schemas.insert(type_id, schema);
        Ok(())
    }

    /// Names of registered tables in registration order.
    pub fn tables(&self) -> Vec<&'static str> {
        self.registry
            .borrow()
            .tables
            .iter()
            .map(|table| table.table)
            .collect()
    }

    pub(crate) fn schema<E: Entity>(&self) -> GooResult<Rc<EntitySchema<E>>> {
        let schema = self
            .registry
            .borrow()
            .schemas
            .get(&TypeId::of::<E>())
            .cloned()
            .ok_or(GooError::NotRegistered(type_name::<E>()))?;
        schema
            .downcast::<EntitySchema<E>>()
            .map_err(|_| GooError::NotRegistered(type_name::<E>()))
    }

    /// Creates every registered table and index that does not exist yet.
    pub fn create_all(&self) -> GooResult<()> {
        let started_at = Instant::now();
        match self.execute_ddl(|table| &table.create_sql, false) {
            Ok(count) => {
                info!(
                    "event=create_all module=db status=ok tables={} duration_ms={}",
                    count,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=create_all module=db status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Closes the unit of work, then drops every registered table.
    pub fn drop_all(&self) -> GooResult<()> {
        let started_at = Instant::now();
        self.close();
        match self.execute_ddl(|table| &table.drop_sql, true) {
            Ok(count) => {
                info!(
                    "event=drop_all module=db status=ok tables={} duration_ms={}",
                    count,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=drop_all module=db status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Discards pending writes and detaches every loaded instance.
    pub fn close(&self) {
        let discarded = self.unit_of_work.borrow_mut().take().len();
        self.generation.set(self.generation.get() + 1);
        debug!("event=session_close module=db status=ok discarded={discarded}");
    }

    /// Flushes every pending write in one transaction.
    pub fn commit(&self) -> GooResult<()> {
        let started_at = Instant::now();
        let writes = self.unit_of_work.borrow_mut().take();
        let result = self.flush(&writes);
        self.epoch.set(self.epoch.get() + 1);
        if result.is_err() {
            self.failed_epochs.borrow_mut().insert(self.epoch.get());
        }

        match &result {
            Ok(()) => debug!(
                "event=commit module=db status=ok writes={} duration_ms={}",
                writes.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=commit module=db status=error writes={} duration_ms={} error={}",
                writes.len(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Number of staged, not yet committed writes.
    pub fn pending_writes(&self) -> usize {
        self.unit_of_work.borrow().len()
    }

    /// Runs `f` against the raw connection, outside the unit of work.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> GooResult<T> {
        let conn = self.conn.borrow();
        Ok(f(&conn)?)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    /// Whether the commit that advanced the epoch to `epoch` failed.
    pub(crate) fn commit_failed(&self, epoch: u64) -> bool {
        self.failed_epochs.borrow().contains(&epoch)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub(crate) fn has_pending_insert(&self, table: &str, id: &str) -> bool {
        self.unit_of_work.borrow().has_insert(table, id)
    }

    pub(crate) fn stage_insert(
        &self,
        table: &'static str,
        id: String,
        values: Vec<(&'static str, Value)>,
    ) {
        self.unit_of_work
            .borrow_mut()
            .stage_insert(table, id, values);
    }

    pub(crate) fn stage_update(
        &self,
        table: &'static str,
        id: String,
        values: Vec<(&'static str, Value)>,
    ) {
        self.unit_of_work
            .borrow_mut()
            .stage_update(table, id, values);
    }

    pub(crate) fn stage_delete(&self, table: &'static str, id: String) {
        self.unit_of_work.borrow_mut().stage_delete(table, id);
    }

    pub(crate) fn query_rows<T>(
        &self,
        sql: &str,
        params: &[Value],
        mut decode: impl FnMut(&Row<'_>) -> GooResult<T>,
    ) -> GooResult<Vec<T>> {
        self.echo_sql(sql, params);
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut decoded = Vec::new();
        while let Some(row) = rows.next()? {
            decoded.push(decode(row)?);
        }
        Ok(decoded)
    }

    fn flush(&self, writes: &[PendingWrite]) -> GooResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        for write in writes {
            let (sql, params) = write.statement();
            self.echo_sql(&sql, &params);
            let changed = tx.execute(&sql, params_from_iter(params.iter()))?;
            if changed > 0 {
                continue;
            }
            match write.kind {
                WriteKind::Update => {
                    return Err(GooError::StaleRow {
                        table: write.table,
                        id: write.id.clone(),
                    });
                }
                WriteKind::Delete => warn!(
                    "event=commit module=db status=warn reason=row_missing kind={} table={}",
                    write.kind.as_str(),
                    write.table
                ),
                WriteKind::Insert => {}
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn execute_ddl(
        &self,
        statement: impl Fn(&TableDef) -> &String,
        reverse: bool,
    ) -> GooResult<usize> {
        let registry = self.registry.borrow();
        let conn = self.conn.borrow();
        let mut tables: Vec<&TableDef> = registry.tables.iter().collect();
        if reverse {
            tables.reverse();
        }
        for table in &tables {
            let sql = statement(table);
            self.echo_sql(sql, &[]);
            conn.execute_batch(sql)?;
        }
        Ok(tables.len())
    }

    fn echo_sql(&self, sql: &str, params: &[Value]) {
        if self.echo {
            info!("{}", echo_line(sql, params));
        }
    }
}

/// One `sql_echo` log line; whitespace in `sql` is collapsed to single spaces.
fn echo_line(sql: &str, params: &[Value]) -> String {
    let sql = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("event=sql_echo module=db sql={sql} params={params:?}")
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("url", &self.url)
            .field("echo", &self.echo)
            .field("tables", &self.tables())
            .field("pending_writes", &self.pending_writes())
            .finish()
    }
}
