//! Pending writes tracked between two commits.
//!
//! # Invariants
//! - At most one insert/update entry exists per `(table, id)`; later staging
//!   merges into it.
//! - Deleting a row whose insert is still pending drops the insert instead of
//!   issuing SQL.
//! - Writes flush in staging order.

use crate::model::schema::{quote_ident, ID_FIELD};
use crate::model::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Insert,
    Update,
    Delete,
}

impl WriteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingWrite {
    pub table: &'static str,
    pub id: String,
    pub kind: WriteKind,
    pub values: Vec<(&'static str, Value)>,
}

impl PendingWrite {
    fn is_for(&self, table: &str, id: &str) -> bool {
        self.table == table && self.id == id
    }

    /// SQL text and bound parameters for this write.
    pub fn statement(&self) -> (String, Vec<Value>) {
        let table = quote_ident(self.table);
        let id_column = quote_ident(ID_FIELD);
        match self.kind {
            WriteKind::Insert => {
                let columns = self
                    .values
                    .iter()
                    .map(|(name, _)| quote_ident(name))
                    .collect::<Vec<_>>()
                    .join(", ");
                let placeholders = vec!["?"; self.values.len()].join(", ");
                let params = self.values.iter().map(|(_, value)| value.clone()).collect();
                (
                    format!("INSERT INTO {table} ({columns}) VALUES ({placeholders});"),
                    params,
                )
            }
            WriteKind::Update => {
                let assignments = self
                    .values
                    .iter()
                    .map(|(name, _)| format!("{} = ?", quote_ident(name)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut params: Vec<Value> =
                    self.values.iter().map(|(_, value)| value.clone()).collect();
                params.push(Value::Text(self.id.clone()));
                (
                    format!("UPDATE {table} SET {assignments} WHERE {id_column} = ?;"),
                    params,
                )
            }
            WriteKind::Delete => (
                format!("DELETE FROM {table} WHERE {id_column} = ?;"),
                vec![Value::Text(self.id.clone())],
            ),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct UnitOfWork {
    writes: Vec<PendingWrite>,
}

impl UnitOfWork {
    fn last_for(&self, table: &str, id: &str) -> Option<(usize, WriteKind)> {
        self.writes
            .iter()
            .enumerate()
            .rev()
            .find(|(_, write)| write.is_for(table, id))
            .map(|(index, write)| (index, write.kind))
    }

    pub fn stage_insert(&mut self, table: &'static str, id: String, values: Vec<(&'static str, Value)>) {
        match self.last_for(table, &id) {
            Some((index, WriteKind::Insert)) => self.writes[index].values = values,
            _ => self.writes.push(PendingWrite {
                table,
                id,
                kind: WriteKind::Insert,
                values,
            }),
        }
    }

    pub fn stage_update(&mut self, table: &'static str, id: String, values: Vec<(&'static str, Value)>) {
        if values.is_empty() {
            return;
        }
        match self.last_for(table, &id) {
            Some((index, WriteKind::Insert | WriteKind::Update)) => {
                merge_values(&mut self.writes[index].values, values);
            }
            Some((_, WriteKind::Delete)) => {}
            None => self.writes.push(PendingWrite {
                table,
                id,
                kind: WriteKind::Update,
                values,
            }),
        }
    }

    pub fn stage_delete(&mut self, table: &'static str, id: String) {
        match self.last_for(table, &id) {
            Some((index, WriteKind::Insert)) => {
                self.writes.remove(index);
            }
            Some((_, WriteKind::Delete)) => {}
            Some((index, WriteKind::Update)) => {
                self.writes.remove(index);
                self.push_delete(table, id);
            }
            None => self.push_delete(table, id),
        }
    }

    fn push_delete(&mut self, table: &'static str, id: String) {
        self.writes.push(PendingWrite {
            table,
            id,
            kind: WriteKind::Delete,
            values: Vec::new(),
        });
    }

    pub fn has_insert(&self, table: &str, id: &str) -> bool {
        self.writes
            .iter()
            .rev()
            .find(|write| write.is_for(table, id))
            .is_some_and(|write| write.kind == WriteKind::Insert)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn take(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.writes)
    }
}

fn merge_values(target: &mut Vec<(&'static str, Value)>, changes: Vec<(&'static str, Value)>) {
    for (name, value) in changes {
        match target.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => target.push((name, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{UnitOfWork, WriteKind};
    use crate::model::value::Value;

    fn row(name: &str) -> Vec<(&'static str, Value)> {
        vec![("id", Value::from("a")), ("name", Value::from(name))]
    }

    #[test]
    fn update_after_insert_merges_into_insert() {
        let mut uow = UnitOfWork::default();
        uow.stage_insert("person", "a".to_string(), row("john"));
        uow.stage_update("person", "a".to_string(), vec![("name", Value::from("jane"))]);

        let writes = uow.take();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].kind, WriteKind::Insert);
        assert_eq!(writes[0].values[1], ("name", Value::from("jane")));
    }

    #[test]
    fn delete_of_pending_insert_cancels_it() {
        let mut uow = UnitOfWork::default();
        uow.stage_insert("person", "a".to_string(), row("john"));
        assert!(uow.has_insert("person", "a"));

        uow.stage_delete("person", "a".to_string());
        assert!(!uow.has_insert("person", "a"));
        assert_eq!(uow.len(), 0);
    }

    #[test]
    fn delete_replaces_pending_update() {
        let mut uow = UnitOfWork::default();
        uow.stage_update("person", "a".to_string(), vec![("name", Value::from("x"))]);
        uow.stage_delete("person", "a".to_string());
        uow.stage_update("person", "a".to_string(), vec![("name", Value::from("y"))]);

        let writes = uow.take();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].kind, WriteKind::Delete);
    }

    #[test]
    fn empty_update_is_not_staged() {
        let mut uow = UnitOfWork::default();
        uow.stage_update("person", "a".to_string(), Vec::new());
        assert_eq!(uow.len(), 0);
    }

    #[test]
    fn statements_bind_values_and_trailing_id() {
        let mut uow = UnitOfWork::default();
        uow.stage_insert("person", "a".to_string(), row("john"));
        uow.stage_update("person", "b".to_string(), vec![("name", Value::from("jane"))]);
        uow.stage_delete("person", "c".to_string());

        let statements: Vec<_> = uow.take().iter().map(|write| write.statement()).collect();
        assert_eq!(
            statements[0].0,
            "INSERT INTO \"person\" (\"id\", \"name\") VALUES (?, ?);"
        );
        assert_eq!(
            statements[1],
            (
                "UPDATE \"person\" SET \"name\" = ? WHERE \"id\" = ?;".to_string(),
                vec![Value::from("jane"), Value::from("b")]
            )
        );
        assert_eq!(
            statements[2].0,
            "DELETE FROM \"person\" WHERE \"id\" = ?;"
        );
    }
}
