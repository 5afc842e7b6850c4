#![allow(dead_code)]

use chrono::{DateTime, Utc};
use goo_core::{clock, Entity, EntityCore, FieldDef, FieldMap, SchemaBuilder, Store, Value};

#[derive(Debug, Default)]
pub struct TestObject {
    pub core: EntityCore,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub counter: Option<i64>,
}

impl Entity for TestObject {
    fn schema() -> SchemaBuilder<Self> {
        SchemaBuilder::new("test_object")
            .field(
                FieldDef::new("name", |o: &TestObject| &o.name, |o: &mut TestObject| &mut o.name)
                    .indexed(),
            )
            .field(
                FieldDef::new(
                    "created_at",
                    |o: &TestObject| &o.created_at,
                    |o: &mut TestObject| &mut o.created_at,
                )
                .with_default(clock::utcnow_value),
            )
            .field(
                FieldDef::new(
                    "counter",
                    |o: &TestObject| &o.counter,
                    |o: &mut TestObject| &mut o.counter,
                )
                .with_default(|| Value::Integer(1)),
            )
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }
}

/// In-memory store with `TestObject` registered and its table created.
pub fn memory_store() -> Store {
    let store = Store::init(":memory:", false).unwrap();
    store.register::<TestObject>().unwrap();
    store.create_all().unwrap();
    store
}

pub fn fields(pairs: &[(&str, Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
