mod common;

use common::{fields, memory_store, TestObject};
use goo_core::{
    Condition, Entity, EntityBase, FieldError, GetQuery, GooError, ListQuery, SortOrder, Store,
    Value,
};

fn seed(store: &Store, rows: &[(&str, Option<i64>)]) {
    for (name, counter) in rows {
        TestObject::create(
            store,
            fields(&[("name", Value::from(*name)), ("counter", Value::from(*counter))]),
        )
        .unwrap();
    }
    store.commit().unwrap();
}

fn counters(objects: &[TestObject]) -> Vec<Option<i64>> {
    objects.iter().map(|object| object.counter).collect()
}

#[test]
fn order_by_counter_desc_is_non_increasing() {
    let store = memory_store();
    seed(&store, &[("a", Some(3)), ("b", Some(10)), ("c", Some(1)), ("d", Some(7))]);

    let listed = TestObject::list(
        &store,
        &ListQuery {
            order_by: Some("counter".to_string()),
            order: SortOrder::parse("DESC"),
            ..ListQuery::default()
        },
    )
    .unwrap();
    assert_eq!(counters(&listed), vec![Some(10), Some(7), Some(3), Some(1)]);
}

#[test]
fn unrecognized_order_keyword_sorts_ascending() {
    let store = memory_store();
    seed(&store, &[("a", Some(3)), ("b", Some(10)), ("c", Some(1))]);

    let listed = TestObject::list(
        &store,
        &ListQuery {
            order_by: Some("counter".to_string()),
            order: SortOrder::from("sideways"),
            ..ListQuery::default()
        },
    )
    .unwrap();
    assert_eq!(counters(&listed), vec![Some(1), Some(3), Some(10)]);
}

#[test]
fn default_order_is_ascending_id() {
    let store = memory_store();
    seed(&store, &[("a", None), ("b", None), ("c", None), ("d", None)]);

    let ids: Vec<String> = TestObject::list(&store, &ListQuery::default())
        .unwrap()
        .iter()
        .map(|object| object.id().to_string())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn limit_caps_result_length() {
    let store = memory_store();
    seed(&store, &[("a", Some(1)), ("b", Some(2)), ("c", Some(3))]);

    let limited = |limit| {
        TestObject::list(
            &store,
            &ListQuery {
                limit,
                ..ListQuery::default()
            },
        )
        .unwrap()
        .len()
    };
    assert_eq!(limited(Some(2)), 2);
    assert_eq!(limited(Some(10)), 3);
    assert_eq!(limited(Some(0)), 3);
    assert_eq!(limited(None), 3);
}

#[test]
fn list_prefers_filter_by_over_filter() {
    let store = memory_store();
    seed(&store, &[("a", Some(1)), ("b", Some(2)), ("c", Some(3))]);

    let listed = TestObject::list(
        &store,
        &ListQuery {
            filter: vec![Condition::gt("counter", 1)],
            filter_by: fields(&[("name", Value::from("a"))]),
            ..ListQuery::default()
        },
    )
    .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "a");
}

#[test]
fn get_prefers_filter_over_filter_by() {
    let store = memory_store();
    seed(&store, &[("a", Some(1)), ("b", Some(2))]);

    let loaded = TestObject::get(
        &store,
        &GetQuery {
            filter: vec![Condition::eq("name", "b")],
            filter_by: fields(&[("name", Value::from("a"))]),
            ..GetQuery::default()
        },
    )
    .unwrap()
    .unwrap();
    assert_eq!(loaded.name, "b");
}

#[test]
fn get_prefers_id_over_filters() {
    let store = memory_store();
    seed(&store, &[("a", Some(1)), ("b", Some(2))]);
    let a = TestObject::get(
        &store,
        &GetQuery::by_fields(fields(&[("name", Value::from("a"))])),
    )
    .unwrap()
    .unwrap();

    let loaded = TestObject::get(
        &store,
        &GetQuery {
            id: Some(a.id().to_string()),
            filter: vec![Condition::eq("name", "b")],
            ..GetQuery::default()
        },
    )
    .unwrap()
    .unwrap();
    assert_eq!(loaded.name, "a");
}

#[test]
fn filter_conditions_are_combined_with_and() {
    let store = memory_store();
    seed(
        &store,
        &[("alpha", Some(1)), ("alps", Some(5)), ("beta", Some(5)), ("also", None)],
    );

    let listed = TestObject::list(
        &store,
        &ListQuery {
            filter: vec![Condition::like("name", "al%"), Condition::ge("counter", 2)],
            ..ListQuery::default()
        },
    )
    .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "alps");

    let nulls = TestObject::list(
        &store,
        &ListQuery {
            filter_by: fields(&[("counter", Value::Null)]),
            ..ListQuery::default()
        },
    )
    .unwrap();
    assert_eq!(nulls.len(), 1);
    assert_eq!(nulls[0].name, "also");
}

#[test]
fn unknown_filter_or_order_field_is_rejected() {
    let store = memory_store();

    let err = TestObject::list(
        &store,
        &ListQuery {
            order_by: Some("rank".to_string()),
            ..ListQuery::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, GooError::Field(FieldError::UnknownField { .. })));

    let err = TestObject::get(
        &store,
        &GetQuery::by_filter(vec![Condition::is_null("nickname")]),
    )
    .unwrap_err();
    assert!(matches!(err, GooError::Field(FieldError::UnknownField { .. })));
}
