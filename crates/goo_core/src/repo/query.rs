//! Selector types and `SELECT` composition for `get` / `list`.
//!
//! # Invariants
//! - `get` precedence: non-empty `id`, then non-empty `filter`, then
//!   non-empty `filter_by`.
//! - `list` precedence: non-empty `filter_by`, then non-empty `filter`.
//! - Every referenced field must exist in the entity schema; values are
//!   always bound as parameters, never interpolated.

use crate::model::entity::Entity;
use crate::model::schema::{quote_ident, EntitySchema, FieldError, ID_FIELD};
use crate::model::value::{FieldMap, Value};

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    IsNull,
    IsNotNull,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

/// One column expression; a `filter` is the conjunction of its conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Le, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Ge, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, Op::Like, Value::Text(pattern.into()))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, Op::IsNull, Value::Null)
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, Op::IsNotNull, Value::Null)
    }
}

/// Sort direction of `list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// `"DESC"` in any case is descending; anything else is ascending.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl From<&str> for SortOrder {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// Selector of `Entity::get`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetQuery {
    pub id: Option<String>,
    pub filter: Vec<Condition>,
    pub filter_by: FieldMap,
}

impl GetQuery {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_filter(filter: Vec<Condition>) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn by_fields(filter_by: FieldMap) -> Self {
        Self {
            filter_by,
            ..Self::default()
        }
    }

    pub(crate) fn selector(&self) -> Selector<'_> {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => Selector::Id(id),
            _ if !self.filter.is_empty() => Selector::Filter(&self.filter),
            _ if !self.filter_by.is_empty() => Selector::FilterBy(&self.filter_by),
            _ => Selector::All,
        }
    }
}

/// Selector, ordering and limit of `Entity::list`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Vec<Condition>,
    pub filter_by: FieldMap,
    /// Field to sort by; `id` when unset.
    pub order_by: Option<String>,
    pub order: SortOrder,
    /// `None` and `Some(0)` both mean unlimited.
    pub limit: Option<u32>,
}

impl ListQuery {
    pub(crate) fn selector(&self) -> Selector<'_> {
        if !self.filter_by.is_empty() {
            Selector::FilterBy(&self.filter_by)
        } else if !self.filter.is_empty() {
            Selector::Filter(&self.filter)
        } else {
            Selector::All
        }
    }

    pub(crate) fn effective_limit(&self) -> Option<u32> {
        self.limit.filter(|limit| *limit > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Selector<'a> {
    All,
    Id(&'a str),
    Filter(&'a [Condition]),
    FilterBy(&'a FieldMap),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

pub(crate) fn compose_select<E: Entity>(
    schema: &EntitySchema<E>,
    selector: Selector<'_>,
    order: Option<(&'static str, SortOrder)>,
    limit: Option<u32>,
) -> Result<SelectStatement, FieldError> {
    let mut sql = format!(
        "SELECT {} FROM {}",
        schema.column_list(),
        quote_ident(schema.table())
    );
    let mut params = Vec::new();
    let mut predicates = Vec::new();

    match selector {
        Selector::All => {}
        Selector::Id(id) => {
            predicates.push(format!("{} = ?", quote_ident(ID_FIELD)));
            params.push(Value::Text(id.to_string()));
        }
        Selector::Filter(conditions) => {
            for condition in conditions {
                let field = schema.require_field(&condition.field)?;
                push_predicate(
                    &mut predicates,
                    &mut params,
                    field.name(),
                    condition.op,
                    &condition.value,
                );
            }
        }
        Selector::FilterBy(fields) => {
            for (name, value) in fields {
                let field = schema.require_field(name)?;
                push_predicate(&mut predicates, &mut params, field.name(), Op::Eq, value);
            }
        }
    }

    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }

    if let Some((field, direction)) = order {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            quote_ident(field),
            direction.keyword()
        ));
    }

    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(Value::Integer(i64::from(limit)));
    }

    Ok(SelectStatement { sql, params })
}

fn push_predicate(
    predicates: &mut Vec<String>,
    params: &mut Vec<Value>,
    column: &str,
    op: Op,
    value: &Value,
) {
    let column = quote_ident(column);
    // Equality against NULL never matches in SQL; map it to IS [NOT] NULL.
    let op = match (op, value) {
        (Op::Eq, Value::Null) => Op::IsNull,
        (Op::Ne, Value::Null) => Op::IsNotNull,
        (op, _) => op,
    };
    match op {
        Op::IsNull | Op::IsNotNull => predicates.push(format!("{column} {}", op.sql())),
        _ => {
            predicates.push(format!("{column} {} ?", op.sql()));
            params.push(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compose_select, Condition, GetQuery, ListQuery, Selector, SortOrder};
    use crate::model::entity::{Entity, EntityCore};
    use crate::model::schema::{FieldDef, FieldError, SchemaBuilder};
    use crate::model::value::{FieldMap, Value};

    #[derive(Debug, Default)]
    struct Ticket {
        core: EntityCore,
        title: String,
        priority: Option<i64>,
    }

    impl Entity for Ticket {
        fn schema() -> SchemaBuilder<Self> {
            SchemaBuilder::new("ticket")
                .field(FieldDef::new("title", |t: &Ticket| &t.title, |t: &mut Ticket| &mut t.title))
                .field(FieldDef::new(
                    "priority",
                    |t: &Ticket| &t.priority,
                    |t: &mut Ticket| &mut t.priority,
                ))
        }

        fn core(&self) -> &EntityCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut EntityCore {
            &mut self.core
        }
    }

    fn by_title(title: &str) -> FieldMap {
        FieldMap::from([("title".to_string(), Value::from(title))])
    }

    #[test]
    fn sort_order_parse_is_case_insensitive_and_defaults_to_asc() {
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("desc"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("ASC"), SortOrder::Asc);
        assert_eq!(SortOrder::parse("sideways"), SortOrder::Asc);
        assert_eq!(SortOrder::from(""), SortOrder::Asc);
    }

    #[test]
    fn get_selector_prefers_id_then_filter_then_filter_by() {
        let conditions = vec![Condition::eq("title", "a")];
        let query = GetQuery {
            id: Some("abc".to_string()),
            filter: conditions.clone(),
            filter_by: by_title("b"),
        };
        assert_eq!(query.selector(), Selector::Id("abc"));

        let query = GetQuery {
            id: Some(String::new()),
            ..query
        };
        assert_eq!(query.selector(), Selector::Filter(&conditions));

        let query = GetQuery {
            filter: Vec::new(),
            ..query
        };
        assert!(matches!(query.selector(), Selector::FilterBy(_)));
        assert_eq!(GetQuery::default().selector(), Selector::All);
    }

    #[test]
    fn list_selector_prefers_filter_by_over_filter() {
        let query = ListQuery {
            filter: vec![Condition::eq("title", "a")],
            filter_by: by_title("b"),
            ..ListQuery::default()
        };
        assert!(matches!(query.selector(), Selector::FilterBy(_)));

        let query = ListQuery {
            filter_by: FieldMap::new(),
            ..query
        };
        assert!(matches!(query.selector(), Selector::Filter(_)));
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let query = ListQuery {
            limit: Some(0),
            ..ListQuery::default()
        };
        assert_eq!(query.effective_limit(), None);
        let query = ListQuery {
            limit: Some(3),
            ..ListQuery::default()
        };
        assert_eq!(query.effective_limit(), Some(3));
    }

    #[test]
    fn compose_select_binds_filters_order_and_limit() {
        let schema = Ticket::schema().build().unwrap();
        let conditions = vec![
            Condition::ge("priority", 2_i64),
            Condition::like("title", "bug%"),
        ];
        let statement = compose_select(
            &schema,
            Selector::Filter(&conditions),
            Some(("priority", SortOrder::Desc)),
            Some(5),
        )
        .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT \"id\", \"title\", \"priority\" FROM \"ticket\" \
             WHERE \"priority\" >= ? AND \"title\" LIKE ? \
             ORDER BY \"priority\" DESC LIMIT ?"
        );
        assert_eq!(
            statement.params,
            vec![Value::Integer(2), Value::from("bug%"), Value::Integer(5)]
        );
    }

    #[test]
    fn compose_select_maps_null_equality_to_is_null() {
        let schema = Ticket::schema().build().unwrap();
        let fields = FieldMap::from([("priority".to_string(), Value::Null)]);
        let statement =
            compose_select(&schema, Selector::FilterBy(&fields), None, None).unwrap();
        assert!(statement.sql.ends_with("WHERE \"priority\" IS NULL"));
        assert!(statement.params.is_empty());
    }

    #[test]
    fn compose_select_rejects_unknown_fields() {
        let schema = Ticket::schema().build().unwrap();
        let fields = by_title("x");
        let mut with_unknown = fields.clone();
        with_unknown.insert("owner".to_string(), Value::from("me"));

        let err = compose_select(&schema, Selector::FilterBy(&with_unknown), None, None)
            .unwrap_err();
        assert_eq!(
            err,
            FieldError::UnknownField {
                table: "ticket",
                field: "owner".to_string()
            }
        );
    }
}
