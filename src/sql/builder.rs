//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for a schema type.

use crate::query::{FilterExpr, OrderBy};
use crate::schema::{Instance, ScalarType, SchemaType};
use crate::store::StoreQuery;
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: names only come from the schema).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(ty: &SchemaType, default_schema: &str) -> String {
    format!(
        "{}.{}",
        quoted(ty.schema.as_deref().unwrap_or(default_schema)),
        quoted(&ty.table)
    )
}

/// A bound parameter and the column type it is cast to.
#[derive(Clone, Debug)]
pub struct Param {
    pub value: Value,
    pub cast: &'static str,
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Param>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its `$n::type` placeholder.
    fn push_param(&mut self, value: Value, cast: &'static str) -> String {
        self.params.push(Param { value, cast });
        format!("${}::{}", self.params.len(), cast)
    }
}

/// Column type for a schema member; complex values are stored as jsonb.
fn column_cast(ty: &SchemaType, name: &str) -> &'static str {
    ty.property(name)
        .map(|p| p.scalar_type.pg_type())
        .unwrap_or("jsonb")
}

/// SELECT list: numeric as text so decoding keeps every digit.
fn select_column_list(ty: &SchemaType) -> String {
    ty.properties
        .iter()
        .map(|p| {
            let q = quoted(&p.name);
            if p.scalar_type == ScalarType::Decimal {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .chain(ty.complex_properties.iter().map(|c| quoted(&c.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_column(ty: &SchemaType) -> &str {
    ty.key.first().map(String::as_str).unwrap_or("id")
}

/// SELECT by primary key (single column key only).
pub fn select_by_key(ty: &SchemaType, schema: &str, key: &Value) -> QueryBuf {
    select_where_eq(ty, schema, key_column(ty), key)
}

/// SELECT rows where one column equals a value.
pub fn select_where_eq(ty: &SchemaType, schema: &str, column: &str, value: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let placeholder = q.push_param(value.clone(), column_cast(ty, column));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(ty),
        qualified_table(ty, schema),
        quoted(column),
        placeholder
    );
    q
}

fn push_filter(q: &mut QueryBuf, filter: &FilterExpr) -> String {
    match filter {
        FilterExpr::Compare {
            property,
            scalar_type,
            op,
            value,
        } => {
            let col = quoted(property);
            if value.is_null() {
                return match op {
                    crate::query::CompareOp::Eq => format!("{} IS NULL", col),
                    crate::query::CompareOp::Ne => format!("{} IS NOT NULL", col),
                    _ => "FALSE".to_string(),
                };
            }
            let placeholder = q.push_param(value.clone(), scalar_type.pg_type());
            format!("{} {} {}", col, op.sql(), placeholder)
        }
        FilterExpr::And(a, b) => {
            let (a, b) = (push_filter(q, a), push_filter(q, b));
            format!("({} AND {})", a, b)
        }
        FilterExpr::Or(a, b) => {
            let (a, b) = (push_filter(q, a), push_filter(q, b));
            format!("({} OR {})", a, b)
        }
        FilterExpr::Not(e) => format!("NOT ({})", push_filter(q, e)),
    }
}

fn order_clause(order_by: &[OrderBy], ty: &SchemaType) -> String {
    if order_by.is_empty() {
        return format!(" ORDER BY {}", quoted(key_column(ty)));
    }
    let parts: Vec<String> = order_by
        .iter()
        .map(|o| {
            format!(
                "{} {}",
                quoted(&o.property),
                if o.descending { "DESC" } else { "ASC" }
            )
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// SELECT with filter, ordering and paging.
pub fn select_list(ty: &SchemaType, schema: &str, query: &StoreQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sql = format!("SELECT {} FROM {}", select_column_list(ty), qualified_table(ty, schema));
    if let Some(filter) = &query.filter {
        let clause = push_filter(&mut q, filter);
        sql.push_str(&format!(" WHERE {}", clause));
    }
    sql.push_str(&order_clause(&query.order_by, ty));
    if let Some(top) = query.top {
        sql.push_str(&format!(" LIMIT {}", top));
    }
    if let Some(skip) = query.skip {
        sql.push_str(&format!(" OFFSET {}", skip));
    }
    q.sql = sql;
    q
}

pub fn count(ty: &SchemaType, schema: &str, filter: Option<&FilterExpr>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sql = format!("SELECT COUNT(*) FROM {}", qualified_table(ty, schema));
    if let Some(filter) = filter {
        let clause = push_filter(&mut q, filter);
        sql.push_str(&format!(" WHERE {}", clause));
    }
    q.sql = sql;
    q
}

/// INSERT every stored member present in `row`.
pub fn insert(ty: &SchemaType, schema: &str, row: &Instance) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, value) in ty.row_values(row) {
        let cast = column_cast(ty, &name);
        cols.push(quoted(&name));
        placeholders.push(q.push_param(value, cast));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table(ty, schema),
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// UPDATE the given columns of one row by key.
pub fn update(ty: &SchemaType, schema: &str, key: &Value, values: &Instance) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (name, value) in ty.row_values(values) {
        let cast = column_cast(ty, &name);
        let placeholder = q.push_param(value, cast);
        sets.push(format!("{} = {}", quoted(&name), placeholder));
    }
    let key_col = key_column(ty);
    let key_placeholder = q.push_param(key.clone(), column_cast(ty, key_col));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        qualified_table(ty, schema),
        sets.join(", "),
        quoted(key_col),
        key_placeholder
    );
    q
}

pub fn delete(ty: &SchemaType, schema: &str, key: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let key_col = key_column(ty);
    let placeholder = q.push_param(key.clone(), column_cast(ty, key_col));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        qualified_table(ty, schema),
        quoted(key_col),
        placeholder
    );
    q
}

/// Next value of the sequence behind an integer key column.
pub fn next_key(ty: &SchemaType, schema: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = q.push_param(Value::String(qualified_table(ty, schema)), "text");
    let column = q.push_param(Value::String(key_column(ty).to_string()), "text");
    q.sql = format!("SELECT nextval(pg_get_serial_sequence({}, {}))", table, column);
    q
}
