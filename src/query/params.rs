//! Convert serde_json::Value to types that sqlx can bind, for either SQL dialect.

use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A value that can be bound to a relational query. Converts from serde_json::Value.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Json(Value),
}

impl BindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::I64(i)
                } else if n.is_u64() {
                    // above i64::MAX
                    BindValue::String(n.to_string())
                } else {
                    BindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => BindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => BindValue::Json(v.clone()),
        }
    }

    /// Bind onto a Postgres query. Placeholders carry an explicit `::type` cast, so the wire type only
    /// needs to be castable to the column type.
    pub fn bind_pg<'q>(self, q: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            BindValue::Null => q.bind(Option::<String>::None),
            BindValue::Bool(b) => q.bind(b),
            BindValue::I64(n) => q.bind(n),
            BindValue::F64(n) => q.bind(n),
            BindValue::String(s) => q.bind(s),
            BindValue::Json(v) => q.bind(sqlx::types::Json(v)),
        }
    }

    pub fn bind_mysql<'q>(self, q: Query<'q, MySql, MySqlArguments>) -> Query<'q, MySql, MySqlArguments> {
        match self {
            BindValue::Null => q.bind(Option::<String>::None),
            BindValue::Bool(b) => q.bind(b),
            BindValue::I64(n) => q.bind(n),
            BindValue::F64(n) => q.bind(n),
            BindValue::String(s) => q.bind(s),
            BindValue::Json(v) => q.bind(sqlx::types::Json(v)),
        }
    }
}
