//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for a catalog-described table.
//!
//! Identifiers are quoted per dialect and must name a catalog column; every literal value is a
//! placeholder carried in `QueryBuf::params`.

use crate::error::AppError;
use crate::query::page::PageRequest;
use serde_json::{Map, Value};

/// Column name the relational adapters address rows by.
pub const ID_COLUMN: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlFlavor {
    Postgres,
    MySql,
}

/// One catalog column. `declared` is what the user sees (`data_type` / `column_type`), `native` the
/// engine type name used for casts (`udt_name` / `data_type`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub declared: String,
    pub native: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, declared: impl Into<String>, native: impl Into<String>) -> Self {
        ColumnMeta {
            name: name.into(),
            declared: declared.into(),
            native: native.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// Postgres types sqlx decodes without help. Anything else is selected as text.
const PG_DECODABLE: &[&str] = &[
    "int2", "int4", "int8", "float4", "float8", "bool", "uuid", "timestamptz", "timestamp", "date",
    "text", "varchar", "bpchar", "name", "json", "jsonb",
];

const MYSQL_DECODABLE: &[&str] = &[
    "tinyint", "smallint", "mediumint", "int", "bigint", "float", "double", "char", "varchar", "tinytext",
    "text", "mediumtext", "longtext", "datetime", "timestamp", "date", "json",
];

fn is_plain_type_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SqlFlavor {
    pub fn quote(&self, ident: &str) -> String {
        match self {
            SqlFlavor::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            SqlFlavor::MySql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// `$n::type` for Postgres so text and json binds coerce to the column type; `?` for MySQL.
    fn placeholder(&self, n: u32, col: Option<&ColumnMeta>) -> String {
        match self {
            SqlFlavor::Postgres => match col {
                Some(c) if is_plain_type_name(&c.native) => format!("${}::{}", n, c.native),
                _ => format!("${}", n),
            },
            SqlFlavor::MySql => "?".to_string(),
        }
    }

    fn search_predicate(&self, col: &ColumnMeta, n: u32) -> String {
        match self {
            SqlFlavor::Postgres => format!("CAST({} AS TEXT) ILIKE ${}", self.quote(&col.name), n),
            SqlFlavor::MySql => format!("CAST({} AS CHAR) LIKE ?", self.quote(&col.name)),
        }
    }

    fn select_expr(&self, col: &ColumnMeta) -> String {
        let q = self.quote(&col.name);
        match self {
            SqlFlavor::Postgres => {
                if PG_DECODABLE.contains(&col.native.as_str()) {
                    q
                } else {
                    format!("{}::text AS {}", q, q)
                }
            }
            SqlFlavor::MySql => {
                let native = col.native.to_lowercase();
                let unsigned = col.declared.to_lowercase().contains("unsigned");
                if MYSQL_DECODABLE.contains(&native.as_str()) && !unsigned {
                    q
                } else {
                    format!("CAST({} AS CHAR) AS {}", q, q)
                }
            }
        }
    }

    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            SqlFlavor::Postgres => {
                "SELECT table_name::text AS table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name"
            }
            SqlFlavor::MySql => {
                "SELECT CAST(table_name AS CHAR) AS table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name"
            }
        }
    }

    /// Catalog columns of one table in ordinal order. Single parameter: the table name.
    /// Result columns: `column_name`, `declared`, `native`.
    pub fn columns_sql(&self) -> &'static str {
        match self {
            SqlFlavor::Postgres => {
                "SELECT column_name::text AS column_name, data_type::text AS declared, udt_name::text AS native \
                 FROM information_schema.columns WHERE table_schema = 'public' AND table_name = $1 \
                 ORDER BY ordinal_position"
            }
            SqlFlavor::MySql => {
                "SELECT CAST(column_name AS CHAR) AS column_name, CAST(column_type AS CHAR) AS declared, \
                 CAST(data_type AS CHAR) AS native FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
            }
        }
    }
}

/// Table name plus its catalog columns. All builders go through this so unknown fields are rejected.
pub struct TableShape<'a> {
    pub flavor: SqlFlavor,
    pub table: &'a str,
    pub columns: &'a [ColumnMeta],
}

impl<'a> TableShape<'a> {
    pub fn new(flavor: SqlFlavor, table: &'a str, columns: &'a [ColumnMeta]) -> Self {
        TableShape { flavor, table, columns }
    }

    fn column(&self, name: &str) -> Option<&'a ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn known_column(&self, name: &str) -> Result<&'a ColumnMeta, AppError> {
        self.column(name)
            .ok_or_else(|| AppError::Validation(format!("unknown field '{}' for {}", name, self.table)))
    }

    fn id_column(&self) -> Result<&'a ColumnMeta, AppError> {
        self.column(ID_COLUMN)
            .ok_or_else(|| AppError::Validation(format!("{} has no '{}' column", self.table, ID_COLUMN)))
    }

    fn table(&self) -> String {
        self.flavor.quote(self.table)
    }

    fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| self.flavor.select_expr(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Data query and count query sharing one WHERE clause. Search ORs a LIKE over every column.
    pub fn select_page(&self, req: &PageRequest) -> Result<(QueryBuf, QueryBuf), AppError> {
        let mut data = QueryBuf::new();
        let mut count = QueryBuf::new();
        let mut where_clause = String::new();
        if let Some(term) = &req.search {
            let pattern = format!("%{}%", escape_like(term));
            let mut ors = Vec::with_capacity(self.columns.len());
            for c in self.columns {
                let n = data.push_param(Value::String(pattern.clone()));
                count.push_param(Value::String(pattern.clone()));
                ors.push(self.flavor.search_predicate(c, n));
            }
            if !ors.is_empty() {
                where_clause = format!(" WHERE ({})", ors.join(" OR "));
            }
        }
        let order_clause = match &req.sort {
            Some(sort) => {
                let c = self.known_column(&sort.field)?;
                format!(" ORDER BY {} {}", self.flavor.quote(&c.name), sort.direction.sql())
            }
            None => String::new(),
        };
        data.sql = format!(
            "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
            self.select_list(),
            self.table(),
            where_clause,
            order_clause,
            req.limit,
            req.offset()
        );
        count.sql = format!("SELECT COUNT(*) AS total FROM {}{}", self.table(), where_clause);
        Ok((data, count))
    }

    /// SELECT by `id`. Caller's id is the sole param.
    pub fn select_by_id(&self, id: &str) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let id_col = self.id_column()?;
        let n = q.push_param(Value::String(id.to_string()));
        q.sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.select_list(),
            self.table(),
            self.flavor.quote(&id_col.name),
            self.flavor.placeholder(n, Some(id_col))
        );
        Ok(q)
    }

    /// INSERT of the supplied fields. Stamps `created_at` with the server time when the table has it
    /// and the caller did not supply it. Postgres returns the generated `id`.
    pub fn insert(&self, fields: &Map<String, Value>) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let mut cols = Vec::new();
        let mut values = Vec::new();
        for (k, v) in fields {
            let c = self.known_column(k)?;
            let n = q.push_param(v.clone());
            cols.push(self.flavor.quote(&c.name));
            values.push(self.flavor.placeholder(n, Some(c)));
        }
        if !fields.contains_key(CREATED_AT) {
            if let Some(c) = self.column(CREATED_AT) {
                cols.push(self.flavor.quote(&c.name));
                values.push("CURRENT_TIMESTAMP".to_string());
            }
        }
        let returning = match (self.flavor, self.column(ID_COLUMN)) {
            (SqlFlavor::Postgres, Some(id)) => format!(" RETURNING {}", self.flavor.select_expr(id)),
            _ => String::new(),
        };
        q.sql = if cols.is_empty() {
            match self.flavor {
                SqlFlavor::Postgres => format!("INSERT INTO {} DEFAULT VALUES{}", self.table(), returning),
                SqlFlavor::MySql => format!("INSERT INTO {} () VALUES ()", self.table()),
            }
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}){}",
                self.table(),
                cols.join(", "),
                values.join(", "),
                returning
            )
        };
        Ok(q)
    }

    /// UPDATE by `id`: SET only the supplied fields (never `id`). Stamps `updated_at` unless supplied.
    pub fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let id_col = self.id_column()?;
        let mut sets = Vec::new();
        for (k, v) in fields {
            if k == ID_COLUMN {
                continue;
            }
            let c = self.known_column(k)?;
            let n = q.push_param(v.clone());
            sets.push(format!(
                "{} = {}",
                self.flavor.quote(&c.name),
                self.flavor.placeholder(n, Some(c))
            ));
        }
        if sets.is_empty() {
            return Err(AppError::Validation("no fields to update".into()));
        }
        if !fields.contains_key(UPDATED_AT) {
            if let Some(c) = self.column(UPDATED_AT) {
                sets.push(format!("{} = CURRENT_TIMESTAMP", self.flavor.quote(&c.name)));
            }
        }
        let n = q.push_param(Value::String(id.to_string()));
        q.sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table(),
            sets.join(", "),
            self.flavor.quote(&id_col.name),
            self.flavor.placeholder(n, Some(id_col))
        );
        Ok(q)
    }

    /// Existence check by `id`, used to tell "matched but unchanged" from "missing".
    pub fn exists_by_id(&self, id: &str) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let id_col = self.id_column()?;
        let n = q.push_param(Value::String(id.to_string()));
        q.sql = format!(
            "SELECT COUNT(*) AS total FROM {} WHERE {} = {}",
            self.table(),
            self.flavor.quote(&id_col.name),
            self.flavor.placeholder(n, Some(id_col))
        );
        Ok(q)
    }

    /// DELETE by `id`.
    pub fn delete(&self, id: &str) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let id_col = self.id_column()?;
        let n = q.push_param(Value::String(id.to_string()));
        q.sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.table(),
            self.flavor.quote(&id_col.name),
            self.flavor.placeholder(n, Some(id_col))
        );
        Ok(q)
    }
}

/// Escape LIKE wildcards so the search term matches literally (backslash is the default escape).
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::page::{SortDirection, SortSpec};
    use serde_json::json;

    fn pg_columns() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::new("id", "integer", "int4"),
            ColumnMeta::new("name", "character varying", "varchar"),
            ColumnMeta::new("price", "numeric", "numeric"),
            ColumnMeta::new("created_at", "timestamp with time zone", "timestamptz"),
            ColumnMeta::new("updated_at", "timestamp with time zone", "timestamptz"),
        ]
    }

    fn my_columns() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::new("id", "bigint unsigned", "bigint"),
            ColumnMeta::new("name", "varchar(255)", "varchar"),
        ]
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn postgres_page_uses_numbered_placeholders_and_shared_filter() {
        let cols = pg_columns();
        let shape = TableShape::new(SqlFlavor::Postgres, "widgets", &cols);
        let req = PageRequest {
            page: 2,
            limit: 5,
            search: Some("ab%".into()),
            sort: Some(SortSpec {
                field: "name".into(),
                direction: SortDirection::Desc,
            }),
        };
        let (data, count) = shape.select_page(&req).unwrap();
        assert!(data.sql.starts_with(
            "SELECT \"id\", \"name\", \"price\"::text AS \"price\", \"created_at\", \"updated_at\" FROM \"widgets\" WHERE ("
        ));
        assert!(data.sql.contains("CAST(\"name\" AS TEXT) ILIKE $2"));
        assert!(data.sql.contains("CAST(\"updated_at\" AS TEXT) ILIKE $5"));
        assert!(data.sql.ends_with(" ORDER BY \"name\" DESC LIMIT 5 OFFSET 5"));
        assert_eq!(data.params.len(), 5);
        assert_eq!(data.params[0], json!("%ab\\%%"));
        assert!(count.sql.starts_with("SELECT COUNT(*) AS total FROM \"widgets\" WHERE ("));
        assert!(!count.sql.contains("LIMIT"));
        assert_eq!(count.params, data.params);
    }

    #[test]
    fn mysql_page_uses_question_marks_and_backticks() {
        let cols = my_columns();
        let shape = TableShape::new(SqlFlavor::MySql, "widgets", &cols);
        let req = PageRequest {
            search: Some("x".into()),
            ..PageRequest::default()
        };
        let (data, _) = shape.select_page(&req).unwrap();
        assert_eq!(
            data.sql,
            "SELECT CAST(`id` AS CHAR) AS `id`, `name` FROM `widgets` \
             WHERE (CAST(`id` AS CHAR) LIKE ? OR CAST(`name` AS CHAR) LIKE ?) LIMIT 10 OFFSET 0"
        );
    }

    #[test]
    fn unknown_sort_or_field_is_rejected() {
        let cols = pg_columns();
        let shape = TableShape::new(SqlFlavor::Postgres, "widgets", &cols);
        let req = PageRequest {
            sort: Some(SortSpec {
                field: "name; DROP TABLE widgets".into(),
                direction: SortDirection::Asc,
            }),
            ..PageRequest::default()
        };
        assert!(matches!(shape.select_page(&req), Err(AppError::Validation(_))));
        assert!(matches!(
            shape.insert(&obj(json!({"nope": 1}))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn insert_stamps_created_at_and_returns_id() {
        let cols = pg_columns();
        let shape = TableShape::new(SqlFlavor::Postgres, "widgets", &cols);
        let q = shape.insert(&obj(json!({"name": "a"}))).unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO \"widgets\" (\"name\", \"created_at\") VALUES ($1::varchar, CURRENT_TIMESTAMP) RETURNING \"id\""
        );
        assert_eq!(q.params, vec![json!("a")]);

        let q = shape.insert(&Map::new()).unwrap();
        assert!(q.sql.starts_with("INSERT INTO \"widgets\" (\"created_at\") VALUES (CURRENT_TIMESTAMP)"));

        let cols = my_columns();
        let shape = TableShape::new(SqlFlavor::MySql, "widgets", &cols);
        assert_eq!(shape.insert(&Map::new()).unwrap().sql, "INSERT INTO `widgets` () VALUES ()");
    }

    #[test]
    fn update_skips_id_and_stamps_updated_at() {
        let cols = pg_columns();
        let shape = TableShape::new(SqlFlavor::Postgres, "widgets", &cols);
        let q = shape.update("7", &obj(json!({"id": 9, "name": "b"}))).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"widgets\" SET \"name\" = $1::varchar, \"updated_at\" = CURRENT_TIMESTAMP WHERE \"id\" = $2::int4"
        );
        assert_eq!(q.params, vec![json!("b"), json!("7")]);
        assert!(matches!(
            shape.update("7", &obj(json!({"id": 9}))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn delete_and_select_address_the_id_column() {
        let cols = my_columns();
        let shape = TableShape::new(SqlFlavor::MySql, "widgets", &cols);
        assert_eq!(shape.delete("3").unwrap().sql, "DELETE FROM `widgets` WHERE `id` = ?");
        let no_id = vec![ColumnMeta::new("name", "text", "text")];
        let shape = TableShape::new(SqlFlavor::Postgres, "tags", &no_id);
        assert!(shape.select_by_id("1").is_err());
    }

    #[test]
    fn quoting_escapes_embedded_quote_characters() {
        assert_eq!(SqlFlavor::Postgres.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(SqlFlavor::MySql.quote("a`b"), "`a``b`");
    }
}
