//! PostgreSQL and MySQL adapter. Statements come from `TableShape`, built from the live catalog.

use super::BackendAdapter;
use crate::error::AppError;
use crate::model::{Dialect, FieldInfo};
use crate::query::builder::{TableShape, ID_COLUMN};
use crate::query::{BindValue, ColumnMeta, Page, PageRequest, QueryBuf, SqlFlavor};
use crate::schema::determine_input_type;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlRow};
use sqlx::postgres::{PgArguments, PgPool, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{Column, Row};

#[derive(Clone, Debug)]
pub enum SqlPool {
    Postgres(PgPool),
    MySql(MySqlPool),
}

pub struct RelationalAdapter {
    pool: SqlPool,
}

/// SQLSTATE for malformed literal input (e.g. a non-numeric id against an integer column).
const PG_INVALID_TEXT_REPRESENTATION: &str = "22P02";

fn query_err(e: sqlx::Error) -> AppError {
    if let Some(db) = e.as_database_error() {
        if db.code().as_deref() == Some(PG_INVALID_TEXT_REPRESENTATION) {
            return AppError::Validation(db.message().to_string());
        }
    }
    AppError::Query(e.to_string())
}

fn pg_query(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    q.params
        .iter()
        .fold(sqlx::query(&q.sql), |acc, p| BindValue::from_json(p).bind_pg(acc))
}

fn mysql_query(q: &QueryBuf) -> Query<'_, MySql, MySqlArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    q.params
        .iter()
        .fold(sqlx::query(&q.sql), |acc, p| BindValue::from_json(p).bind_mysql(acc))
}

impl RelationalAdapter {
    pub fn new(pool: SqlPool) -> Self {
        RelationalAdapter { pool }
    }

    fn flavor(&self) -> SqlFlavor {
        match self.pool {
            SqlPool::Postgres(_) => SqlFlavor::Postgres,
            SqlPool::MySql(_) => SqlFlavor::MySql,
        }
    }

    async fn catalog_columns(&self, table: &str) -> Result<Vec<ColumnMeta>, AppError> {
        let sql = self.flavor().columns_sql();
        tracing::debug!(sql = %sql, table = %table, "catalog");
        let rows: Vec<(String, String, String)> = match &self.pool {
            SqlPool::Postgres(pool) => sqlx::query_as(sql).bind(table).fetch_all(pool).await,
            SqlPool::MySql(pool) => sqlx::query_as(sql).bind(table).fetch_all(pool).await,
        }
        .map_err(query_err)?;
        Ok(rows
            .into_iter()
            .map(|(name, declared, native)| ColumnMeta::new(name, declared, native))
            .collect())
    }

    /// Catalog columns of `table`; an unknown table is NotFound. Postgres folds unquoted names to
    /// lowercase, so a miss is retried with the lowercased name.
    async fn columns(&self, table: &str) -> Result<(String, Vec<ColumnMeta>), AppError> {
        let columns = self.catalog_columns(table).await?;
        if !columns.is_empty() {
            return Ok((table.to_string(), columns));
        }
        if self.flavor() == SqlFlavor::Postgres {
            let lowered = table.to_lowercase();
            if lowered != table {
                let columns = self.catalog_columns(&lowered).await?;
                if !columns.is_empty() {
                    return Ok((lowered, columns));
                }
            }
        }
        Err(AppError::NotFound(format!("collection '{}' not found", table)))
    }

    async fn fetch_rows(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        match &self.pool {
            SqlPool::Postgres(pool) => {
                let rows = pg_query(q).fetch_all(pool).await.map_err(query_err)?;
                Ok(rows.iter().map(pg_row_to_json).collect())
            }
            SqlPool::MySql(pool) => {
                let rows = mysql_query(q).fetch_all(pool).await.map_err(query_err)?;
                Ok(rows.iter().map(mysql_row_to_json).collect())
            }
        }
    }

    async fn fetch_count(&self, q: &QueryBuf) -> Result<u64, AppError> {
        let total: i64 = match &self.pool {
            SqlPool::Postgres(pool) => pg_query(q).fetch_one(pool).await.and_then(|r| r.try_get("total")),
            SqlPool::MySql(pool) => mysql_query(q).fetch_one(pool).await.and_then(|r| r.try_get("total")),
        }
        .map_err(query_err)?;
        Ok(total.max(0) as u64)
    }

    async fn execute(&self, q: &QueryBuf) -> Result<(u64, u64), AppError> {
        match &self.pool {
            SqlPool::Postgres(pool) => {
                let r = pg_query(q).execute(pool).await.map_err(query_err)?;
                Ok((r.rows_affected(), 0))
            }
            SqlPool::MySql(pool) => {
                let r = mysql_query(q).execute(pool).await.map_err(query_err)?;
                Ok((r.rows_affected(), r.last_insert_id()))
            }
        }
    }
}

#[async_trait]
impl BackendAdapter for RelationalAdapter {
    fn dialect(&self) -> Dialect {
        match self.pool {
            SqlPool::Postgres(_) => Dialect::Postgres,
            SqlPool::MySql(_) => Dialect::MySql,
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>, AppError> {
        let sql = self.flavor().list_tables_sql();
        tracing::debug!(sql = %sql, "catalog");
        let rows: Vec<(String,)> = match &self.pool {
            SqlPool::Postgres(pool) => sqlx::query_as(sql).fetch_all(pool).await,
            SqlPool::MySql(pool) => sqlx::query_as(sql).fetch_all(pool).await,
        }
        .map_err(query_err)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn describe_schema(&self, collection: &str) -> Result<Vec<FieldInfo>, AppError> {
        let (_, columns) = self.columns(collection).await?;
        Ok(columns
            .iter()
            .map(|c| FieldInfo::new(c.name.clone(), determine_input_type(&c.name, &c.declared)))
            .collect())
    }

    async fn query_page(&self, collection: &str, req: &PageRequest) -> Result<Page, AppError> {
        let (table, columns) = self.columns(collection).await?;
        let shape = TableShape::new(self.flavor(), &table, &columns);
        let (data, count) = shape.select_page(req)?;
        let rows = self.fetch_rows(&data).await?;
        let total = self.fetch_count(&count).await?;
        Ok(Page { rows, total })
    }

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        let (table, columns) = self.columns(collection).await?;
        let q = TableShape::new(self.flavor(), &table, &columns).select_by_id(id)?;
        Ok(self.fetch_rows(&q).await?.into_iter().next())
    }

    async fn insert(&self, collection: &str, fields: Map<String, Value>) -> Result<Value, AppError> {
        let (table, columns) = self.columns(collection).await?;
        let shape = TableShape::new(self.flavor(), &table, &columns);
        let q = shape.insert(&fields)?;
        match &self.pool {
            SqlPool::Postgres(pool) if q.sql.contains(" RETURNING ") => {
                let row = pg_query(&q).fetch_one(pool).await.map_err(query_err)?;
                Ok(pg_cell_to_value(&row, ID_COLUMN))
            }
            _ => {
                let (_, last_id) = self.execute(&q).await?;
                Ok(match fields.get(ID_COLUMN) {
                    Some(id) => id.clone(),
                    None if last_id > 0 => Value::Number(last_id.into()),
                    None => Value::Null,
                })
            }
        }
    }

    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<u64, AppError> {
        let (table, columns) = self.columns(collection).await?;
        let shape = TableShape::new(self.flavor(), &table, &columns);
        let (affected, _) = self.execute(&shape.update(id, &fields)?).await?;
        if affected > 0 {
            return Ok(affected);
        }
        // MySQL reports changed rows, not matched rows
        self.fetch_count(&shape.exists_by_id(id)?).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<u64, AppError> {
        let (table, columns) = self.columns(collection).await?;
        let q = TableShape::new(self.flavor(), &table, &columns).delete(id)?;
        let (affected, _) = self.execute(&q).await?;
        Ok(affected)
    }
}

fn pg_row_to_json(row: &PgRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), pg_cell_to_value(row, name));
    }
    Value::Object(map)
}

fn pg_cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

fn mysql_row_to_json(row: &MySqlRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), mysql_cell_to_value(row, name));
    }
    Value::Object(map)
}

fn mysql_cell_to_value(row: &MySqlRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i8>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

/// Against a live Postgres: `#[sqlx::test]` creates a scratch database per test from `DATABASE_URL`.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{SortDirection, SortSpec};
    use serde_json::json;

    const WIDGETS_DDL: &str = "CREATE TABLE widgets (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        qty INTEGER,
        active BOOLEAN,
        created_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ
    )";

    async fn adapter(pool: PgPool) -> RelationalAdapter {
        sqlx::query(WIDGETS_DDL).execute(&pool).await.unwrap();
        RelationalAdapter::new(SqlPool::Postgres(pool))
    }

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[sqlx::test(migrations = false)]
    async fn insert_coerces_strings_and_stamps_created_at(pool: PgPool) {
        let a = adapter(pool).await;
        let id = a
            .insert("widgets", fields(json!({"name": "bolt", "qty": "5", "active": true})))
            .await
            .unwrap();
        assert_eq!(id, json!(1));

        let row = a.fetch_one("widgets", "1").await.unwrap().unwrap();
        assert_eq!(row["name"], json!("bolt"));
        assert_eq!(row["qty"], json!(5));
        assert_eq!(row["active"], json!(true));
        assert!(row["created_at"].is_string());
        assert!(row["updated_at"].is_null());
        assert!(a.fetch_one("widgets", "2").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = false)]
    async fn page_total_counts_every_match(pool: PgPool) {
        let a = adapter(pool).await;
        for i in 0..12 {
            a.insert("widgets", fields(json!({"name": format!("Bolt-{i}"), "qty": i})))
                .await
                .unwrap();
        }
        for i in 0..3 {
            a.insert("widgets", fields(json!({"name": format!("nut-{i}"), "qty": i})))
                .await
                .unwrap();
        }
        let req = PageRequest {
            page: 2,
            limit: 5,
            search: Some("bolt".into()),
            sort: Some(SortSpec {
                field: "qty".into(),
                direction: SortDirection::Desc,
            }),
        };
        let page = a.query_page("widgets", &req).await.unwrap();
        assert_eq!(page.total, 12);
        let qty: Vec<i64> = page.rows.iter().map(|r| r["qty"].as_i64().unwrap()).collect();
        assert_eq!(qty, [6, 5, 4, 3, 2]);

        let all = a.query_page("widgets", &PageRequest::default()).await.unwrap();
        assert_eq!((all.total, all.rows.len()), (15, 10));

        let none = PageRequest {
            search: Some("100%".into()),
            ..PageRequest::default()
        };
        assert_eq!(a.query_page("widgets", &none).await.unwrap().total, 0);
    }

    #[sqlx::test(migrations = false)]
    async fn missing_id_matches_nothing_and_changes_nothing(pool: PgPool) {
        let a = adapter(pool).await;
        a.insert("widgets", fields(json!({"name": "bolt", "qty": 1}))).await.unwrap();

        assert_eq!(a.update("widgets", "999", fields(json!({"name": "gone"}))).await.unwrap(), 0);
        assert_eq!(a.delete("widgets", "999").await.unwrap(), 0);

        let row = a.fetch_one("widgets", "1").await.unwrap().unwrap();
        assert_eq!(row["name"], json!("bolt"));
        assert!(row["updated_at"].is_null());
    }

    #[sqlx::test(migrations = false)]
    async fn identical_update_still_matches_and_stamps(pool: PgPool) {
        let a = adapter(pool).await;
        a.insert("widgets", fields(json!({"name": "bolt", "qty": 1}))).await.unwrap();

        assert_eq!(a.update("widgets", "1", fields(json!({"name": "bolt"}))).await.unwrap(), 1);
        let row = a.fetch_one("widgets", "1").await.unwrap().unwrap();
        assert!(row["updated_at"].is_string());

        assert_eq!(a.delete("widgets", "1").await.unwrap(), 1);
        assert!(a.fetch_one("widgets", "1").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = false)]
    async fn malformed_id_is_a_validation_error(pool: PgPool) {
        let a = adapter(pool).await;
        let err = a.fetch_one("widgets", "abc").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = a.delete("widgets", "abc").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[sqlx::test(migrations = false)]
    async fn catalog_lookup_folds_unquoted_names(pool: PgPool) {
        let a = adapter(pool).await;
        assert!(a.list_collections().await.unwrap().contains(&"widgets".to_string()));

        let schema = a.describe_schema("Widgets").await.unwrap();
        let kinds: Vec<(&str, &str)> = schema.iter().map(|f| (f.name.as_str(), f.kind.as_str())).collect();
        assert_eq!(
            kinds,
            [
                ("id", "number"),
                ("name", "textarea"),
                ("qty", "number"),
                ("active", "checkbox"),
                ("created_at", "datetime-local"),
                ("updated_at", "datetime-local"),
            ]
        );
        a.insert("Widgets", fields(json!({"name": "bolt"}))).await.unwrap();
        assert!(a.fetch_one("Widgets", "1").await.unwrap().is_some());

        let err = a.describe_schema("gizmos").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
