//! In-process document store with the same semantics as the Mongo adapter. Backs the HTTP test
//! suites; the server binary only registers the pooled driver factories.

use super::{AdapterFactory, BackendAdapter};
use crate::error::AppError;
use crate::model::{BackendConnection, Dialect, FieldInfo};
use crate::query::document::{parse_object_id, SEARCH_FIELDS};
use crate::query::{Page, PageRequest, SortDirection};
use crate::schema::{infer_document_fields, SAMPLE_SIZE};
use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

type Collections = BTreeMap<String, Vec<Map<String, Value>>>;

#[derive(Default)]
pub struct MemoryAdapter {
    collections: RwLock<Collections>,
}

fn matches_search(doc: &Map<String, Value>, term: &str) -> bool {
    let term = term.to_lowercase();
    SEARCH_FIELDS.iter().any(|f| match doc.get(*f) {
        Some(Value::String(s)) => s.to_lowercase().contains(&term),
        _ => false,
    })
}

/// Missing and null sort first, then booleans, numbers, strings; mixed kinds compare by kind.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn with_id_alias(doc: &Map<String, Value>) -> Value {
    let mut out = doc.clone();
    if let Some(id) = doc.get("_id").cloned() {
        out.insert("id".to_string(), id);
    }
    Value::Object(out)
}

fn strip_ids(fields: &mut Map<String, Value>) {
    fields.remove("_id");
    fields.remove("id");
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BackendAdapter for MemoryAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Document
    }

    async fn list_collections(&self) -> Result<Vec<String>, AppError> {
        Ok(self.read().keys().cloned().collect())
    }

    async fn describe_schema(&self, collection: &str) -> Result<Vec<FieldInfo>, AppError> {
        let guard = self.read();
        let sample: Vec<Map<String, Value>> = guard
            .get(collection)
            .map(|docs| docs.iter().take(SAMPLE_SIZE as usize).cloned().collect())
            .unwrap_or_default();
        Ok(infer_document_fields(&sample))
    }

    async fn query_page(&self, collection: &str, req: &PageRequest) -> Result<Page, AppError> {
        let guard = self.read();
        let mut matched: Vec<&Map<String, Value>> = guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| req.search.as_deref().map_or(true, |t| matches_search(d, t)))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(sort) = &req.sort {
            matched.sort_by(|a, b| {
                let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
                match sort.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }
        let total = matched.len() as u64;
        let rows = matched
            .into_iter()
            .skip(req.offset() as usize)
            .take(req.limit as usize)
            .map(with_id_alias)
            .collect();
        Ok(Page { rows, total })
    }

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        let oid = parse_object_id(id)?.to_hex();
        let guard = self.read();
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.get("_id").and_then(Value::as_str) == Some(oid.as_str())))
            .map(with_id_alias))
    }

    async fn insert(&self, collection: &str, mut fields: Map<String, Value>) -> Result<Value, AppError> {
        strip_ids(&mut fields);
        let id = ObjectId::new().to_hex();
        fields.insert("_id".to_string(), Value::String(id.clone()));
        if !fields.contains_key("created_at") {
            fields.insert("created_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        self.write().entry(collection.to_string()).or_default().push(fields);
        Ok(Value::String(id))
    }

    async fn update(&self, collection: &str, id: &str, mut fields: Map<String, Value>) -> Result<u64, AppError> {
        let oid = parse_object_id(id)?.to_hex();
        strip_ids(&mut fields);
        if !fields.contains_key("updated_at") {
            fields.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        let mut guard = self.write();
        let Some(doc) = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.get("_id").and_then(Value::as_str) == Some(oid.as_str())))
        else {
            return Ok(0);
        };
        doc.extend(fields);
        Ok(1)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<u64, AppError> {
        let oid = parse_object_id(id)?.to_hex();
        let mut guard = self.write();
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| d.get("_id").and_then(Value::as_str) != Some(oid.as_str()));
        Ok((before - docs.len()) as u64)
    }
}

/// One isolated `MemoryAdapter` per registered backend id.
#[derive(Default)]
pub struct MemoryAdapterFactory {
    adapters: Mutex<HashMap<Uuid, Arc<MemoryAdapter>>>,
}

impl MemoryAdapterFactory {
    pub fn adapter(&self, backend_id: Uuid) -> Arc<MemoryAdapter> {
        let mut adapters = self.adapters.lock().unwrap_or_else(|e| e.into_inner());
        adapters.entry(backend_id).or_default().clone()
    }
}

#[async_trait]
impl AdapterFactory for MemoryAdapterFactory {
    async fn open(&self, backend: &BackendConnection) -> Result<Arc<dyn BackendAdapter>, AppError> {
        let adapter: Arc<dyn BackendAdapter> = self.adapter(backend.id);
        Ok(adapter)
    }

    /// Nothing to log in to.
    async fn verify(&self, _backend: &BackendConnection) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortSpec;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    async fn seeded() -> MemoryAdapter {
        let adapter = MemoryAdapter::new();
        for (name, qty) in [("apple", 3), ("Banana", 1), ("cherry", 2), ("pineapple", 5)] {
            adapter
                .insert("fruit", fields(json!({"name": name, "qty": qty})))
                .await
                .unwrap();
        }
        adapter
    }

    #[tokio::test]
    async fn created_record_reads_back_with_every_field() {
        let adapter = MemoryAdapter::new();
        let id = adapter
            .insert("widgets", fields(json!({"name": "a", "size": 4, "tags": ["x"]})))
            .await
            .unwrap();
        let id = id.as_str().unwrap();
        let row = adapter.fetch_one("widgets", id).await.unwrap().unwrap();
        assert_eq!(row["name"], json!("a"));
        assert_eq!(row["size"], json!(4));
        assert_eq!(row["tags"], json!(["x"]));
        assert_eq!(row["id"], json!(id));
        assert!(row["created_at"].is_string());
    }

    #[tokio::test]
    async fn total_counts_all_matches_not_just_the_page() {
        let adapter = seeded().await;
        let req = PageRequest {
            limit: 1,
            search: Some("APPLE".into()),
            ..PageRequest::default()
        };
        let page = adapter.query_page("fruit", &req).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.rows.len(), 1);
    }

    #[tokio::test]
    async fn sorts_and_pages() {
        let adapter = seeded().await;
        let req = PageRequest {
            page: 2,
            limit: 2,
            search: None,
            sort: Some(SortSpec {
                field: "qty".into(),
                direction: SortDirection::Desc,
            }),
        };
        let page = adapter.query_page("fruit", &req).await.unwrap();
        let names: Vec<_> = page.rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["cherry", "Banana"]);
        assert_eq!(page.total, 4);
    }

    #[tokio::test]
    async fn missing_ids_match_nothing_and_bad_ids_are_rejected() {
        let adapter = seeded().await;
        let missing = ObjectId::new().to_hex();
        assert_eq!(adapter.update("fruit", &missing, fields(json!({"qty": 9}))).await.unwrap(), 0);
        assert_eq!(adapter.delete("fruit", &missing).await.unwrap(), 0);
        assert_eq!(adapter.query_page("fruit", &PageRequest::default()).await.unwrap().total, 4);
        assert!(matches!(
            adapter.fetch_one("fruit", "not-an-id").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_stamps_updated_at_and_keeps_id() {
        let adapter = MemoryAdapter::new();
        let id = adapter.insert("w", fields(json!({"name": "a"}))).await.unwrap();
        let id = id.as_str().unwrap();
        let n = adapter
            .update("w", id, fields(json!({"name": "b", "_id": "hijack"})))
            .await
            .unwrap();
        assert_eq!(n, 1);
        let row = adapter.fetch_one("w", id).await.unwrap().unwrap();
        assert_eq!(row["name"], json!("b"));
        assert_eq!(row["_id"], json!(id));
        assert!(row["updated_at"].is_string());
    }
}
