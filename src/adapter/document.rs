//! MongoDB adapter.

use super::BackendAdapter;
use crate::error::AppError;
use crate::model::{Dialect, FieldInfo};
use crate::query::document::{
    bson_to_json, document_to_json, json_to_document, parse_object_id, search_filter, sort_document,
};
use crate::query::{Page, PageRequest};
use crate::schema::{infer_document_fields, SAMPLE_SIZE};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde_json::{Map, Value};

fn query_err(e: mongodb::error::Error) -> AppError {
    AppError::Query(e.to_string())
}

/// Caller-supplied ids never overwrite `_id`.
fn strip_ids(fields: &mut Map<String, Value>) {
    fields.remove("_id");
    fields.remove("id");
}

pub struct MongoAdapter {
    db: Database,
}

impl MongoAdapter {
    pub fn new(db: Database) -> Self {
        MongoAdapter { db }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl BackendAdapter for MongoAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Document
    }

    async fn list_collections(&self) -> Result<Vec<String>, AppError> {
        let mut names = self.db.list_collection_names().await.map_err(query_err)?;
        names.sort();
        Ok(names)
    }

    async fn describe_schema(&self, collection: &str) -> Result<Vec<FieldInfo>, AppError> {
        let docs: Vec<Document> = self
            .collection(collection)
            .find(doc! {})
            .limit(SAMPLE_SIZE)
            .await
            .map_err(query_err)?
            .try_collect()
            .await
            .map_err(query_err)?;
        let sampled: Vec<Map<String, Value>> = docs
            .into_iter()
            .map(|d| d.into_iter().map(|(k, v)| (k, bson_to_json(v))).collect())
            .collect();
        Ok(infer_document_fields(&sampled))
    }

    async fn query_page(&self, collection: &str, req: &PageRequest) -> Result<Page, AppError> {
        let coll = self.collection(collection);
        let filter = search_filter(req.search.as_deref());
        tracing::debug!(collection = %collection, filter = %filter, page = req.page, limit = req.limit, "find");

        let total = coll.count_documents(filter.clone()).await.map_err(query_err)?;

        let mut options = FindOptions::default();
        options.skip = Some(req.offset());
        options.limit = Some(req.limit as i64);
        options.sort = sort_document(req.sort.as_ref());
        let docs: Vec<Document> = coll
            .find(filter)
            .with_options(options)
            .await
            .map_err(query_err)?
            .try_collect()
            .await
            .map_err(query_err)?;

        Ok(Page {
            rows: docs.into_iter().map(document_to_json).collect(),
            total,
        })
    }

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        let oid = parse_object_id(id)?;
        let found = self
            .collection(collection)
            .find_one(doc! { "_id": oid })
            .await
            .map_err(query_err)?;
        Ok(found.map(document_to_json))
    }

    async fn insert(&self, collection: &str, mut fields: Map<String, Value>) -> Result<Value, AppError> {
        strip_ids(&mut fields);
        let mut document = json_to_document(&fields)?;
        if !document.contains_key("created_at") {
            document.insert("created_at", DateTime::now());
        }
        let result = self
            .collection(collection)
            .insert_one(document)
            .await
            .map_err(query_err)?;
        Ok(match result.inserted_id {
            Bson::ObjectId(oid) => Value::String(oid.to_hex()),
            other => bson_to_json(other),
        })
    }

    async fn update(&self, collection: &str, id: &str, mut fields: Map<String, Value>) -> Result<u64, AppError> {
        let oid = parse_object_id(id)?;
        strip_ids(&mut fields);
        let mut set = json_to_document(&fields)?;
        if !set.contains_key("updated_at") {
            set.insert("updated_at", DateTime::now());
        }
        let result = self
            .collection(collection)
            .update_one(doc! { "_id": oid }, doc! { "$set": set })
            .await
            .map_err(query_err)?;
        Ok(result.matched_count)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<u64, AppError> {
        let oid = parse_object_id(id)?;
        let result = self
            .collection(collection)
            .delete_one(doc! { "_id": oid })
            .await
            .map_err(query_err)?;
        Ok(result.deleted_count)
    }
}
