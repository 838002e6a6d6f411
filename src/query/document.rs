//! Mongo filter, sort and value conversion.

use crate::error::AppError;
use crate::query::page::SortSpec;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use serde_json::{Map, Number, Value};

/// Fields the free-text search is matched against in document collections.
pub const SEARCH_FIELDS: &[&str] = &["name", "title", "description", "content"];

/// Case-insensitive OR over the search fields. The term is matched literally.
pub fn search_filter(term: Option<&str>) -> Document {
    match term {
        Some(t) if !t.is_empty() => {
            let pattern = regex::escape(t);
            let ors: Vec<Bson> = SEARCH_FIELDS
                .iter()
                .map(|f| {
                    let mut cond = Document::new();
                    cond.insert(*f, doc! { "$regex": pattern.as_str(), "$options": "i" });
                    Bson::Document(cond)
                })
                .collect();
            doc! { "$or": ors }
        }
        _ => Document::new(),
    }
}

pub fn sort_document(sort: Option<&SortSpec>) -> Option<Document> {
    sort.map(|s| {
        let mut d = Document::new();
        d.insert(s.field.clone(), s.direction.signum());
        d
    })
}

pub fn parse_object_id(id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| AppError::Validation(format!("invalid document id '{}'", id)))
}

pub fn json_to_document(fields: &Map<String, Value>) -> Result<Document, AppError> {
    mongodb::bson::to_document(fields).map_err(|e| AppError::Validation(format!("invalid document: {}", e)))
}

/// Stored document as JSON with `_id` as hex plus an `id` alias.
pub fn document_to_json(doc: Document) -> Value {
    let id = match doc.get("_id") {
        Some(Bson::ObjectId(oid)) => Some(oid.to_hex()),
        _ => None,
    };
    let mut map = Map::new();
    for (k, v) in doc {
        map.insert(k, bson_to_json(v));
    }
    if let Some(id) = id {
        map.insert("id".to_string(), Value::String(id));
    }
    Value::Object(map)
}

pub fn bson_to_json(v: Bson) -> Value {
    match v {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(n) => Value::Number(n.into()),
        Bson::Int64(n) => Value::Number(n.into()),
        Bson::Double(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::Number(dt.timestamp_millis().into()),
        },
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(d) => Value::Object(d.into_iter().map(|(k, v)| (k, bson_to_json(v))).collect()),
        other => other.into_relaxed_extjson(),
    }
}
