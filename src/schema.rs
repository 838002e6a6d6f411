//! Field inference: semantic input types from catalog columns or sampled documents.

use crate::model::FieldInfo;
use serde_json::{Map, Value};

/// Documents sampled per collection.
pub const SAMPLE_SIZE: i64 = 10;

const IMAGE_NAME_HINTS: &[&str] = &["photo", "image", "picture", "avatar", "thumbnail"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Input type for a relational column. Name hints win over the declared type; first rule wins.
pub fn determine_input_type(name: &str, declared: &str) -> &'static str {
    let name = name.to_lowercase();
    let declared = declared.to_lowercase();

    if contains_any(&name, IMAGE_NAME_HINTS) || contains_any(&name, &["logo", "icon"]) {
        return "image";
    }
    if name.contains("email") {
        return "email";
    }
    if contains_any(&name, &["url", "link"]) {
        return "url";
    }
    if contains_any(&name, &["password", "pass"]) {
        return "password";
    }
    if contains_any(&name, &["phone", "tel"]) {
        return "tel";
    }
    if contains_any(&name, &["date", "time"]) || contains_any(&declared, &["date", "time"]) {
        return "datetime-local";
    }
    if contains_any(&declared, &["int", "number", "decimal", "float", "double", "numeric", "real"]) {
        return "number";
    }
    if declared.contains("bool") {
        return "checkbox";
    }
    if declared.contains("text") {
        return "textarea";
    }
    "text"
}

/// Type of one sampled document value.
fn document_value_type(name: &str, value: &Value) -> &'static str {
    match value {
        Value::String(s) => {
            let name = name.to_lowercase();
            let lower = s.to_lowercase();
            if contains_any(&name, IMAGE_NAME_HINTS) || IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
                "image"
            } else {
                "text"
            }
        }
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        _ => "text",
    }
}

/// Union of field names across `docs` (excluding `_id`) in first-appearance order, typed by the
/// first value seen.
pub fn infer_document_fields(docs: &[Map<String, Value>]) -> Vec<FieldInfo> {
    let mut fields: Vec<FieldInfo> = Vec::new();
    for doc in docs {
        for (name, value) in doc {
            if name == "_id" || fields.iter().any(|f| &f.name == name) {
                continue;
            }
            fields.push(FieldInfo::new(name.clone(), document_value_type(name, value)));
        }
    }
    fields
}
