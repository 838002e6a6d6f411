//! Collection browsing and record editing for the owner of a registered backend.
//! Every route takes `?database_id=` and resolves it against the session user.

use crate::error::AppError;
use crate::extractors::SessionUser;
use crate::model::BackendConnection;
use crate::query::PageRequest;
use crate::response::{Created, ListEnvelope, Message};
use crate::service::RequestValidator;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Backend named by `database_id`, if the session user owns it.
async fn owned_backend(
    state: &AppState,
    user: SessionUser,
    params: &HashMap<String, String>,
) -> Result<BackendConnection, AppError> {
    let raw = params
        .get("database_id")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("database_id is required".into()))?;
    let id = Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid database_id".into()))?;
    state
        .store
        .find_backend_for_owner(id, user.0)
        .await?
        .ok_or_else(|| AppError::NotFound("database connection not found".into()))
}

pub async fn list_collections(
    State(state): State<AppState>,
    user: SessionUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<String>>, AppError> {
    let backend = owned_backend(&state, user, &params).await?;
    Ok(Json(state.crud.list_collections(&backend).await?))
}

pub async fn collection_schema(
    State(state): State<AppState>,
    user: SessionUser,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let backend = owned_backend(&state, user, &params).await?;
    let fields = state.crud.describe_schema(&backend, &name).await?;
    Ok(Json(json!({ "fields": fields })))
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: SessionUser,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListEnvelope>, AppError> {
    let backend = owned_backend(&state, user, &params).await?;
    let req = PageRequest::from_params(&params);
    let page = state.crud.list(&backend, &name, &req).await?;
    Ok(Json(ListEnvelope::new(page, &req)))
}

pub async fn read_document(
    State(state): State<AppState>,
    user: SessionUser,
    Path((name, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let backend = owned_backend(&state, user, &params).await?;
    Ok(Json(state.crud.read(&backend, &name, &id).await?))
}

pub async fn create_document(
    State(state): State<AppState>,
    user: SessionUser,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Created, AppError> {
    let backend = owned_backend(&state, user, &params).await?;
    let fields = RequestValidator::object_body(&body)?;
    RequestValidator::validate_fields(&fields, &state.limits)?;
    let data = Value::Object(fields.clone());
    let id = state.crud.create(&backend, &name, fields).await?;
    Ok(Created {
        id,
        message: "document created".into(),
        data,
    })
}

pub async fn update_document(
    State(state): State<AppState>,
    user: SessionUser,
    Path((name, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Message, AppError> {
    let backend = owned_backend(&state, user, &params).await?;
    let fields = RequestValidator::object_body(&body)?;
    RequestValidator::validate_fields(&fields, &state.limits)?;
    let data = Value::Object(fields.clone());
    state.crud.update(&backend, &name, &id, fields).await?;
    Ok(Message::with_data("document updated", data))
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: SessionUser,
    Path((name, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Message, AppError> {
    let backend = owned_backend(&state, user, &params).await?;
    state.crud.delete(&backend, &name, &id).await?;
    Ok(Message::new("document deleted"))
}
