//! Dynamic CRUD handlers. Each runs behind the gatekeeper, which supplies the [`Grant`].

use crate::error::AppError;
use crate::gatekeeper::Grant;
use crate::query::PageRequest;
use crate::response::{Created, ListEnvelope, Message};
use crate::service::RequestValidator;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::Value;
use std::collections::HashMap;

pub async fn list(
    State(state): State<AppState>,
    Extension(grant): Extension<Grant>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListEnvelope>, AppError> {
    let req = PageRequest::from_params(&params);
    let page = state.crud.list(&grant.backend, &collection, &req).await?;
    Ok(Json(ListEnvelope::new(page, &req)))
}

pub async fn read(
    State(state): State<AppState>,
    Extension(grant): Extension<Grant>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let record = state.crud.read(&grant.backend, &collection, &id).await?;
    Ok(Json(record))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(grant): Extension<Grant>,
    Path(collection): Path<String>,
    body: Bytes,
) -> Result<Created, AppError> {
    let fields = RequestValidator::object_body(&body)?;
    RequestValidator::validate_fields(&fields, &state.limits)?;
    let data = Value::Object(fields.clone());
    let id = state.crud.create(&grant.backend, &collection, fields).await?;
    Ok(Created {
        id,
        message: "record created".into(),
        data,
    })
}

pub async fn update(
    State(state): State<AppState>,
    Extension(grant): Extension<Grant>,
    Path((collection, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Message, AppError> {
    let fields = RequestValidator::object_body(&body)?;
    RequestValidator::validate_fields(&fields, &state.limits)?;
    let data = Value::Object(fields.clone());
    state.crud.update(&grant.backend, &collection, &id, fields).await?;
    Ok(Message::with_data("record updated", data))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(grant): Extension<Grant>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Message, AppError> {
    state.crud.delete(&grant.backend, &collection, &id).await?;
    Ok(Message::new("record deleted"))
}
