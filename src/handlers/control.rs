//! Control-plane handlers: backends, API keys, endpoint activation and access logs, all owner-scoped.

use crate::error::AppError;
use crate::extractors::SessionUser;
use crate::model::{
    ApiCredential, BackendConnection, Dialect, EndpointPermission, HttpVerb, STATUS_ACTIVE, STATUS_INACTIVE,
};
use crate::query::validate_collection;
use crate::response::{Created, Message};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_LOG_LIMIT: u32 = 100;

/// First path segments under `/api` that belong to other surfaces. A collection with one of these
/// names could never be reached through its public path.
const RESERVED_COLLECTIONS: &[&str] = &["control", "database-management"];

fn to_value<T: serde::Serialize>(v: &T) -> Result<Value, AppError> {
    serde_json::to_value(v).map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Deserialize)]
pub struct CreateConnection {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl CreateConnection {
    fn into_backend(self, owner: Uuid) -> Result<BackendConnection, AppError> {
        self.kind.parse::<Dialect>()?;
        let now = Utc::now();
        Ok(BackendConnection {
            id: Uuid::new_v4(),
            user_id: owner,
            name: self.name,
            kind: self.kind,
            host: self.host,
            port: self.port,
            database: self.database,
            username: self.username,
            password: self.password,
            status: STATUS_ACTIVE.into(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Fresh login with the submitted credentials. Cached handles for the same host never count.
async fn check_login(state: &AppState, backend: &BackendConnection) -> Result<(), AppError> {
    state.crud.test_connection(backend).await.map_err(|e| {
        tracing::warn!(error = %e, host = %backend.host, "connection test failed");
        AppError::BadRequest(format!("connection test failed: {}", backend.kind))
    })
}

/// Register a backend after a successful test connection.
pub async fn create_connection(
    State(state): State<AppState>,
    user: SessionUser,
    Json(req): Json<CreateConnection>,
) -> Result<Created, AppError> {
    let backend = req.into_backend(user.0)?;
    check_login(&state, &backend).await?;
    state.store.insert_backend(&backend).await?;
    tracing::info!(backend = %backend.id, dialect = %backend.kind, "backend registered");
    Ok(Created {
        id: json!(backend.id),
        message: "connection created".into(),
        data: to_value(&backend)?,
    })
}

/// Try the credentials without registering anything.
pub async fn test_connection(
    State(state): State<AppState>,
    user: SessionUser,
    Json(req): Json<CreateConnection>,
) -> Result<Message, AppError> {
    let backend = req.into_backend(user.0)?;
    check_login(&state, &backend).await?;
    Ok(Message::new("connection successful"))
}

pub async fn list_connections(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<Vec<BackendConnection>>, AppError> {
    Ok(Json(state.store.list_backends(user.0).await?))
}

/// Removes the backend along with its keys and endpoints.
pub async fn delete_connection(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<Uuid>,
) -> Result<Message, AppError> {
    if !state.store.delete_backend(id, user.0).await? {
        return Err(AppError::NotFound("database connection not found".into()));
    }
    tracing::info!(backend = %id, "backend removed");
    Ok(Message::new("connection deleted"))
}

#[derive(Deserialize)]
pub struct SetStatus {
    pub status: String,
}

pub async fn set_connection_status(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetStatus>,
) -> Result<Message, AppError> {
    let status = req.status.to_lowercase();
    if status != STATUS_ACTIVE && status != STATUS_INACTIVE {
        return Err(AppError::Validation(format!("unknown status: {}", req.status)));
    }
    state
        .store
        .find_backend_for_owner(id, user.0)
        .await?
        .ok_or_else(|| AppError::NotFound("database connection not found".into()))?;
    state.store.set_backend_status(id, &status).await?;
    Ok(Message::with_data("connection updated", json!({ "id": id, "status": status })))
}

#[derive(Deserialize)]
pub struct CreateKey {
    pub database_id: Uuid,
    pub name: String,
}

pub async fn create_key(
    State(state): State<AppState>,
    user: SessionUser,
    Json(req): Json<CreateKey>,
) -> Result<Created, AppError> {
    state
        .store
        .find_backend_for_owner(req.database_id, user.0)
        .await?
        .ok_or_else(|| AppError::NotFound("database connection not found".into()))?;
    let now = Utc::now();
    let credential = ApiCredential {
        id: Uuid::new_v4(),
        user_id: user.0,
        database_id: req.database_id,
        name: req.name,
        key: ApiCredential::generate_key(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_credential(&credential).await?;
    Ok(Created {
        id: json!(credential.id),
        message: "api key created".into(),
        data: to_value(&credential)?,
    })
}

pub async fn list_keys(State(state): State<AppState>, user: SessionUser) -> Result<Json<Vec<ApiCredential>>, AppError> {
    Ok(Json(state.store.list_credentials(user.0).await?))
}

pub async fn delete_key(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<Uuid>,
) -> Result<Message, AppError> {
    if !state.store.delete_credential(id, user.0).await? {
        return Err(AppError::NotFound("api key not found".into()));
    }
    Ok(Message::new("api key deleted"))
}

pub async fn toggle_key(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<Uuid>,
) -> Result<Message, AppError> {
    let credential = state
        .store
        .find_credential(id)
        .await?
        .filter(|c| c.user_id == user.0)
        .ok_or_else(|| AppError::NotFound("api key not found".into()))?;
    let active = !credential.is_active;
    state.store.set_credential_active(id, active).await?;
    Ok(Message::with_data("api key updated", json!({ "id": id, "is_active": active })))
}

#[derive(Deserialize)]
pub struct CreateEndpoint {
    pub database_id: Uuid,
    pub collection: String,
    pub method: String,
}

/// Activate `method` on a collection. Re-creating an existing tuple reactivates it.
pub async fn create_endpoint(
    State(state): State<AppState>,
    user: SessionUser,
    Json(req): Json<CreateEndpoint>,
) -> Result<Created, AppError> {
    validate_collection(&req.collection)?;
    if RESERVED_COLLECTIONS.contains(&req.collection.as_str()) {
        return Err(AppError::Validation(format!(
            "collection name '{}' is reserved",
            req.collection
        )));
    }
    let method: HttpVerb = req.method.parse()?;
    state
        .store
        .find_backend_for_owner(req.database_id, user.0)
        .await?
        .ok_or_else(|| AppError::NotFound("database connection not found".into()))?;
    let now = Utc::now();
    state
        .store
        .insert_endpoint(&EndpointPermission {
            id: Uuid::new_v4(),
            database_id: req.database_id,
            path: EndpointPermission::public_path(&req.collection),
            collection: req.collection.clone(),
            method,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    let stored = state
        .store
        .find_endpoint(req.database_id, &req.collection, method)
        .await?
        .ok_or_else(|| AppError::Internal("endpoint vanished after upsert".into()))?;
    Ok(Created {
        id: json!(stored.id),
        message: "endpoint created".into(),
        data: to_value(&stored)?,
    })
}

/// `?database_id=` narrows the list to one backend.
pub async fn list_endpoints(
    State(state): State<AppState>,
    user: SessionUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<EndpointPermission>>, AppError> {
    let database_id = match params.get("database_id").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid database_id".into()))?,
        ),
        None => None,
    };
    Ok(Json(state.store.list_endpoints(user.0, database_id).await?))
}

pub async fn delete_endpoint(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<Uuid>,
) -> Result<Message, AppError> {
    if !state.store.delete_endpoint(id, user.0).await? {
        return Err(AppError::NotFound("endpoint not found".into()));
    }
    Ok(Message::new("endpoint deleted"))
}

pub async fn toggle_endpoint(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<Uuid>,
) -> Result<Message, AppError> {
    let endpoint = state
        .store
        .find_endpoint_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("endpoint not found".into()))?;
    state
        .store
        .find_backend_for_owner(endpoint.database_id, user.0)
        .await?
        .ok_or_else(|| AppError::NotFound("endpoint not found".into()))?;
    let active = !endpoint.is_active;
    state.store.set_endpoint_active(id, active).await?;
    Ok(Message::with_data("endpoint updated", json!({ "id": id, "is_active": active })))
}

/// Newest entries for one of the user's keys. `limit` defaults to 100 and is capped there.
pub async fn list_logs(
    State(state): State<AppState>,
    user: SessionUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let key_id = params
        .get("api_key_id")
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| AppError::BadRequest("valid api_key_id is required".into()))?;
    state
        .store
        .find_credential(key_id)
        .await?
        .filter(|c| c.user_id == user.0)
        .ok_or_else(|| AppError::NotFound("api key not found".into()))?;
    let limit = params
        .get("limit")
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|n| (1..=DEFAULT_LOG_LIMIT).contains(n))
        .unwrap_or(DEFAULT_LOG_LIMIT);
    let logs = state.store.list_access_logs(key_id, limit).await?;
    Ok(Json(json!({ "data": logs })))
}

/// Drop every access log entry recorded under the user's keys.
pub async fn clear_logs(State(state): State<AppState>, user: SessionUser) -> Result<Message, AppError> {
    let deleted = state.store.clear_access_logs(user.0).await?;
    tracing::info!(user = %user.0, deleted, "access logs cleared");
    Ok(Message::with_data("logs cleared", json!({ "deleted": deleted })))
}
