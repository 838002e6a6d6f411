//! Shared harness: in-memory control store, in-memory document backend, real router.

#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use chrono::Utc;
use dbportal::{
    app, AccessLogger, AdapterRegistry, ApiCredential, AppState, BackendConnection, ControlStore, CrudService,
    Dialect, DriverConnector, EndpointPermission, HttpVerb, Limits, MemoryAdapterFactory, MemoryControlStore,
    PoolManager,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const MAX_BODY_BYTES: usize = 16 * 1024;
pub const MAX_IMAGE_FIELD_BYTES: usize = 256;

pub struct Harness {
    pub server: TestServer,
    pub store: Arc<MemoryControlStore>,
    pub logger: AccessLogger,
    pub owner: Uuid,
    pub backend: BackendConnection,
    pub credential: ApiCredential,
}

pub fn api_key(key: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-api-key"),
        HeaderValue::from_str(key).unwrap(),
    )
}

pub fn session(user: Uuid) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(&user.to_string()).unwrap(),
    )
}

pub fn backend(owner: Uuid, kind: &str) -> BackendConnection {
    BackendConnection {
        id: Uuid::new_v4(),
        user_id: owner,
        name: format!("{kind} backend"),
        kind: kind.into(),
        host: "localhost".into(),
        port: 27017,
        database: "app".into(),
        username: String::new(),
        password: String::new(),
        status: "active".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn credential(owner: Uuid, database_id: Uuid) -> ApiCredential {
    ApiCredential {
        id: Uuid::new_v4(),
        user_id: owner,
        database_id,
        name: "test key".into(),
        key: ApiCredential::generate_key(),
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub async fn grant(store: &MemoryControlStore, database_id: Uuid, collection: &str, method: HttpVerb, active: bool) {
    store
        .insert_endpoint(&EndpointPermission {
            id: Uuid::new_v4(),
            database_id,
            collection: collection.into(),
            path: EndpointPermission::public_path(collection),
            method,
            is_active: active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}

/// One mongodb-typed backend with an active key and every verb granted on `widgets`.
pub async fn harness() -> Harness {
    harness_with(AdapterRegistry::new().with(Dialect::Document, Arc::new(MemoryAdapterFactory::default()))).await
}

/// Same fixtures over a caller-supplied adapter registry.
pub async fn harness_with(registry: AdapterRegistry) -> Harness {
    let store = Arc::new(MemoryControlStore::new());
    let owner = Uuid::new_v4();
    let backend = backend(owner, "mongodb");
    store.insert_backend(&backend).await.unwrap();
    let credential = credential(owner, backend.id);
    store.insert_credential(&credential).await.unwrap();
    for verb in [HttpVerb::Get, HttpVerb::Post, HttpVerb::Put, HttpVerb::Delete] {
        grant(&store, backend.id, "widgets", verb, true).await;
    }

    let dyn_store: Arc<dyn ControlStore> = store.clone();
    let logger = AccessLogger::start(dyn_store.clone(), 256);
    let state = AppState {
        store: dyn_store,
        crud: CrudService::new(Arc::new(registry), Duration::from_secs(5)),
        pools: Arc::new(PoolManager::new(DriverConnector::new(2, Duration::from_secs(1)))),
        access_log: logger.sender(),
        limits: Limits {
            max_body_bytes: MAX_BODY_BYTES,
            max_image_field_bytes: MAX_IMAGE_FIELD_BYTES,
        },
    };
    let server = TestServer::new(app(state)).unwrap();
    Harness {
        server,
        store,
        logger,
        owner,
        backend,
        credential,
    }
}
