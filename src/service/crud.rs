//! Generic CRUD over any registered backend, each call bounded by the backend deadline.

use crate::adapter::{AdapterRegistry, BackendAdapter};
use crate::error::AppError;
use crate::model::{BackendConnection, FieldInfo};
use crate::query::{validate_collection, validate_field, Page, PageRequest};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct CrudService {
    registry: Arc<AdapterRegistry>,
    timeout: Duration,
}

impl CrudService {
    pub fn new(registry: Arc<AdapterRegistry>, timeout: Duration) -> Self {
        CrudService { registry, timeout }
    }

    /// Run `f` against the backend's adapter. Connection setup counts against the deadline.
    async fn with_adapter<'a, T, F, Fut>(&'a self, backend: &'a BackendConnection, f: F) -> Result<T, AppError>
    where
        F: FnOnce(Arc<dyn BackendAdapter>) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let call = async {
            let adapter = self.registry.adapter_for(backend).await?;
            f(adapter).await
        };
        self.bounded(backend, call).await
    }

    async fn bounded<T>(
        &self,
        backend: &BackendConnection,
        call: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(backend = %backend.id, timeout = ?self.timeout, "backend call timed out");
                Err(AppError::Timeout(self.timeout))
            }
        }
    }

    /// Log in to `backend` with its own credentials on a fresh connection.
    pub async fn test_connection(&self, backend: &BackendConnection) -> Result<(), AppError> {
        self.bounded(backend, self.registry.verify(backend)).await
    }

    pub async fn list_collections(&self, backend: &BackendConnection) -> Result<Vec<String>, AppError> {
        self.with_adapter(backend, |a| async move { a.list_collections().await })
            .await
    }

    pub async fn describe_schema(&self, backend: &BackendConnection, collection: &str) -> Result<Vec<FieldInfo>, AppError> {
        validate_collection(collection)?;
        self.with_adapter(backend, |a| async move { a.describe_schema(collection).await })
            .await
    }

    pub async fn list(&self, backend: &BackendConnection, collection: &str, req: &PageRequest) -> Result<Page, AppError> {
        validate_collection(collection)?;
        if let Some(sort) = &req.sort {
            validate_field(&sort.field)?;
        }
        self.with_adapter(backend, |a| async move { a.query_page(collection, req).await })
            .await
    }

    /// Fetch one record; a missing id is NotFound.
    pub async fn read(&self, backend: &BackendConnection, collection: &str, id: &str) -> Result<Value, AppError> {
        validate_collection(collection)?;
        self.with_adapter(backend, |a| async move { a.fetch_one(collection, id).await })
            .await?
            .ok_or_else(|| AppError::NotFound(format!("record {} not found in {}", id, collection)))
    }

    /// Insert one record and return its id.
    pub async fn create(&self, backend: &BackendConnection, collection: &str, fields: Map<String, Value>) -> Result<Value, AppError> {
        validate_collection(collection)?;
        self.with_adapter(backend, |a| async move { a.insert(collection, fields).await })
            .await
    }

    /// Update one record by id; zero matched rows is NotFound.
    pub async fn update(
        &self,
        backend: &BackendConnection,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<u64, AppError> {
        validate_collection(collection)?;
        let matched = self
            .with_adapter(backend, |a| async move { a.update(collection, id, fields).await })
            .await?;
        if matched == 0 {
            return Err(AppError::NotFound(format!("record {} not found in {}", id, collection)));
        }
        Ok(matched)
    }

    /// Delete one record by id; zero deleted rows is NotFound.
    pub async fn delete(&self, backend: &BackendConnection, collection: &str, id: &str) -> Result<u64, AppError> {
        validate_collection(collection)?;
        let deleted = self
            .with_adapter(backend, |a| async move { a.delete(collection, id).await })
            .await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("record {} not found in {}", id, collection)));
        }
        Ok(deleted)
    }
}
