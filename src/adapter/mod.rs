//! One CRUD and introspection surface over every backend dialect.

mod document;
mod memory;
mod relational;

pub use document::MongoAdapter;
pub use memory::{MemoryAdapter, MemoryAdapterFactory};
pub use relational::{RelationalAdapter, SqlPool};

use crate::error::AppError;
use crate::model::{BackendConnection, Dialect, FieldInfo};
use crate::pool::{BackendHandle, ConnectParams, DriverConnector, PoolManager};
use crate::query::{Page, PageRequest};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Operations every backend supports. Collection names are validated before they reach an adapter.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn list_collections(&self) -> Result<Vec<String>, AppError>;

    async fn describe_schema(&self, collection: &str) -> Result<Vec<FieldInfo>, AppError>;

    /// One page plus the count of all rows matching the same search.
    async fn query_page(&self, collection: &str, req: &PageRequest) -> Result<Page, AppError>;

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError>;

    /// Returns the generated (or supplied) id.
    async fn insert(&self, collection: &str, fields: Map<String, Value>) -> Result<Value, AppError>;

    /// Returns the number of matched rows.
    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<u64, AppError>;

    /// Returns the number of deleted rows.
    async fn delete(&self, collection: &str, id: &str) -> Result<u64, AppError>;
}

/// Opens an adapter for one registered backend.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn open(&self, backend: &BackendConnection) -> Result<Arc<dyn BackendAdapter>, AppError>;

    /// Log in with exactly the backend's stored credentials, bypassing any cached handle.
    async fn verify(&self, backend: &BackendConnection) -> Result<(), AppError>;
}

/// Adapters over handles from the shared `PoolManager`.
pub struct PooledAdapterFactory {
    pools: Arc<PoolManager<DriverConnector>>,
}

impl PooledAdapterFactory {
    pub fn new(pools: Arc<PoolManager<DriverConnector>>) -> Self {
        PooledAdapterFactory { pools }
    }
}

#[async_trait]
impl AdapterFactory for PooledAdapterFactory {
    async fn open(&self, backend: &BackendConnection) -> Result<Arc<dyn BackendAdapter>, AppError> {
        let params = ConnectParams::from_backend(backend)?;
        let adapter: Arc<dyn BackendAdapter> = match self.pools.acquire(&params).await? {
            BackendHandle::Postgres(pool) => Arc::new(RelationalAdapter::new(SqlPool::Postgres(pool))),
            BackendHandle::MySql(pool) => Arc::new(RelationalAdapter::new(SqlPool::MySql(pool))),
            BackendHandle::Document { client, database } => Arc::new(MongoAdapter::new(client.database(&database))),
        };
        Ok(adapter)
    }

    async fn verify(&self, backend: &BackendConnection) -> Result<(), AppError> {
        self.pools.verify(&ConnectParams::from_backend(backend)?).await
    }
}

/// Dispatch table from dialect to adapter factory.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<Dialect, Arc<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dialect: Dialect, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factories.insert(dialect, factory);
        self
    }

    /// Every dialect backed by the real drivers through `pools`.
    pub fn pooled(pools: Arc<PoolManager<DriverConnector>>) -> Self {
        let factory: Arc<dyn AdapterFactory> = Arc::new(PooledAdapterFactory::new(pools));
        Self::new()
            .with(Dialect::Document, factory.clone())
            .with(Dialect::Postgres, factory.clone())
            .with(Dialect::MySql, factory)
    }

    fn factory_for(&self, backend: &BackendConnection) -> Result<&Arc<dyn AdapterFactory>, AppError> {
        let dialect = backend.dialect()?;
        self.factories
            .get(&dialect)
            .ok_or_else(|| AppError::UnsupportedBackend(dialect.to_string()))
    }

    pub async fn adapter_for(&self, backend: &BackendConnection) -> Result<Arc<dyn BackendAdapter>, AppError> {
        self.factory_for(backend)?.open(backend).await
    }

    /// Fresh login check for a backend about to be registered.
    pub async fn verify(&self, backend: &BackendConnection) -> Result<(), AppError> {
        self.factory_for(backend)?.verify(backend).await
    }
}
