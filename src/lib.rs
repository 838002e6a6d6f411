//! dbportal: REST gateway over user-registered MongoDB, PostgreSQL and MySQL databases.

pub mod access_log;
pub mod adapter;
pub mod config;
pub mod error;
pub mod extractors;
pub mod gatekeeper;
pub mod handlers;
pub mod model;
pub mod pool;
pub mod query;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod state;
pub mod store;

pub use access_log::{AccessLogSender, AccessLogStats, AccessLogger, LogSink};
pub use adapter::{AdapterFactory, AdapterRegistry, BackendAdapter, MemoryAdapterFactory};
pub use config::{Limits, Settings};
pub use error::{AppError, ConfigError};
pub use model::{AccessLogEntry, ApiCredential, BackendConnection, Dialect, EndpointPermission, HttpVerb};
pub use pool::{DriverConnector, IdleReaper, PoolManager};
pub use routes::app;
pub use service::CrudService;
pub use state::AppState;
pub use store::{ControlStore, MemoryControlStore, PgControlStore};
