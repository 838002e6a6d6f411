//! Control-plane persistence: registered backends, API keys, endpoint activation and access logs.
//! Postgres tables live in the schema named by `CONTROL_SCHEMA` (default `dbportal`).

use crate::error::AppError;
use crate::model::{AccessLogEntry, ApiCredential, BackendConnection, EndpointPermission, HttpVerb};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait ControlStore: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    async fn find_credential_by_key(&self, key: &str) -> Result<Option<ApiCredential>, AppError>;

    async fn find_credential(&self, id: Uuid) -> Result<Option<ApiCredential>, AppError>;

    async fn find_backend(&self, id: Uuid) -> Result<Option<BackendConnection>, AppError>;

    /// Backend `id` only if it is owned by `owner`.
    async fn find_backend_for_owner(&self, id: Uuid, owner: Uuid) -> Result<Option<BackendConnection>, AppError>;

    async fn find_endpoint(
        &self,
        database_id: Uuid,
        collection: &str,
        method: HttpVerb,
    ) -> Result<Option<EndpointPermission>, AppError>;

    async fn find_endpoint_by_id(&self, id: Uuid) -> Result<Option<EndpointPermission>, AppError>;

    async fn insert_access_log(&self, entry: &AccessLogEntry) -> Result<(), AppError>;

    async fn insert_backend(&self, backend: &BackendConnection) -> Result<(), AppError>;

    async fn insert_credential(&self, credential: &ApiCredential) -> Result<(), AppError>;

    /// Upsert on (database_id, collection, method): one activation state per tuple.
    async fn insert_endpoint(&self, endpoint: &EndpointPermission) -> Result<(), AppError>;

    /// Returns false when no such credential exists.
    async fn set_credential_active(&self, id: Uuid, active: bool) -> Result<bool, AppError>;

    async fn set_endpoint_active(&self, id: Uuid, active: bool) -> Result<bool, AppError>;

    async fn set_backend_status(&self, id: Uuid, status: &str) -> Result<bool, AppError>;

    /// Newest first.
    async fn list_access_logs(&self, api_key_id: Uuid, limit: u32) -> Result<Vec<AccessLogEntry>, AppError>;

    /// Oldest first.
    async fn list_backends(&self, owner: Uuid) -> Result<Vec<BackendConnection>, AppError>;

    /// Removes the backend with its keys and endpoints. False when `owner` has no such backend.
    async fn delete_backend(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError>;

    async fn list_credentials(&self, owner: Uuid) -> Result<Vec<ApiCredential>, AppError>;

    async fn delete_credential(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError>;

    /// Endpoints on the owner's backends, optionally narrowed to one backend.
    async fn list_endpoints(&self, owner: Uuid, database_id: Option<Uuid>) -> Result<Vec<EndpointPermission>, AppError>;

    async fn delete_endpoint(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError>;

    /// Drops every access log entry recorded under the owner's keys. Returns the count.
    async fn clear_access_logs(&self, owner: Uuid) -> Result<u64, AppError>;
}

pub struct PgControlStore {
    pool: PgPool,
    schema: String,
}

type BackendRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    i32,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type CredentialRow = (Uuid, Uuid, Uuid, String, String, bool, DateTime<Utc>, DateTime<Utc>);

type EndpointRow = (Uuid, Uuid, String, String, String, bool, DateTime<Utc>, DateTime<Utc>);

type LogRow = (
    Uuid,
    Uuid,
    Option<Uuid>,
    String,
    String,
    i32,
    i64,
    String,
    String,
    DateTime<Utc>,
);

const BACKEND_COLUMNS: &str =
    "id, user_id, name, type, host, port, database_name, username, password, status, created_at, updated_at";
const CREDENTIAL_COLUMNS: &str = "id, user_id, database_id, name, key, is_active, created_at, updated_at";
const ENDPOINT_COLUMNS: &str = "id, database_id, collection, path, method, is_active, created_at, updated_at";
const LOG_COLUMNS: &str =
    "id, api_key_id, endpoint_id, method, path, status_code, response_time, ip_address, user_agent, created_at";

fn backend_from_row(r: BackendRow) -> Result<BackendConnection, AppError> {
    let port = u16::try_from(r.5).map_err(|_| AppError::Internal(format!("backend {} has invalid port {}", r.0, r.5)))?;
    Ok(BackendConnection {
        id: r.0,
        user_id: r.1,
        name: r.2,
        kind: r.3,
        host: r.4,
        port,
        database: r.6,
        username: r.7,
        password: r.8,
        status: r.9,
        created_at: r.10,
        updated_at: r.11,
    })
}

fn credential_from_row(r: CredentialRow) -> ApiCredential {
    ApiCredential {
        id: r.0,
        user_id: r.1,
        database_id: r.2,
        name: r.3,
        key: r.4,
        is_active: r.5,
        created_at: r.6,
        updated_at: r.7,
    }
}

fn endpoint_from_row(r: EndpointRow) -> Result<EndpointPermission, AppError> {
    Ok(EndpointPermission {
        id: r.0,
        database_id: r.1,
        collection: r.2,
        path: r.3,
        method: r.4.parse()?,
        is_active: r.5,
        created_at: r.6,
        updated_at: r.7,
    })
}

fn log_from_row(r: LogRow) -> AccessLogEntry {
    AccessLogEntry {
        id: r.0,
        api_key_id: r.1,
        endpoint_id: r.2,
        method: r.3,
        path: r.4,
        status_code: u16::try_from(r.5).unwrap_or(0),
        response_time: r.6,
        ip_address: r.7,
        user_agent: r.8,
        created_at: r.9,
    }
}

impl PgControlStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgControlStore {
            pool,
            schema: schema.into(),
        }
    }

    /// Schema-qualified table name (e.g. "dbportal.api_keys").
    fn table(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }

    /// Create the control schema and tables if they do not exist.
    pub async fn ensure_control_tables(&self) -> Result<(), AppError> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .execute(&self.pool)
            .await?;

        let q_backends = self.table("database_connections");
        let backends_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                database_name TEXT NOT NULL,
                username TEXT NOT NULL DEFAULT '',
                password TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'active',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            q_backends
        );
        sqlx::query(&backends_ddl).execute(&self.pool).await?;

        let keys_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                database_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                key TEXT NOT NULL UNIQUE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table("api_keys"),
            q_backends
        );
        sqlx::query(&keys_ddl).execute(&self.pool).await?;

        let endpoints_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                database_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                collection TEXT NOT NULL,
                path TEXT NOT NULL,
                method TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (database_id, collection, method)
            )
            "#,
            self.table("api_endpoints"),
            q_backends
        );
        sqlx::query(&endpoints_ddl).execute(&self.pool).await?;

        let q_logs = self.table("api_logs");
        let logs_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                api_key_id UUID NOT NULL,
                endpoint_id UUID,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                status_code INTEGER NOT NULL,
                response_time BIGINT NOT NULL,
                ip_address TEXT NOT NULL DEFAULT '',
                user_agent TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            q_logs
        );
        sqlx::query(&logs_ddl).execute(&self.pool).await?;
        let logs_index = format!(
            "CREATE INDEX IF NOT EXISTS api_logs_key_created_idx ON {} (api_key_id, created_at DESC)",
            q_logs
        );
        sqlx::query(&logs_index).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ControlStore for PgControlStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_credential_by_key(&self, key: &str) -> Result<Option<ApiCredential>, AppError> {
        let row: Option<CredentialRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE key = $1",
            CREDENTIAL_COLUMNS,
            self.table("api_keys")
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(credential_from_row))
    }

    async fn find_credential(&self, id: Uuid) -> Result<Option<ApiCredential>, AppError> {
        let row: Option<CredentialRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE id = $1",
            CREDENTIAL_COLUMNS,
            self.table("api_keys")
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(credential_from_row))
    }

    async fn find_backend(&self, id: Uuid) -> Result<Option<BackendConnection>, AppError> {
        let row: Option<BackendRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE id = $1",
            BACKEND_COLUMNS,
            self.table("database_connections")
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(backend_from_row).transpose()
    }

    async fn find_backend_for_owner(&self, id: Uuid, owner: Uuid) -> Result<Option<BackendConnection>, AppError> {
        let row: Option<BackendRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE id = $1 AND user_id = $2",
            BACKEND_COLUMNS,
            self.table("database_connections")
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        row.map(backend_from_row).transpose()
    }

    async fn find_endpoint(
        &self,
        database_id: Uuid,
        collection: &str,
        method: HttpVerb,
    ) -> Result<Option<EndpointPermission>, AppError> {
        let row: Option<EndpointRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE database_id = $1 AND collection = $2 AND method = $3",
            ENDPOINT_COLUMNS,
            self.table("api_endpoints")
        ))
        .bind(database_id)
        .bind(collection)
        .bind(method.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(endpoint_from_row).transpose()
    }

    async fn find_endpoint_by_id(&self, id: Uuid) -> Result<Option<EndpointPermission>, AppError> {
        let row: Option<EndpointRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE id = $1",
            ENDPOINT_COLUMNS,
            self.table("api_endpoints")
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(endpoint_from_row).transpose()
    }

    async fn insert_access_log(&self, e: &AccessLogEntry) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            self.table("api_logs"),
            LOG_COLUMNS
        ))
        .bind(e.id)
        .bind(e.api_key_id)
        .bind(e.endpoint_id)
        .bind(&e.method)
        .bind(&e.path)
        .bind(e.status_code as i32)
        .bind(e.response_time)
        .bind(&e.ip_address)
        .bind(&e.user_agent)
        .bind(e.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_backend(&self, b: &BackendConnection) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            self.table("database_connections"),
            BACKEND_COLUMNS
        ))
        .bind(b.id)
        .bind(b.user_id)
        .bind(&b.name)
        .bind(&b.kind)
        .bind(&b.host)
        .bind(b.port as i32)
        .bind(&b.database)
        .bind(&b.username)
        .bind(&b.password)
        .bind(&b.status)
        .bind(b.created_at)
        .bind(b.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_credential(&self, c: &ApiCredential) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            self.table("api_keys"),
            CREDENTIAL_COLUMNS
        ))
        .bind(c.id)
        .bind(c.user_id)
        .bind(c.database_id)
        .bind(&c.name)
        .bind(&c.key)
        .bind(c.is_active)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_endpoint(&self, e: &EndpointPermission) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (database_id, collection, method)
            DO UPDATE SET path = EXCLUDED.path, is_active = EXCLUDED.is_active, updated_at = EXCLUDED.updated_at
            "#,
            self.table("api_endpoints"),
            ENDPOINT_COLUMNS
        ))
        .bind(e.id)
        .bind(e.database_id)
        .bind(&e.collection)
        .bind(&e.path)
        .bind(e.method.as_str())
        .bind(e.is_active)
        .bind(e.created_at)
        .bind(e.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_credential_active(&self, id: Uuid, active: bool) -> Result<bool, AppError> {
        let r = sqlx::query(&format!(
            "UPDATE {} SET is_active = $1, updated_at = NOW() WHERE id = $2",
            self.table("api_keys")
        ))
        .bind(active)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn set_endpoint_active(&self, id: Uuid, active: bool) -> Result<bool, AppError> {
        let r = sqlx::query(&format!(
            "UPDATE {} SET is_active = $1, updated_at = NOW() WHERE id = $2",
            self.table("api_endpoints")
        ))
        .bind(active)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn set_backend_status(&self, id: Uuid, status: &str) -> Result<bool, AppError> {
        let r = sqlx::query(&format!(
            "UPDATE {} SET status = $1, updated_at = NOW() WHERE id = $2",
            self.table("database_connections")
        ))
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn list_access_logs(&self, api_key_id: Uuid, limit: u32) -> Result<Vec<AccessLogEntry>, AppError> {
        let rows: Vec<LogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE api_key_id = $1 ORDER BY created_at DESC LIMIT $2",
            LOG_COLUMNS,
            self.table("api_logs")
        ))
        .bind(api_key_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(log_from_row).collect())
    }

    async fn list_backends(&self, owner: Uuid) -> Result<Vec<BackendConnection>, AppError> {
        let rows: Vec<BackendRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE user_id = $1 ORDER BY created_at",
            BACKEND_COLUMNS,
            self.table("database_connections")
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(backend_from_row).collect()
    }

    async fn delete_backend(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError> {
        let r = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND user_id = $2",
            self.table("database_connections")
        ))
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn list_credentials(&self, owner: Uuid) -> Result<Vec<ApiCredential>, AppError> {
        let rows: Vec<CredentialRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE user_id = $1 ORDER BY created_at",
            CREDENTIAL_COLUMNS,
            self.table("api_keys")
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(credential_from_row).collect())
    }

    async fn delete_credential(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError> {
        let r = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND user_id = $2",
            self.table("api_keys")
        ))
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn list_endpoints(&self, owner: Uuid, database_id: Option<Uuid>) -> Result<Vec<EndpointPermission>, AppError> {
        let rows: Vec<EndpointRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM {}
            WHERE database_id IN (SELECT id FROM {} WHERE user_id = $1)
              AND ($2::uuid IS NULL OR database_id = $2)
            ORDER BY created_at
            "#,
            ENDPOINT_COLUMNS,
            self.table("api_endpoints"),
            self.table("database_connections")
        ))
        .bind(owner)
        .bind(database_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(endpoint_from_row).collect()
    }

    async fn delete_endpoint(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError> {
        let r = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND database_id IN (SELECT id FROM {} WHERE user_id = $2)",
            self.table("api_endpoints"),
            self.table("database_connections")
        ))
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn clear_access_logs(&self, owner: Uuid) -> Result<u64, AppError> {
        let r = sqlx::query(&format!(
            "DELETE FROM {} WHERE api_key_id IN (SELECT id FROM {} WHERE user_id = $1)",
            self.table("api_logs"),
            self.table("api_keys")
        ))
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}

#[derive(Default)]
struct MemoryTables {
    backends: HashMap<Uuid, BackendConnection>,
    credentials: HashMap<Uuid, ApiCredential>,
    endpoints: HashMap<Uuid, EndpointPermission>,
    logs: Vec<AccessLogEntry>,
}

/// Process-local store used when no `DATABASE_URL` is configured, and in tests.
#[derive(Default)]
pub struct MemoryControlStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryControlStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryTables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryTables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ControlStore for MemoryControlStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_credential_by_key(&self, key: &str) -> Result<Option<ApiCredential>, AppError> {
        Ok(self.read().credentials.values().find(|c| c.key == key).cloned())
    }

    async fn find_credential(&self, id: Uuid) -> Result<Option<ApiCredential>, AppError> {
        Ok(self.read().credentials.get(&id).cloned())
    }

    async fn find_backend(&self, id: Uuid) -> Result<Option<BackendConnection>, AppError> {
        Ok(self.read().backends.get(&id).cloned())
    }

    async fn find_backend_for_owner(&self, id: Uuid, owner: Uuid) -> Result<Option<BackendConnection>, AppError> {
        Ok(self.read().backends.get(&id).filter(|b| b.user_id == owner).cloned())
    }

    async fn find_endpoint(
        &self,
        database_id: Uuid,
        collection: &str,
        method: HttpVerb,
    ) -> Result<Option<EndpointPermission>, AppError> {
        Ok(self
            .read()
            .endpoints
            .values()
            .find(|e| e.database_id == database_id && e.collection == collection && e.method == method)
            .cloned())
    }

    async fn find_endpoint_by_id(&self, id: Uuid) -> Result<Option<EndpointPermission>, AppError> {
        Ok(self.read().endpoints.get(&id).cloned())
    }

    async fn insert_access_log(&self, entry: &AccessLogEntry) -> Result<(), AppError> {
        self.write().logs.push(entry.clone());
        Ok(())
    }

    async fn insert_backend(&self, backend: &BackendConnection) -> Result<(), AppError> {
        self.write().backends.insert(backend.id, backend.clone());
        Ok(())
    }

    async fn insert_credential(&self, credential: &ApiCredential) -> Result<(), AppError> {
        let mut tables = self.write();
        if tables.credentials.values().any(|c| c.key == credential.key && c.id != credential.id) {
            return Err(AppError::Validation("api key already exists".into()));
        }
        tables.credentials.insert(credential.id, credential.clone());
        Ok(())
    }

    async fn insert_endpoint(&self, endpoint: &EndpointPermission) -> Result<(), AppError> {
        let mut tables = self.write();
        let existing = tables
            .endpoints
            .values_mut()
            .find(|e| {
                e.database_id == endpoint.database_id
                    && e.collection == endpoint.collection
                    && e.method == endpoint.method
            });
        match existing {
            Some(e) => {
                e.path = endpoint.path.clone();
                e.is_active = endpoint.is_active;
                e.updated_at = endpoint.updated_at;
            }
            None => {
                tables.endpoints.insert(endpoint.id, endpoint.clone());
            }
        }
        Ok(())
    }

    async fn set_credential_active(&self, id: Uuid, active: bool) -> Result<bool, AppError> {
        Ok(match self.write().credentials.get_mut(&id) {
            Some(c) => {
                c.is_active = active;
                c.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_endpoint_active(&self, id: Uuid, active: bool) -> Result<bool, AppError> {
        Ok(match self.write().endpoints.get_mut(&id) {
            Some(e) => {
                e.is_active = active;
                e.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_backend_status(&self, id: Uuid, status: &str) -> Result<bool, AppError> {
        Ok(match self.write().backends.get_mut(&id) {
            Some(b) => {
                b.status = status.to_string();
                b.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn list_access_logs(&self, api_key_id: Uuid, limit: u32) -> Result<Vec<AccessLogEntry>, AppError> {
        let tables = self.read();
        let mut logs: Vec<AccessLogEntry> = tables
            .logs
            .iter()
            .filter(|l| l.api_key_id == api_key_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(limit as usize);
        Ok(logs)
    }

    async fn list_backends(&self, owner: Uuid) -> Result<Vec<BackendConnection>, AppError> {
        let mut out: Vec<BackendConnection> =
            self.read().backends.values().filter(|b| b.user_id == owner).cloned().collect();
        out.sort_by_key(|b| b.created_at);
        Ok(out)
    }

    async fn delete_backend(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError> {
        let mut tables = self.write();
        if !tables.backends.get(&id).is_some_and(|b| b.user_id == owner) {
            return Ok(false);
        }
        tables.backends.remove(&id);
        tables.credentials.retain(|_, c| c.database_id != id);
        tables.endpoints.retain(|_, e| e.database_id != id);
        Ok(true)
    }

    async fn list_credentials(&self, owner: Uuid) -> Result<Vec<ApiCredential>, AppError> {
        let mut out: Vec<ApiCredential> =
            self.read().credentials.values().filter(|c| c.user_id == owner).cloned().collect();
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    async fn delete_credential(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError> {
        let mut tables = self.write();
        if !tables.credentials.get(&id).is_some_and(|c| c.user_id == owner) {
            return Ok(false);
        }
        tables.credentials.remove(&id);
        Ok(true)
    }

    async fn list_endpoints(&self, owner: Uuid, database_id: Option<Uuid>) -> Result<Vec<EndpointPermission>, AppError> {
        let tables = self.read();
        let mut out: Vec<EndpointPermission> = tables
            .endpoints
            .values()
            .filter(|e| database_id.map_or(true, |db| e.database_id == db))
            .filter(|e| tables.backends.get(&e.database_id).is_some_and(|b| b.user_id == owner))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        Ok(out)
    }

    async fn delete_endpoint(&self, id: Uuid, owner: Uuid) -> Result<bool, AppError> {
        let mut tables = self.write();
        let owned = tables
            .endpoints
            .get(&id)
            .and_then(|e| tables.backends.get(&e.database_id))
            .is_some_and(|b| b.user_id == owner);
        if owned {
            tables.endpoints.remove(&id);
        }
        Ok(owned)
    }

    async fn clear_access_logs(&self, owner: Uuid) -> Result<u64, AppError> {
        let mut tables = self.write();
        let keys: HashSet<Uuid> = tables
            .credentials
            .values()
            .filter(|c| c.user_id == owner)
            .map(|c| c.id)
            .collect();
        let before = tables.logs.len();
        tables.logs.retain(|l| !keys.contains(&l.api_key_id));
        Ok((before - tables.logs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::STATUS_ACTIVE;

    fn endpoint(database_id: Uuid, active: bool) -> EndpointPermission {
        EndpointPermission {
            id: Uuid::new_v4(),
            database_id,
            collection: "widgets".into(),
            path: EndpointPermission::public_path("widgets"),
            method: HttpVerb::Get,
            is_active: active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn endpoint_tuple_has_one_activation_state() {
        let store = MemoryControlStore::new();
        let db = Uuid::new_v4();
        store.insert_endpoint(&endpoint(db, true)).await.unwrap();
        store.insert_endpoint(&endpoint(db, false)).await.unwrap();
        assert_eq!(store.read().endpoints.len(), 1);
        let found = store.find_endpoint(db, "widgets", HttpVerb::Get).await.unwrap().unwrap();
        assert!(!found.is_active);
        assert!(store.find_endpoint(db, "widgets", HttpVerb::Post).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn credential_keys_are_unique() {
        let store = MemoryControlStore::new();
        let c = ApiCredential {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            database_id: Uuid::new_v4(),
            name: "k".into(),
            key: "dbp_same".into(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_credential(&c).await.unwrap();
        let dup = ApiCredential { id: Uuid::new_v4(), ..c.clone() };
        assert!(store.insert_credential(&dup).await.is_err());
        assert!(store.set_credential_active(c.id, false).await.unwrap());
        assert!(!store.find_credential_by_key("dbp_same").await.unwrap().unwrap().is_active);
        assert!(!store.set_credential_active(Uuid::new_v4(), false).await.unwrap());
    }

    #[tokio::test]
    async fn backends_are_scoped_to_their_owner() {
        let store = MemoryControlStore::new();
        let owner = Uuid::new_v4();
        let b = BackendConnection {
            id: Uuid::new_v4(),
            user_id: owner,
            name: "main".into(),
            kind: "postgres".into(),
            host: "localhost".into(),
            port: 5432,
            database: "app".into(),
            username: "u".into(),
            password: "p".into(),
            status: STATUS_ACTIVE.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_backend(&b).await.unwrap();
        assert!(store.find_backend_for_owner(b.id, owner).await.unwrap().is_some());
        assert!(store.find_backend_for_owner(b.id, Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.set_backend_status(b.id, "inactive").await.unwrap());
        assert!(!store.find_backend(b.id).await.unwrap().unwrap().is_active());
    }

    fn backend_for(owner: Uuid) -> BackendConnection {
        BackendConnection {
            id: Uuid::new_v4(),
            user_id: owner,
            name: "main".into(),
            kind: "postgres".into(),
            host: "localhost".into(),
            port: 5432,
            database: "app".into(),
            username: "u".into(),
            password: "p".into(),
            status: STATUS_ACTIVE.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn credential_for(backend: &BackendConnection) -> ApiCredential {
        ApiCredential {
            id: Uuid::new_v4(),
            user_id: backend.user_id,
            database_id: backend.id,
            name: "k".into(),
            key: ApiCredential::generate_key(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn log_for(credential: &ApiCredential, path: &str, at: DateTime<Utc>) -> AccessLogEntry {
        AccessLogEntry {
            id: Uuid::new_v4(),
            api_key_id: credential.id,
            endpoint_id: None,
            method: "GET".into(),
            path: path.into(),
            status_code: 200,
            response_time: 3,
            ip_address: "127.0.0.1".into(),
            user_agent: "test".into(),
            created_at: at,
        }
    }

    /// Runs the owner-scoping contract against any store implementation.
    pub(crate) async fn owner_scoped_listing_and_deletes(store: &dyn ControlStore) {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let a1 = backend_for(alice);
        let a2 = backend_for(alice);
        let b1 = backend_for(bob);
        for b in [&a1, &a2, &b1] {
            store.insert_backend(b).await.unwrap();
        }
        let ka = credential_for(&a1);
        let kb = credential_for(&b1);
        store.insert_credential(&ka).await.unwrap();
        store.insert_credential(&kb).await.unwrap();
        let e1 = endpoint(a1.id, true);
        let e2 = endpoint(a2.id, true);
        let e3 = endpoint(b1.id, true);
        for e in [&e1, &e2, &e3] {
            store.insert_endpoint(e).await.unwrap();
        }

        let ids: Vec<Uuid> = store.list_backends(alice).await.unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a1.id) && ids.contains(&a2.id));
        assert_eq!(store.list_credentials(alice).await.unwrap().len(), 1);
        assert_eq!(store.list_endpoints(alice, None).await.unwrap().len(), 2);
        let narrowed = store.list_endpoints(alice, Some(a2.id)).await.unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].id, e2.id);
        assert!(store.list_endpoints(alice, Some(b1.id)).await.unwrap().is_empty());

        // another owner's rows are untouchable
        assert!(!store.delete_credential(kb.id, alice).await.unwrap());
        assert!(!store.delete_endpoint(e3.id, alice).await.unwrap());
        assert!(!store.delete_backend(b1.id, alice).await.unwrap());
        assert!(store.find_backend(b1.id).await.unwrap().is_some());

        let t0 = Utc::now();
        store.insert_access_log(&log_for(&ka, "/api/widgets", t0)).await.unwrap();
        store.insert_access_log(&log_for(&kb, "/api/widgets", t0)).await.unwrap();
        assert_eq!(store.clear_access_logs(alice).await.unwrap(), 1);
        assert!(store.list_access_logs(ka.id, 10).await.unwrap().is_empty());
        assert_eq!(store.list_access_logs(kb.id, 10).await.unwrap().len(), 1);

        assert!(store.delete_endpoint(e2.id, alice).await.unwrap());
        assert!(store.find_endpoint_by_id(e2.id).await.unwrap().is_none());

        // deleting a backend takes its keys and endpoints with it
        assert!(store.delete_backend(a1.id, alice).await.unwrap());
        assert!(store.find_credential(ka.id).await.unwrap().is_none());
        assert!(store.find_endpoint_by_id(e1.id).await.unwrap().is_none());
        assert_eq!(store.list_backends(alice).await.unwrap().len(), 1);
        assert!(!store.delete_credential(ka.id, alice).await.unwrap());
        assert_eq!(store.list_credentials(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn memory_store_scopes_lists_and_deletes_to_owner() {
        owner_scoped_listing_and_deletes(&MemoryControlStore::new()).await;
    }
}
