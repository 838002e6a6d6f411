//! Real drivers behind the pool: sqlx pools for the relational dialects, a mongodb client for documents.

use super::{ConnectParams, Connector};
use crate::model::Dialect;
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;

const MAX_LIFETIME: Duration = Duration::from_secs(3600);
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// One live backend. Relational handles are themselves small pools; cloning is cheap.
#[derive(Clone, Debug)]
pub enum BackendHandle {
    Postgres(PgPool),
    MySql(MySqlPool),
    Document { client: mongodb::Client, database: String },
}

pub struct DriverConnector {
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl DriverConnector {
    pub fn new(max_connections: u32, connect_timeout: Duration) -> Self {
        DriverConnector {
            max_connections,
            connect_timeout,
        }
    }

    async fn connect_postgres(&self, p: &ConnectParams) -> Result<BackendHandle, sqlx::Error> {
        let options = PgConnectOptions::new()
            .host(&p.host)
            .port(p.port)
            .database(&p.database)
            .username(&p.username)
            .password(&p.password);
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .max_lifetime(Some(MAX_LIFETIME))
            .connect_with(options)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(BackendHandle::Postgres(pool))
    }

    async fn connect_mysql(&self, p: &ConnectParams) -> Result<BackendHandle, sqlx::Error> {
        let options = MySqlConnectOptions::new()
            .host(&p.host)
            .port(p.port)
            .database(&p.database)
            .username(&p.username)
            .password(&p.password);
        let pool = MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .max_lifetime(Some(MAX_LIFETIME))
            .connect_with(options)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(BackendHandle::MySql(pool))
    }

    async fn connect_document(&self, p: &ConnectParams) -> Result<BackendHandle, mongodb::error::Error> {
        let mut options = ClientOptions::default();
        options.hosts = vec![ServerAddress::Tcp {
            host: p.host.clone(),
            port: Some(p.port),
        }];
        if !p.username.is_empty() {
            let mut credential = Credential::default();
            credential.username = Some(p.username.clone());
            credential.password = Some(p.password.clone());
            credential.source = Some(p.database.clone());
            options.credential = Some(credential);
        }
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);
        options.max_pool_size = Some(self.max_connections);
        let client = mongodb::Client::with_options(options)?;
        client.database(&p.database).run_command(doc! { "ping": 1 }).await?;
        Ok(BackendHandle::Document {
            client,
            database: p.database.clone(),
        })
    }
}

#[async_trait]
impl Connector for DriverConnector {
    type Handle = BackendHandle;

    async fn connect(&self, params: &ConnectParams) -> Result<BackendHandle, String> {
        match params.dialect {
            Dialect::Postgres => self.connect_postgres(params).await.map_err(|e| e.to_string()),
            Dialect::MySql => self.connect_mysql(params).await.map_err(|e| e.to_string()),
            Dialect::Document => self.connect_document(params).await.map_err(|e| e.to_string()),
        }
    }

    async fn is_alive(&self, handle: &BackendHandle) -> bool {
        let check = async {
            match handle {
                BackendHandle::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
                BackendHandle::MySql(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
                BackendHandle::Document { client, database } => client
                    .database(database)
                    .run_command(doc! { "ping": 1 })
                    .await
                    .is_ok(),
            }
        };
        tokio::time::timeout(self.connect_timeout, check).await.unwrap_or(false)
    }

    async fn close(&self, handle: BackendHandle) {
        match handle {
            BackendHandle::Postgres(pool) => pool.close().await,
            BackendHandle::MySql(pool) => pool.close().await,
            BackendHandle::Document { client, .. } => client.shutdown().await,
        }
    }
}
