//! dbportal server.
//!
//! Run from repo root: `cargo run -p dbportal-server`

use dbportal::{
    app, AccessLogger, AdapterRegistry, AppState, ControlStore, CrudService, DriverConnector, IdleReaper,
    MemoryControlStore, PgControlStore, PoolManager, Settings,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dbportal=info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let store: Arc<dyn ControlStore> = match &settings.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            let store = PgControlStore::new(pool, settings.control_schema.clone());
            store.ensure_control_tables().await?;
            tracing::info!(schema = %settings.control_schema, "using postgres control store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, control store is in-memory and will not survive restart");
            Arc::new(MemoryControlStore::new())
        }
    };

    let pools = Arc::new(PoolManager::new(DriverConnector::new(
        settings.backend_max_connections,
        settings.backend_timeout,
    )));
    let reaper = IdleReaper::start(pools.clone(), settings.backend_idle_timeout);
    let registry = Arc::new(AdapterRegistry::pooled(pools.clone()));
    let logger = AccessLogger::start(store.clone(), settings.access_log_capacity);

    let state = AppState {
        store,
        crud: CrudService::new(registry, settings.backend_timeout),
        pools: pools.clone(),
        access_log: logger.sender(),
        limits: settings.limits,
    };

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("dbportal listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown requested");
        })
        .await?;

    logger.shutdown().await;
    reaper.shutdown().await;
    pools.close_all().await;
    Ok(())
}
