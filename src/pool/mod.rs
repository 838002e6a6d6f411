//! Process-wide registry of live backend handles keyed by backend identity and credentials.
//!
//! Handles are created lazily, health-checked before every reuse and replaced when the check fails.
//! `acquire` for one key is single-flight; different keys never wait on each other. Slots whose
//! connect failed are dropped right away, and `evict_idle` closes handles nobody used recently.

mod driver;

pub use driver::{BackendHandle, DriverConnector};

use crate::error::AppError;
use crate::model::{BackendConnection, Dialect};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identity of a physical backend as seen by one login: (dialect, user, host, database, port).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub dialect: Dialect,
    pub username: String,
    pub host: String,
    pub database: String,
    pub port: u16,
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.username.is_empty() {
            write!(f, "{}://{}:{}/{}", self.dialect, self.host, self.port, self.database)
        } else {
            write!(
                f,
                "{}://{}@{}:{}/{}",
                self.dialect, self.username, self.host, self.port, self.database
            )
        }
    }
}

/// Everything needed to open a connection. The password never appears in Debug output.
#[derive(Clone)]
pub struct ConnectParams {
    pub dialect: Dialect,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ConnectParams {
    pub fn from_backend(b: &BackendConnection) -> Result<Self, AppError> {
        Ok(ConnectParams {
            dialect: b.dialect()?,
            host: b.host.clone(),
            port: b.port,
            database: b.database.clone(),
            username: b.username.clone(),
            password: b.password.clone(),
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            dialect: self.dialect,
            username: self.username.clone(),
            host: self.host.clone(),
            database: self.database.clone(),
            port: self.port,
        }
    }
}

/// Registry key. Two registrations share a handle only when they present the same password too.
#[derive(Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    fingerprint: Fingerprint,
    password: String,
}

impl SlotKey {
    fn new(params: &ConnectParams) -> Self {
        SlotKey {
            fingerprint: params.fingerprint(),
            password: params.password.clone(),
        }
    }
}

impl std::fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Opens, health-checks and closes one kind of handle.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    /// Establish a handle. The error string is the driver's cause.
    async fn connect(&self, params: &ConnectParams) -> Result<Self::Handle, String>;

    /// Lightweight liveness check (`SELECT 1` / `{ping: 1}`).
    async fn is_alive(&self, handle: &Self::Handle) -> bool;

    async fn close(&self, handle: Self::Handle);
}

struct Pooled<H> {
    handle: H,
    last_used: Instant,
}

type Slot<H> = Arc<tokio::sync::Mutex<Option<Pooled<H>>>>;

#[derive(Clone, Debug, Default, Serialize)]
pub struct PoolStats {
    pub live: usize,
    pub by_dialect: BTreeMap<String, usize>,
    /// Registry entries, live or being connected.
    pub slots: usize,
    pub created: u64,
    pub evicted: u64,
}

pub struct PoolManager<C: Connector> {
    connector: C,
    slots: Mutex<HashMap<SlotKey, Slot<C::Handle>>>,
    live: Mutex<HashSet<SlotKey>>,
    created: AtomicU64,
    evicted: AtomicU64,
}

impl<C: Connector> PoolManager<C> {
    pub fn new(connector: C) -> Self {
        PoolManager {
            connector,
            slots: Mutex::new(HashMap::new()),
            live: Mutex::new(HashSet::new()),
            created: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn slot(&self, key: &SlotKey) -> Slot<C::Handle> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }

    /// Drop `slot` from the registry if it is still empty and no other task holds it.
    /// Callers own exactly one reference besides the map's.
    fn forget_if_empty(&self, key: &SlotKey, slot: &Slot<C::Handle>) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(slot) != 2 {
            return;
        }
        let empty = slot.try_lock().map(|guard| guard.is_none()).unwrap_or(false);
        if empty && slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    fn mark_live(&self, key: &SlotKey, live: bool) {
        let mut set = self.live.lock().unwrap_or_else(|e| e.into_inner());
        if live {
            set.insert(key.clone());
        } else {
            set.remove(key);
        }
    }

    /// Healthy handle for `params`, reusing the cached one when its health check passes.
    pub async fn acquire(&self, params: &ConnectParams) -> Result<C::Handle, AppError> {
        let key = SlotKey::new(params);
        let slot = self.slot(&key);
        let result = self.acquire_in(&key, &slot, params).await;
        if result.is_err() {
            self.forget_if_empty(&key, &slot);
        }
        result
    }

    async fn acquire_in(&self, key: &SlotKey, slot: &Slot<C::Handle>, params: &ConnectParams) -> Result<C::Handle, AppError> {
        let fp = &key.fingerprint;
        let mut guard = slot.lock().await;

        if let Some(pooled) = guard.as_mut() {
            if self.connector.is_alive(&pooled.handle).await {
                pooled.last_used = Instant::now();
                return Ok(pooled.handle.clone());
            }
            tracing::warn!(backend = %fp, "health check failed, evicting handle");
            self.evicted.fetch_add(1, Ordering::Relaxed);
            self.mark_live(key, false);
            if let Some(stale) = guard.take() {
                self.connector.close(stale.handle).await;
            }
        }

        let handle = self
            .connector
            .connect(params)
            .await
            .map_err(|cause| AppError::Connection {
                fingerprint: fp.to_string(),
                cause,
            })?;
        self.created.fetch_add(1, Ordering::Relaxed);
        self.mark_live(key, true);
        tracing::info!(backend = %fp, "backend connection established");
        *guard = Some(Pooled {
            handle: handle.clone(),
            last_used: Instant::now(),
        });
        Ok(handle)
    }

    /// Open a throwaway connection with exactly these credentials, then close it.
    /// Never served from (or added to) the registry.
    pub async fn verify(&self, params: &ConnectParams) -> Result<(), AppError> {
        let fp = params.fingerprint();
        let handle = self
            .connector
            .connect(params)
            .await
            .map_err(|cause| AppError::Connection {
                fingerprint: fp.to_string(),
                cause,
            })?;
        self.connector.close(handle).await;
        tracing::debug!(backend = %fp, "backend credentials verified");
        Ok(())
    }

    /// Close handles unused for at least `max_idle`. Slots held by an in-flight acquire are skipped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let stale: Vec<(SlotKey, C::Handle)> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let mut out = Vec::new();
            slots.retain(|key, slot| {
                if Arc::strong_count(slot) != 1 {
                    return true;
                }
                let Ok(mut guard) = slot.try_lock() else {
                    return true;
                };
                if matches!(guard.as_ref(), Some(pooled) if pooled.last_used.elapsed() < max_idle) {
                    return true;
                }
                if let Some(pooled) = guard.take() {
                    out.push((key.clone(), pooled.handle));
                }
                false
            });
            out
        };

        let count = stale.len();
        for (key, handle) in stale {
            self.mark_live(&key, false);
            self.connector.close(handle).await;
            tracing::debug!(backend = %key.fingerprint, "idle backend connection closed");
        }
        self.evicted.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner()).len();
        let set = self.live.lock().unwrap_or_else(|e| e.into_inner());
        let mut by_dialect = BTreeMap::new();
        for key in set.iter() {
            *by_dialect.entry(key.fingerprint.dialect.to_string()).or_insert(0) += 1;
        }
        PoolStats {
            live: set.len(),
            by_dialect,
            slots,
            created: self.created.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Close every handle and empty the registry.
    pub async fn close_all(&self) {
        let drained: Vec<(SlotKey, Slot<C::Handle>)> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.drain().collect()
        };
        for (key, slot) in drained {
            if let Some(pooled) = slot.lock().await.take() {
                self.connector.close(pooled.handle).await;
                tracing::debug!(backend = %key.fingerprint, "backend connection closed");
            }
            self.mark_live(&key, false);
        }
    }
}

/// Background task that periodically runs [`PoolManager::evict_idle`].
pub struct IdleReaper {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl IdleReaper {
    /// Spawn the reaper. Must be called inside a tokio runtime.
    pub fn start<C: Connector>(pools: Arc<PoolManager<C>>, max_idle: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let every = (max_idle / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let closed = pools.evict_idle(max_idle).await;
                        if closed > 0 {
                            tracing::info!(closed, "idle backend connections reaped");
                        }
                    }
                }
            }
        });
        tracing::info!(max_idle = ?max_idle, "idle connection reaper started");
        IdleReaper { shutdown, task }
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "idle reaper ended abnormally");
        }
    }
}
