//! Best-effort audit trail for gated requests.
//!
//! ```text
//! gate middleware → AccessLogSender::record (try_send) → bounded channel → worker → LogSink
//! ```
//!
//! The request path never waits on the channel or the store. A full queue drops the entry; a failed
//! or panicking write is logged once and forgotten. Shutdown closes the channel and drains what is
//! already queued.

use crate::error::AppError;
use crate::model::AccessLogEntry;
use crate::store::ControlStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where accepted entries end up.
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    async fn write(&self, entry: &AccessLogEntry) -> Result<(), AppError>;
}

#[async_trait]
impl LogSink for Arc<dyn ControlStore> {
    async fn write(&self, entry: &AccessLogEntry) -> Result<(), AppError> {
        self.insert_access_log(entry).await
    }
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AccessLogStats {
    pub queued: u64,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Cheap, cloneable handle used by the request path.
#[derive(Clone)]
pub struct AccessLogSender {
    tx: mpsc::Sender<AccessLogEntry>,
    counters: Arc<Counters>,
}

impl AccessLogSender {
    /// Queue `entry` without waiting. Dropped (and counted) if the queue is full or closed.
    pub fn record(&self, entry: AccessLogEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(entry)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(path = %entry.path, "access log queue full, entry dropped");
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(path = %entry.path, "access log closed, entry dropped");
            }
        }
    }

    pub fn stats(&self) -> AccessLogStats {
        AccessLogStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct AccessLogger {
    sender: AccessLogSender,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl AccessLogger {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn start<S: LogSink>(sink: S, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run(Arc::new(sink), rx, counters.clone(), shutdown.clone()));
        info!(capacity, "access logger started");
        AccessLogger {
            sender: AccessLogSender { tx, counters },
            shutdown,
            worker,
        }
    }

    pub fn sender(&self) -> AccessLogSender {
        self.sender.clone()
    }

    pub fn stats(&self) -> AccessLogStats {
        self.sender.stats()
    }

    /// Close the queue, persist everything already accepted, then stop the worker.
    pub async fn shutdown(self) -> AccessLogStats {
        self.shutdown.cancel();
        if let Err(e) = self.worker.await {
            warn!(error = %e, "access log worker ended abnormally");
        }
        let stats = self.sender.stats();
        info!(?stats, "access logger stopped");
        stats
    }
}

async fn run<S: LogSink>(
    sink: Arc<S>,
    mut rx: mpsc::Receiver<AccessLogEntry>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                rx.close();
                while let Some(entry) = rx.recv().await {
                    persist(&sink, entry, &counters).await;
                }
                break;
            }

            maybe_entry = rx.recv() => {
                match maybe_entry {
                    Some(entry) => persist(&sink, entry, &counters).await,
                    None => break,
                }
            }
        }
    }
}

/// One attempt. The write runs on its own task so a panicking sink cannot take the worker down.
async fn persist<S: LogSink>(sink: &Arc<S>, entry: AccessLogEntry, counters: &Counters) {
    let sink = sink.clone();
    let id = entry.id;
    let outcome = tokio::spawn(async move { sink.write(&entry).await }).await;
    match outcome {
        Ok(Ok(())) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(entry = %id, error = %e, "access log write failed");
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(entry = %id, error = %e, "access log write panicked");
        }
    }
}
