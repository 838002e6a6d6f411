//! Shared application state for all routes.

use crate::access_log::AccessLogSender;
use crate::config::Limits;
use crate::pool::{DriverConnector, PoolManager};
use crate::service::CrudService;
use crate::store::ControlStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ControlStore>,
    pub crud: CrudService,
    /// Live backend pools; only read for readiness stats.
    pub pools: Arc<PoolManager<DriverConnector>>,
    pub access_log: AccessLogSender,
    pub limits: Limits,
}
