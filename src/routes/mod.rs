//! Router assembly.

mod common;
mod dynamic;
mod management;

pub use common::common_routes;
pub use dynamic::dynamic_routes;
pub use management::{control_routes, management_routes};

use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Full application router. Nested prefixes are matched before the dynamic `/api/:collection` routes.
pub fn app(state: AppState) -> Router {
    let max_body = state.limits.max_body_bytes;
    Router::new()
        .nest("/api/database-management", management_routes(state.clone()))
        .nest("/api/control", control_routes(state.clone()))
        .nest("/api", dynamic_routes(state.clone()))
        .merge(common_routes(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TraceLayer::new_for_http())
}
