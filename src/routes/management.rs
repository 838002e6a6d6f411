//! Session-scoped management routes: collection browsing plus the control plane.

use crate::handlers::{control, management};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};

/// Mounted under `/api/database-management`.
pub fn management_routes(state: AppState) -> Router {
    Router::new()
        .route("/collections", get(management::list_collections))
        .route("/collections/:name/schema", get(management::collection_schema))
        .route(
            "/collections/:name/documents",
            get(management::list_documents).post(management::create_document),
        )
        .route(
            "/collections/:name/documents/:id",
            get(management::read_document)
                .put(management::update_document)
                .delete(management::delete_document),
        )
        .with_state(state)
}

/// Mounted under `/api/control`.
pub fn control_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/connections",
            get(control::list_connections).post(control::create_connection),
        )
        .route("/connections/test", post(control::test_connection))
        .route("/connections/:id", delete(control::delete_connection))
        .route("/connections/:id/status", put(control::set_connection_status))
        .route("/keys", get(control::list_keys).post(control::create_key))
        .route("/keys/:id", delete(control::delete_key))
        .route("/keys/:id/toggle", put(control::toggle_key))
        .route(
            "/endpoints",
            get(control::list_endpoints).post(control::create_endpoint),
        )
        .route("/endpoints/:id", delete(control::delete_endpoint))
        .route("/endpoints/:id/toggle", put(control::toggle_endpoint))
        .route("/logs", get(control::list_logs).delete(control::clear_logs))
        .with_state(state)
}
