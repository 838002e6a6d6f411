//! Dynamic CRUD routes. Every route sits behind the gatekeeper.

use crate::gatekeeper::gate;
use crate::handlers::dynamic::{create, delete, list, read, update};
use crate::state::AppState;
use axum::{middleware::from_fn_with_state, routing::get, Router};

pub fn dynamic_routes(state: AppState) -> Router {
    Router::new()
        .route("/:collection", get(list).post(create))
        .route("/:collection/:id", get(read).put(update).delete(delete))
        .route_layer(from_fn_with_state(state.clone(), gate))
        .with_state(state)
}
