//! API gatekeeper: credential → bound backend → endpoint activation, then dispatch.
//!
//! Every gated request whose credential resolves produces exactly one access log entry, whatever
//! the outcome.

use crate::error::AppError;
use crate::extractors::ApiKey;
use crate::model::{AccessLogEntry, ApiCredential, BackendConnection, EndpointPermission, HttpVerb};
use crate::state::AppState;
use crate::store::ControlStore;
use axum::{
    extract::{ConnectInfo, OriginalUri, Path, Request, State},
    http::header::USER_AGENT,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use uuid::Uuid;

/// Everything a gated handler needs, inserted into request extensions by [`gate`].
#[derive(Clone, Debug)]
pub struct Grant {
    pub credential: ApiCredential,
    pub backend: BackendConnection,
    pub endpoint: EndpointPermission,
}

/// Missing, unknown and inactive keys all fail the same way.
pub async fn resolve_credential(store: &dyn ControlStore, key: Option<&str>) -> Result<ApiCredential, AppError> {
    let key = key.ok_or_else(|| AppError::Auth("API key required".into()))?;
    match store.find_credential_by_key(key).await? {
        Some(c) if c.is_active => Ok(c),
        _ => Err(AppError::Auth("invalid or inactive API key".into())),
    }
}

pub async fn authorize(
    store: &dyn ControlStore,
    credential: ApiCredential,
    collection: &str,
    verb: HttpVerb,
) -> Result<Grant, AppError> {
    let backend = store
        .find_backend(credential.database_id)
        .await?
        .ok_or_else(|| AppError::NotFound("database connection not found".into()))?;
    if !backend.is_active() {
        return Err(AppError::Authorization("database connection is inactive".into()));
    }
    let endpoint = match store.find_endpoint(backend.id, collection, verb).await? {
        Some(e) if e.is_active => e,
        _ => {
            return Err(AppError::Authorization(format!(
                "endpoint {} {} is not active",
                verb.as_str(),
                EndpointPermission::public_path(collection)
            )))
        }
    };
    Ok(Grant {
        credential,
        backend,
        endpoint,
    })
}

fn client_ip(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Route-layer middleware for the dynamic surface.
pub async fn gate(
    State(state): State<AppState>,
    ApiKey(key): ApiKey,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|u| u.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let ip_address = client_ip(&req);
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let credential = match resolve_credential(state.store.as_ref(), key.as_deref()).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    let api_key_id = credential.id;

    let collection = params.get("collection").map(String::as_str).unwrap_or_default();
    let verb = HttpVerb::from_method(&method)
        .ok_or_else(|| AppError::BadRequest(format!("method {} not supported", method)));
    let grant = match verb {
        Ok(verb) => authorize(state.store.as_ref(), credential, collection, verb).await,
        Err(e) => Err(e),
    };

    let (response, endpoint_id) = match grant {
        Ok(grant) => {
            let endpoint_id = grant.endpoint.id;
            tracing::debug!(backend = %grant.backend.id, collection = %collection, method = %method, "gate passed");
            req.extensions_mut().insert(grant);
            (next.run(req).await, Some(endpoint_id))
        }
        Err(e) => (e.into_response(), None),
    };

    state.access_log.record(AccessLogEntry {
        id: Uuid::new_v4(),
        api_key_id,
        endpoint_id,
        method: method.to_string(),
        path,
        status_code: response.status().as_u16(),
        response_time: started.elapsed().as_millis() as i64,
        ip_address,
        user_agent,
        created_at: Utc::now(),
    });
    response
}
