//! Extract the API credential from the `X-API-Key` header.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Raw credential secret, if the caller sent one. Resolution happens in the gatekeeper.
#[derive(Clone, Debug)]
pub struct ApiKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(ApiKey(value))
    }
}
