//! Session user forwarded by the upstream auth layer in `X-User-ID`.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Auth("missing session user".into()))?;
        let id = Uuid::parse_str(raw).map_err(|_| AppError::Auth("invalid session user".into()))?;
        Ok(SessionUser(id))
    }
}
