//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Malformed identifier, id or body.
    #[error("validation: {0}")]
    Validation(String),
    /// Missing, unknown or inactive API credential / session.
    #[error("unauthorized: {0}")]
    Auth(String),
    /// Credential is valid but the endpoint or backend is not active.
    #[error("forbidden: {0}")]
    Authorization(String),
    #[error("connection to {fingerprint} failed: {cause}")]
    Connection { fingerprint: String, cause: String },
    #[error("backend call exceeded {0:?}")]
    Timeout(std::time::Duration),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported backend type: {0}")]
    UnsupportedBackend(String),
    /// The target backend rejected the statement.
    #[error("query failed: {0}")]
    Query(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Control-store failure.
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::Connection { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnsupportedBackend(_) => StatusCode::BAD_REQUEST,
            AppError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Validation(_) => "validation_error",
            AppError::Auth(_) => "unauthorized",
            AppError::Authorization(_) => "forbidden",
            AppError::Connection { .. } => "connection_error",
            AppError::Timeout(_) => "timeout",
            AppError::NotFound(_) => "not_found",
            AppError::UnsupportedBackend(_) => "unsupported_backend",
            AppError::Query(_) => "query_error",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::BadRequest(_) => "bad_request",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Db(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Message returned to the caller. Driver internals stay in the server log.
    fn public_message(&self) -> String {
        match self {
            AppError::Connection { fingerprint, .. } => {
                format!("failed to connect to backend {}", fingerprint)
            }
            AppError::Query(_) => "backend rejected the operation".to_string(),
            AppError::Db(sqlx::Error::RowNotFound) => "not found".to_string(),
            AppError::Db(_) => "control store failure".to_string(),
            AppError::Config(_) | AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.public_message(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn each_error_kind_maps_to_one_status() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Auth("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Authorization("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::UnsupportedBackend("redis".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::PayloadTooLarge("x".into()).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            AppError::Timeout(Duration::from_secs(10)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::Query("syntax".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn backend_internals_are_not_exposed() {
        let err = AppError::Query("relation \"secret_table\" does not exist".into());
        assert!(!err.public_message().contains("secret_table"));
        let err = AppError::Connection {
            fingerprint: "postgres://db.local:5432/app".into(),
            cause: "password authentication failed for user admin".into(),
        };
        let msg = err.public_message();
        assert!(msg.contains("db.local"));
        assert!(!msg.contains("password"));
    }
}
