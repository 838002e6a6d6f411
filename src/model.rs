//! Control-plane records and the closed set of backend dialects.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Backend query model. Selected from the connection's `type` tag at dispatch time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MongoDB document store.
    Document,
    /// PostgreSQL (positional `$n` placeholders).
    Postgres,
    /// MySQL / MariaDB (unnumbered `?` placeholders).
    MySql,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Document => "mongodb",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(Dialect::Document),
            "postgres" | "postgresql" | "cockroachdb" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            other => Err(AppError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// HTTP verbs an endpoint permission can be granted for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
        }
    }

    pub fn from_method(method: &axum::http::Method) -> Option<Self> {
        match *method {
            axum::http::Method::GET => Some(HttpVerb::Get),
            axum::http::Method::POST => Some(HttpVerb::Post),
            axum::http::Method::PUT => Some(HttpVerb::Put),
            axum::http::Method::DELETE => Some(HttpVerb::Delete),
            _ => None,
        }
    }
}

impl std::str::FromStr for HttpVerb {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpVerb::Get),
            "POST" => Ok(HttpVerb::Post),
            "PUT" => Ok(HttpVerb::Put),
            "DELETE" => Ok(HttpVerb::Delete),
            other => Err(AppError::Validation(format!("unsupported method: {}", other))),
        }
    }
}

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";

/// A user-registered target database.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Raw type tag as registered (`mongodb`, `postgres`, `mysql`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackendConnection {
    pub fn dialect(&self) -> Result<Dialect, AppError> {
        self.kind.parse()
    }

    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_ACTIVE)
    }
}

/// API key bound to one backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub database_id: Uuid,
    pub name: String,
    pub key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiCredential {
    /// Opaque secret: `dbp_` followed by 64 hex chars from two v4 uuids.
    pub fn generate_key() -> String {
        format!("dbp_{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }
}

/// Activation state of one (backend, collection, verb) endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointPermission {
    pub id: Uuid,
    pub database_id: Uuid,
    pub collection: String,
    pub path: String,
    pub method: HttpVerb,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EndpointPermission {
    pub fn public_path(collection: &str) -> String {
        format!("/api/{}", collection)
    }
}

/// Audit record of one gated request. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub endpoint_id: Option<Uuid>,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    /// Milliseconds.
    pub response_time: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// One inferred field of a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        FieldInfo {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_tags_parse_with_aliases() {
        assert_eq!("mongodb".parse::<Dialect>().unwrap(), Dialect::Document);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mariadb".parse::<Dialect>().unwrap(), Dialect::MySql);
        let err = "redis".parse::<Dialect>().unwrap_err();
        assert!(matches!(err, AppError::UnsupportedBackend(ref t) if t == "redis"));
    }

    #[test]
    fn generated_keys_are_unique_and_prefixed() {
        let a = ApiCredential::generate_key();
        let b = ApiCredential::generate_key();
        assert!(a.starts_with("dbp_"));
        assert_eq!(a.len(), 4 + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn verbs_round_trip_through_method() {
        assert_eq!(HttpVerb::from_method(&axum::http::Method::PUT), Some(HttpVerb::Put));
        assert_eq!(HttpVerb::from_method(&axum::http::Method::PATCH), None);
        assert_eq!("delete".parse::<HttpVerb>().unwrap(), HttpVerb::Delete);
    }
}
