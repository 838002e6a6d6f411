//! Load settings from the process environment (call `dotenvy::dotenv()` first to pick up `.env`).

use crate::config::types::{Limits, Settings};
use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

impl Settings {
    /// Read settings from env. Unset keys take defaults; malformed values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_secs: u64 = parse_or(get("BACKEND_TIMEOUT_SECS"), "BACKEND_TIMEOUT_SECS", defaults.backend_timeout.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "BACKEND_TIMEOUT_SECS",
                message: "must be greater than zero".into(),
            });
        }

        let idle_secs: u64 = parse_or(get("BACKEND_IDLE_SECS"), "BACKEND_IDLE_SECS", defaults.backend_idle_timeout.as_secs())?;
        if idle_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "BACKEND_IDLE_SECS",
                message: "must be greater than zero".into(),
            });
        }

        let control_schema = get("CONTROL_SCHEMA").unwrap_or(defaults.control_schema);
        if !is_plain_identifier(&control_schema) {
            return Err(ConfigError::Invalid {
                key: "CONTROL_SCHEMA",
                message: format!("'{}' is not a plain identifier", control_schema),
            });
        }

        Ok(Settings {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL"),
            control_schema,
            backend_timeout: Duration::from_secs(timeout_secs),
            backend_max_connections: parse_or(
                get("BACKEND_MAX_CONNECTIONS"),
                "BACKEND_MAX_CONNECTIONS",
                defaults.backend_max_connections,
            )?,
            backend_idle_timeout: Duration::from_secs(idle_secs),
            access_log_capacity: parse_or(get("ACCESS_LOG_CAPACITY"), "ACCESS_LOG_CAPACITY", defaults.access_log_capacity)?,
            limits: Limits {
                max_body_bytes: parse_or(get("MAX_BODY_BYTES"), "MAX_BODY_BYTES", defaults.limits.max_body_bytes)?,
                max_image_field_bytes: parse_or(
                    get("MAX_IMAGE_FIELD_BYTES"),
                    "MAX_IMAGE_FIELD_BYTES",
                    defaults.limits.max_image_field_bytes,
                )?,
            },
        })
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(s) => s.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
    }
}
