//! Settings types with their defaults.

use std::time::Duration;

/// Deadline for a single backend call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Whole request body ceiling (5 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
/// Ceiling for a single inline `data:image/...` field (1 MiB).
pub const DEFAULT_MAX_IMAGE_FIELD_BYTES: usize = 1024 * 1024;
pub const DEFAULT_BACKEND_MAX_CONNECTIONS: u32 = 10;
/// Pooled backend handles unused this long are closed.
pub const DEFAULT_BACKEND_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_ACCESS_LOG_CAPACITY: usize = 10_000;
/// Postgres schema holding the control tables.
pub const DEFAULT_CONTROL_SCHEMA: &str = "dbportal";

/// Payload ceilings enforced before backend dispatch.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub max_body_bytes: usize,
    pub max_image_field_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_image_field_bytes: DEFAULT_MAX_IMAGE_FIELD_BYTES,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    /// Control store URL. `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub control_schema: String,
    pub backend_timeout: Duration,
    pub backend_max_connections: u32,
    pub backend_idle_timeout: Duration,
    pub access_log_capacity: usize,
    pub limits: Limits,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_addr: "0.0.0.0:8080".into(),
            database_url: None,
            control_schema: DEFAULT_CONTROL_SCHEMA.into(),
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            backend_max_connections: DEFAULT_BACKEND_MAX_CONNECTIONS,
            backend_idle_timeout: DEFAULT_BACKEND_IDLE_TIMEOUT,
            access_log_capacity: DEFAULT_ACCESS_LOG_CAPACITY,
            limits: Limits::default(),
        }
    }
}
