// crates/api/src/config.rs
//! Endpoint configuration for the remote surfaces.

/// Base URLs for the three services plus the realtime endpoint.
///
/// Defaults match the development deployment; each can be overridden
/// through its environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// MAILSHIFT_AUTH_URL
    pub auth_url: String,
    /// MAILSHIFT_MIGRATION_URL
    pub migration_url: String,
    /// MAILSHIFT_STATUS_URL
    pub status_url: String,
    /// MAILSHIFT_WS_URL (e.g. wss://host/ws)
    pub realtime_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: env_or("MAILSHIFT_AUTH_URL", "http://localhost:8081"),
            migration_url: env_or("MAILSHIFT_MIGRATION_URL", "http://localhost:8082"),
            status_url: env_or("MAILSHIFT_STATUS_URL", "http://localhost:8083"),
            realtime_url: env_or("MAILSHIFT_WS_URL", "ws://localhost:8083/ws"),
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}
