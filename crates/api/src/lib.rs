// crates/api/src/lib.rs
//! Clients for the remote surfaces the migration client depends on:
//! authentication, migration control, and job status. All calls are
//! bounded by a fixed timeout and return `ApiError` values; nothing in
//! here panics on a bad response.

pub mod auth;
pub mod config;
pub mod error;
pub mod migration;
pub mod status;

pub use auth::{AuthClient, AuthResponse, TokenValidation};
pub use config::Endpoints;
pub use error::{Ack, ApiError};
pub use migration::{MigrationClient, StartResponse};
pub use status::StatusClient;

use std::time::Duration;

/// Upper bound on every remote call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The three remote surfaces, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct Backend {
    pub auth: AuthClient,
    pub migration: MigrationClient,
    pub status: StatusClient,
    pub endpoints: Endpoints,
}

impl Backend {
    pub fn new(endpoints: Endpoints) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::Init)?;
        Ok(Self {
            auth: AuthClient::new(http.clone(), &endpoints.auth_url),
            migration: MigrationClient::new(http.clone(), &endpoints.migration_url),
            status: StatusClient::new(http, &endpoints.status_url),
            endpoints,
        })
    }
}
