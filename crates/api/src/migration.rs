// crates/api/src/migration.rs
//! Client for the migration control surface: start, pause, resume,
//! cancel. The backend performs the work asynchronously; progress
//! arrives through the status surface and the realtime stream.

use mailshift_types::MigrationCategory;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ensure_success, Ack, ApiError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    migration_type: MigrationCategory,
    outlook_access_token: &'a str,
    gmail_access_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MigrationClient {
    http: reqwest::Client,
    base: String,
}

impl MigrationClient {
    pub fn new(http: reqwest::Client, base: impl AsRef<str>) -> Self {
        Self {
            http,
            base: base.as_ref().trim_end_matches('/').to_string(),
        }
    }

    /// Kick off a migration. Requires both provider access credentials;
    /// the caller guards on their presence before getting here.
    pub async fn start(
        &self,
        token: &str,
        category: MigrationCategory,
        outlook_access_token: &str,
        gmail_access_token: &str,
    ) -> Result<StartResponse, ApiError> {
        debug!(%category, "starting migration");
        let response = self
            .http
            .post(format!("{}/api/migration/start", self.base))
            .bearer_auth(token)
            .json(&StartRequest {
                migration_type: category,
                outlook_access_token,
                gmail_access_token,
            })
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(ApiError::from_reqwest)
    }

    pub async fn pause(&self, token: &str, job_id: &str) -> Result<Ack, ApiError> {
        self.control("pause", token, job_id).await
    }

    pub async fn resume(&self, token: &str, job_id: &str) -> Result<Ack, ApiError> {
        self.control("resume", token, job_id).await
    }

    pub async fn cancel(&self, token: &str, job_id: &str) -> Result<Ack, ApiError> {
        self.control("cancel", token, job_id).await
    }

    async fn control(&self, op: &str, token: &str, job_id: &str) -> Result<Ack, ApiError> {
        debug!(%op, %job_id, "migration control call");
        let response = self
            .http
            .post(format!("{}/api/migration/{op}/{job_id}", self.base))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(ApiError::from_reqwest)
    }
}
