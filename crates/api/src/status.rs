// crates/api/src/status.rs
//! Client for the status surface: authoritative reads of a single job
//! and of a user's full job history.

use mailshift_types::{Job, JobUpdate};
use tracing::debug;

use crate::error::{ensure_success, ApiError};

#[derive(Debug, Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    base: String,
}

impl StatusClient {
    pub fn new(http: reqwest::Client, base: impl AsRef<str>) -> Self {
        Self {
            http,
            base: base.as_ref().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch one job's authoritative state. Returned as a partial
    /// record so it funnels through the same merge rule as realtime
    /// events.
    pub async fn job(
        &self,
        token: &str,
        user_id: &str,
        job_id: &str,
    ) -> Result<JobUpdate, ApiError> {
        debug!(%job_id, "fetching job status");
        let response = self
            .http
            .get(format!("{}/api/status/job/{job_id}", self.base))
            .bearer_auth(token)
            .header("X-User-Id", user_id)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(ApiError::from_reqwest)
    }

    /// Fetch the authoritative job set for a user.
    pub async fn user_jobs(&self, token: &str, user_id: &str) -> Result<Vec<Job>, ApiError> {
        debug!(%user_id, "fetching user jobs");
        let response = self
            .http
            .get(format!("{}/api/status/user/jobs/{user_id}", self.base))
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
