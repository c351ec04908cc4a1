// crates/types/src/job.rs
//! Migration job records and the status-event merge rule.
//!
//! A `Job` is mutated exclusively by merging `JobUpdate`s: partial,
//! Job-shaped records arriving from the realtime stream or from status
//! polls. The merge is idempotent and tolerates duplicate and
//! out-of-order delivery: stale updates (older `updatedAt`) are
//! rejected, and terminal jobs accept no further mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status of a migration job. Transitions form a DAG; completed,
/// failed and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the transition `self -> to` is allowed.
    ///
    /// pending -> in_progress | completed | failed | cancelled
    /// in_progress -> paused | completed | failed | cancelled
    /// paused -> in_progress | cancelled
    /// terminal -> (nothing)
    ///
    /// A pending job may go terminal directly: the backend cancels or
    /// fails jobs that never reached in_progress.
    pub fn can_transition(self, to: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Pending => matches!(to, InProgress | Completed | Failed | Cancelled),
            InProgress => matches!(to, Paused | Completed | Failed | Cancelled),
            Paused => matches!(to, InProgress | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a migration job moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationCategory {
    Mail,
    Contacts,
    Calendar,
    Drive,
    All,
}

impl MigrationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationCategory::Mail => "mail",
            MigrationCategory::Contacts => "contacts",
            MigrationCategory::Calendar => "calendar",
            MigrationCategory::Drive => "drive",
            MigrationCategory::All => "all",
        }
    }
}

impl std::fmt::Display for MigrationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MigrationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mail" => Ok(MigrationCategory::Mail),
            "contacts" => Ok(MigrationCategory::Contacts),
            "calendar" => Ok(MigrationCategory::Calendar),
            "drive" => Ok(MigrationCategory::Drive),
            "all" => Ok(MigrationCategory::All),
            other => Err(format!("unknown migration category: {other}")),
        }
    }
}

/// A migration job as known to the client. Server-authoritative; the
/// only locally fabricated instance is the start-migration placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_type: Option<MigrationCategory>,
    pub status: JobStatus,
    /// Integer percentage, 0..=100.
    pub progress: u8,
    #[serde(default)]
    pub total_items: u32,
    #[serde(default)]
    pub processed_items: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A partial job record, as carried by realtime frames and poll
/// responses. Every field except `jobId` is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_type: Option<MigrationCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// What a merge did, for the caller to act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub changed: bool,
    /// Set when this merge moved the job into a terminal status.
    /// Because terminal jobs are frozen, this fires at most once per
    /// job no matter how often the terminal event is re-delivered.
    pub entered_terminal: Option<JobStatus>,
}

impl MergeOutcome {
    fn unchanged() -> Self {
        Self::default()
    }

    /// Combine outcomes for the same update applied to two copies of
    /// the same job (job list entry and current-job pointer).
    pub fn or(self, other: MergeOutcome) -> MergeOutcome {
        MergeOutcome {
            changed: self.changed || other.changed,
            entered_terminal: self.entered_terminal.or(other.entered_terminal),
        }
    }
}

impl Job {
    /// The synthetic current-job record installed right after a start
    /// command succeeds, before the first authoritative event arrives.
    pub fn placeholder(job_id: impl Into<String>, category: MigrationCategory) -> Self {
        Self {
            job_id: job_id.into(),
            user_id: None,
            user_email: None,
            migration_type: Some(category),
            status: JobStatus::InProgress,
            progress: 0,
            total_items: 0,
            processed_items: 0,
            message: Some("Migration starting...".to_string()),
            started_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    /// Merge a partial update into this job, incoming fields winning.
    ///
    /// Rejected outright: updates for a different job, updates older
    /// than the stored `updatedAt`, and any update once the job is
    /// terminal. A status change that the transition DAG forbids is
    /// dropped while the remaining fields still merge.
    pub fn apply(&mut self, update: &JobUpdate) -> MergeOutcome {
        if update.job_id != self.job_id {
            return MergeOutcome::unchanged();
        }
        if self.status.is_terminal() {
            debug!(job_id = %self.job_id, status = %self.status, "ignoring update for terminal job");
            return MergeOutcome::unchanged();
        }
        if let (Some(incoming), Some(current)) = (update.updated_at, self.updated_at) {
            if incoming < current {
                debug!(job_id = %self.job_id, %incoming, %current, "ignoring stale update");
                return MergeOutcome::unchanged();
            }
        }

        let mut changed = false;
        let mut entered_terminal = None;

        if let Some(status) = update.status {
            if status != self.status {
                if self.status.can_transition(status) {
                    self.status = status;
                    changed = true;
                    if status.is_terminal() {
                        entered_terminal = Some(status);
                    }
                } else {
                    debug!(
                        job_id = %self.job_id,
                        from = %self.status,
                        to = %status,
                        "dropping status change outside the transition table"
                    );
                }
            }
        }

        macro_rules! merge_field {
            ($field:ident) => {
                if let Some(value) = &update.$field {
                    if self.$field.as_ref() != Some(value) {
                        self.$field = Some(value.clone());
                        changed = true;
                    }
                }
            };
        }
        merge_field!(user_id);
        merge_field!(user_email);
        merge_field!(message);

        if let Some(category) = update.migration_type {
            if self.migration_type != Some(category) {
                self.migration_type = Some(category);
                changed = true;
            }
        }
        if let Some(progress) = update.progress {
            if self.progress != progress {
                self.progress = progress;
                changed = true;
            }
        }
        if let Some(total) = update.total_items {
            if self.total_items != total {
                self.total_items = total;
                changed = true;
            }
        }
        if let Some(processed) = update.processed_items {
            if self.processed_items != processed {
                self.processed_items = processed;
                changed = true;
            }
        }
        if let Some(started) = update.started_at {
            if self.started_at != Some(started) {
                self.started_at = Some(started);
                changed = true;
            }
        }
        if let Some(updated) = update.updated_at {
            if self.updated_at != Some(updated) {
                self.updated_at = Some(updated);
                changed = true;
            }
        }

        MergeOutcome {
            changed,
            entered_terminal,
        }
    }
}

impl JobUpdate {
    /// Materialize a full job from a partial record, for adopting an
    /// event that arrived before any local knowledge of the job.
    pub fn into_job(self) -> Job {
        Job {
            job_id: self.job_id,
            user_id: self.user_id,
            user_email: self.user_email,
            migration_type: self.migration_type,
            status: self.status.unwrap_or(JobStatus::Pending),
            progress: self.progress.unwrap_or(0),
            total_items: self.total_items.unwrap_or(0),
            processed_items: self.processed_items.unwrap_or(0),
            message: self.message,
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }
}
