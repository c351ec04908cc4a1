// crates/sync/src/coordinator.rs
//! The migration state coordinator: single source of truth for the
//! job set and the current job. Issues commands against the migration
//! control surface, merges realtime events and poll results through
//! the one merge path, and reports outcomes on the notification queue.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use mailshift_api::{ApiError, Backend};
use mailshift_notify::{NotificationId, Notifier};
use mailshift_session::SessionStore;
use mailshift_types::{Job, JobStatus, JobUpdate, MergeOutcome, MigrationCategory};

use crate::board::JobBoard;
use crate::link::{LinkState, RealtimeLink};

/// Failures from coordinator commands. By the time one of these is
/// returned the user-facing notification has already been posted.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not signed in")]
    NotSignedIn,

    /// One or both provider authorization slots are empty. No remote
    /// call is made in this case.
    #[error("OAuth tokens not found. Please connect both accounts.")]
    MissingAuthorization,

    /// The control surface answered without a job id.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Delay before the confirmation / reconciliation poll that
    /// follows a control command.
    pub reconcile_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reconcile_delay: Duration::from_secs(1),
        }
    }
}

pub struct Coordinator {
    session: Arc<SessionStore>,
    backend: Backend,
    notifier: Notifier,
    link: Arc<RealtimeLink>,
    board: RwLock<JobBoard>,
    /// The sticky "migration in progress" toast, dismissed on the
    /// first terminal outcome.
    migrating_toast: Mutex<Option<NotificationId>>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        session: Arc<SessionStore>,
        backend: Backend,
        notifier: Notifier,
        link: Arc<RealtimeLink>,
    ) -> Self {
        Self::with_config(session, backend, notifier, link, CoordinatorConfig::default())
    }

    pub fn with_config(
        session: Arc<SessionStore>,
        backend: Backend,
        notifier: Notifier,
        link: Arc<RealtimeLink>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            session,
            backend,
            notifier,
            link,
            board: RwLock::new(JobBoard::new()),
            migrating_toast: Mutex::new(None),
            config,
        }
    }

    // ── realtime wiring ──────────────────────────────────────────────

    /// Wire the realtime link to this coordinator and open it for the
    /// signed-in identity. Call once per identity change; `establish`
    /// itself is idempotent for the same identity.
    pub fn connect(self: &Arc<Self>) -> Result<(), CommandError> {
        let session = self.session.session().ok_or(CommandError::NotSignedIn)?;
        self.attach();
        self.link.establish(&session.identity, Some(&session.token));
        Ok(())
    }

    /// Manual reconnect affordance: tear the link down and establish a
    /// fresh connection with the still-valid session credential.
    pub fn reconnect(&self) -> Result<(), CommandError> {
        let session = self.session.session().ok_or(CommandError::NotSignedIn)?;
        info!("reconnecting realtime link");
        self.link.force_reconnect();
        self.link.establish(&session.identity, Some(&session.token));
        Ok(())
    }

    /// Detach from the link and close it (sign-out / disposal).
    pub fn disconnect(&self) {
        self.link.clear_handler();
        self.link.teardown();
    }

    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Register the long-lived event handler and spawn the pump that
    /// drives events through the merge path. Re-attaching replaces the
    /// handler, so the previous pump drains and exits; events are
    /// never delivered twice.
    fn attach(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobUpdate>();
        self.link.set_handler(move |update| {
            let _ = tx.send(update);
        });
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.apply_event(update).await;
            }
            debug!("event pump stopped");
        });
    }

    // ── state snapshots ──────────────────────────────────────────────

    pub fn jobs(&self) -> Vec<Job> {
        self.with_board(|board| board.jobs().to_vec())
    }

    pub fn current_job(&self) -> Option<Job> {
        self.with_board(|board| board.current().cloned())
    }

    /// Explicit "new migration" reset; the job set is untouched.
    pub fn reset_current(&self) {
        self.with_board_mut(|board| board.clear_current());
    }

    // ── operations ───────────────────────────────────────────────────

    /// Fetch the authoritative job set and replace the local one
    /// wholesale. On failure the local set is left unchanged and an
    /// empty set is returned.
    pub async fn list_jobs(&self) -> Vec<Job> {
        let Some(session) = self.session.session() else {
            return Vec::new();
        };
        match self
            .backend
            .status
            .user_jobs(&session.token, &session.identity.user_id)
            .await
        {
            Ok(jobs) => {
                debug!(count = jobs.len(), "job list refreshed");
                self.with_board_mut(|board| board.replace_all(jobs.clone()));
                jobs
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch user jobs");
                self.notifier.error("Failed to load migration history");
                Vec::new()
            }
        }
    }

    /// Start a migration. Requires both provider authorization slots;
    /// fails fast with zero remote calls otherwise. On success a
    /// placeholder current job is installed immediately (the one place
    /// local state is fabricated ahead of confirmation) and a
    /// confirmation poll is scheduled.
    pub async fn start_migration(
        self: &Arc<Self>,
        category: MigrationCategory,
    ) -> Result<String, CommandError> {
        let Some(session) = self.session.session() else {
            self.notifier.error("Please sign in first");
            return Err(CommandError::NotSignedIn);
        };
        let tokens = self.session.provider_tokens();
        let (Some(outlook), Some(gmail)) = (tokens.outlook, tokens.gmail) else {
            self.notifier
                .error("OAuth tokens not found. Please connect both accounts.");
            return Err(CommandError::MissingAuthorization);
        };

        let toast = self
            .notifier
            .loading(format!("Starting {category} migration..."));
        self.set_toast(toast);

        match self
            .backend
            .migration
            .start(
                &session.token,
                category,
                &outlook.access_token,
                &gmail.access_token,
            )
            .await
        {
            Ok(response) => match response.job_id {
                Some(job_id) => {
                    info!(%job_id, %category, "migration started");
                    self.with_board_mut(|board| {
                        board.set_current(Job::placeholder(&job_id, category))
                    });
                    self.schedule_reconcile(&job_id);
                    Ok(job_id)
                }
                None => {
                    self.dismiss_toast();
                    let message = response
                        .message
                        .unwrap_or_else(|| "Migration start failed".to_string());
                    self.notifier.error(message.clone());
                    Err(CommandError::Rejected(message))
                }
            },
            Err(e) => {
                self.dismiss_toast();
                self.notifier.error(format!("Failed to start migration: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn pause(self: &Arc<Self>, job_id: &str) -> Result<(), CommandError> {
        let session = self.session.session().ok_or(CommandError::NotSignedIn)?;
        match self.backend.migration.pause(&session.token, job_id).await {
            Ok(_) => {
                self.notifier.info("Migration paused");
                self.schedule_reconcile(job_id);
                Ok(())
            }
            Err(e) => {
                self.notifier.error(format!("Failed to pause migration: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn resume(self: &Arc<Self>, job_id: &str) -> Result<(), CommandError> {
        let session = self.session.session().ok_or(CommandError::NotSignedIn)?;
        match self.backend.migration.resume(&session.token, job_id).await {
            Ok(_) => {
                self.notifier.info("Migration resumed");
                self.schedule_reconcile(job_id);
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to resume migration: {e}"));
                Err(e.into())
            }
        }
    }

    /// Cancel clears the current-job pointer immediately and refreshes
    /// the job list; the stream's cancelled event then lands on an
    /// already-terminal record and is a no-op.
    pub async fn cancel(self: &Arc<Self>, job_id: &str) -> Result<(), CommandError> {
        let session = self.session.session().ok_or(CommandError::NotSignedIn)?;
        match self.backend.migration.cancel(&session.token, job_id).await {
            Ok(_) => {
                self.notifier.warning("Migration cancelled");
                self.with_board_mut(|board| board.clear_current());
                self.dismiss_toast();
                let _ = self.list_jobs().await;
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to cancel migration: {e}"));
                Err(e.into())
            }
        }
    }

    /// Fetch one job's authoritative state and merge it through the
    /// same path as realtime events. Errors are logged and swallowed.
    /// A result whose job is no longer relevant (current job cleared
    /// or changed, job absent from the list) is discarded.
    pub async fn poll_job_status(&self, job_id: &str) -> Option<Job> {
        let session = self.session.session()?;
        match self
            .backend
            .status
            .job(&session.token, &session.identity.user_id, job_id)
            .await
        {
            Ok(update) => {
                let relevant = self.with_board(|board| {
                    board.current_id() == Some(job_id) || board.contains(job_id)
                });
                if !relevant {
                    debug!(%job_id, "discarding poll result, context moved on");
                    return None;
                }
                let message = update.message.clone();
                let outcome = self.with_board_mut(|board| board.merge(&update));
                self.finish_merge(message.as_deref(), outcome).await;
                self.with_board(|board| {
                    board
                        .current()
                        .filter(|job| job.job_id == job_id)
                        .or_else(|| board.get(job_id))
                        .cloned()
                })
            }
            Err(e) => {
                warn!(%job_id, error = %e, "failed to fetch job status");
                None
            }
        }
    }

    /// Apply one inbound status event: merge, then run the terminal
    /// side effects when this merge moved the job into a terminal
    /// state.
    pub async fn apply_event(&self, update: JobUpdate) {
        debug!(job_id = %update.job_id, status = ?update.status, "status event received");
        let outcome = self.with_board_mut(|board| board.merge(&update));
        self.finish_merge(update.message.as_deref(), outcome).await;
    }

    async fn finish_merge(&self, message: Option<&str>, outcome: MergeOutcome) {
        let Some(terminal) = outcome.entered_terminal else {
            return;
        };
        self.dismiss_toast();
        match terminal {
            JobStatus::Completed => {
                let suffix = message.unwrap_or("").trim();
                let text = if suffix.is_empty() {
                    "Migration completed!".to_string()
                } else {
                    format!("Migration completed! {suffix}")
                };
                self.notifier.success(text);
                // Reconcile whatever fields the stream did not carry.
                let _ = self.list_jobs().await;
            }
            JobStatus::Failed => {
                self.notifier.error(format!(
                    "Migration failed: {}",
                    message.unwrap_or("Unknown error")
                ));
            }
            JobStatus::Cancelled => {
                self.notifier.warning("Migration cancelled");
            }
            other => debug!(status = %other, "non-terminal outcome, nothing to announce"),
        }
    }

    fn schedule_reconcile(self: &Arc<Self>, job_id: &str) {
        let this = Arc::clone(self);
        let job_id = job_id.to_string();
        let delay = self.config.reconcile_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.poll_job_status(&job_id).await;
        });
    }

    // ── lock plumbing ────────────────────────────────────────────────

    fn with_board<T>(&self, f: impl FnOnce(&JobBoard) -> T) -> T {
        match self.board.read() {
            Ok(board) => f(&board),
            Err(e) => {
                error!("RwLock poisoned reading job board");
                f(&e.into_inner())
            }
        }
    }

    fn with_board_mut<T>(&self, f: impl FnOnce(&mut JobBoard) -> T) -> T {
        match self.board.write() {
            Ok(mut board) => f(&mut board),
            Err(e) => {
                error!("RwLock poisoned writing job board");
                f(&mut e.into_inner())
            }
        }
    }

    fn set_toast(&self, id: NotificationId) {
        match self.migrating_toast.lock() {
            Ok(mut slot) => *slot = Some(id),
            Err(e) => error!("Mutex poisoned storing toast id: {e}"),
        }
    }

    fn dismiss_toast(&self) {
        let toast = match self.migrating_toast.lock() {
            Ok(mut slot) => slot.take(),
            Err(e) => {
                error!("Mutex poisoned taking toast id: {e}");
                None
            }
        };
        if let Some(id) = toast {
            self.notifier.dismiss(id);
        }
    }
}
