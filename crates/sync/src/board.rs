// crates/sync/src/board.rs
//! The job set and the current-job pointer.
//!
//! Every mutation funnels through `merge` (realtime events and poll
//! results alike) or through the explicit command results
//! (`replace_all`, `set_current`, `clear_current`), which keeps the
//! merge idempotent under duplicate and reordered delivery.

use mailshift_types::{Job, JobUpdate, MergeOutcome};
use tracing::debug;

#[derive(Debug, Default)]
pub struct JobBoard {
    jobs: Vec<Job>,
    current: Option<Job>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn current(&self) -> Option<&Job> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|job| job.job_id.as_str())
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.iter().any(|job| job.job_id == job_id)
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.job_id == job_id)
    }

    /// Wholesale replacement with the authoritative fetched set.
    pub fn replace_all(&mut self, jobs: Vec<Job>) {
        self.jobs = jobs;
    }

    /// Install the current job directly (start-migration placeholder).
    pub fn set_current(&mut self, job: Job) {
        self.current = Some(job);
    }

    /// Drop the current-job pointer (explicit cancel or "new
    /// migration" reset). The job set is untouched.
    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Merge an incoming partial record into the matching job-list
    /// entry and, when the id matches (or nothing is current yet, in
    /// which case the job is adopted), into the current job.
    pub fn merge(&mut self, update: &JobUpdate) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        if let Some(job) = self
            .jobs
            .iter_mut()
            .find(|job| job.job_id == update.job_id)
        {
            outcome = outcome.or(job.apply(update));
        }

        match self
            .current
            .as_ref()
            .map(|current| current.job_id == update.job_id)
        {
            Some(true) => {
                if let Some(current) = self.current.as_mut() {
                    outcome = outcome.or(current.apply(update));
                }
            }
            None => {
                // No current job yet: adopt the event's job. Prefer the
                // (already merged) list entry so both copies agree.
                let known = self.contains(&update.job_id);
                let adopted = match self.get(&update.job_id) {
                    Some(existing) => existing.clone(),
                    None => update.clone().into_job(),
                };
                debug!(job_id = %adopted.job_id, "adopting current job from event");
                // Adoption of an already-terminal job only announces the
                // terminal state when the job was previously unknown.
                if !known && adopted.status.is_terminal() && outcome.entered_terminal.is_none() {
                    outcome.entered_terminal = Some(adopted.status);
                }
                outcome.changed = true;
                self.current = Some(adopted);
            }
            Some(false) => {}
        }

        outcome
    }
}
