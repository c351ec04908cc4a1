// crates/cli/src/app.rs
//! Wiring: one notifier, one session store, one backend, one realtime
//! link, one coordinator, built from the endpoint configuration.

use std::sync::Arc;

use anyhow::Context;

use mailshift_api::{Backend, Endpoints};
use mailshift_notify::{NotificationEvent, Notifier};
use mailshift_session::SessionStore;
use mailshift_sync::{Coordinator, LinkConfig, RealtimeLink};
use mailshift_types::{Identity, Job};

pub struct App {
    pub notifier: Notifier,
    pub store: Arc<SessionStore>,
    pub backend: Backend,
    pub coordinator: Arc<Coordinator>,
}

impl App {
    pub fn new() -> anyhow::Result<Self> {
        let endpoints = Endpoints::default();
        let notifier = Notifier::new();
        let backend = Backend::new(endpoints.clone()).context("building backend clients")?;
        let store = Arc::new(
            SessionStore::new(backend.auth.clone(), notifier.clone())
                .context("opening session store")?,
        );
        let link = Arc::new(RealtimeLink::new(LinkConfig::new(
            endpoints.realtime_url.clone(),
        )));
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&store),
            backend.clone(),
            notifier.clone(),
            link,
        ));
        Ok(Self {
            notifier,
            store,
            backend,
            coordinator,
        })
    }

    /// Re-hydrate the persisted session, if any.
    pub async fn restore(&self) -> Option<Identity> {
        self.store.restore().await
    }

    pub async fn require_session(&self) -> anyhow::Result<Identity> {
        match self.restore().await {
            Some(identity) => Ok(identity),
            None => anyhow::bail!("not signed in: run `mailshift login` first"),
        }
    }

    /// Mirror notifications to stderr while a live view is attached.
    pub fn spawn_notification_printer(&self) {
        let mut rx = self.notifier.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(NotificationEvent::Posted(n)) => {
                        eprintln!("[{}] {}", n.level.as_str(), n.message);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

pub fn format_job_line(job: &Job) -> String {
    let category = job
        .migration_type
        .map(|c| c.to_string())
        .unwrap_or_else(|| "?".to_string());
    let items = if job.total_items > 0 {
        format!(" ({}/{} items)", job.processed_items, job.total_items)
    } else {
        String::new()
    };
    let when = job
        .updated_at
        .map(|t| format!("  updated {}", t.format("%Y-%m-%d %H:%M:%S")))
        .unwrap_or_default();
    format!(
        "{:<14} {:<9} {:<12} {:>3}%{}{}",
        job.job_id, category, job.status, job.progress, items, when
    )
}
