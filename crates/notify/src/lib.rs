// crates/notify/src/lib.rs
//! Process-wide transient notification queue.
//!
//! Components report outcomes here (success / error / info / warning /
//! loading) and front ends subscribe to render them as ephemeral
//! alerts. Posting never fails: with no subscribers the event is
//! simply dropped.

use tokio::sync::broadcast;
use uuid::Uuid;

/// Handle for dismissing a previously posted notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(Uuid);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
    Info,
    Warning,
    /// Sticky; stays up until explicitly dismissed.
    Loading,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Error => "error",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Loading => "loading",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Posted(Notification),
    Dismissed(NotificationId),
    Cleared,
}

/// Cloneable handle to the notification queue.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<NotificationEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.post(Level::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.post(Level::Error, message)
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.post(Level::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.post(Level::Warning, message)
    }

    pub fn loading(&self, message: impl Into<String>) -> NotificationId {
        self.post(Level::Loading, message)
    }

    pub fn dismiss(&self, id: NotificationId) {
        let _ = self.tx.send(NotificationEvent::Dismissed(id));
    }

    pub fn dismiss_all(&self) {
        let _ = self.tx.send(NotificationEvent::Cleared);
    }

    fn post(&self, level: Level, message: impl Into<String>) -> NotificationId {
        let notification = Notification {
            id: NotificationId(Uuid::new_v4()),
            level,
            message: message.into(),
        };
        let id = notification.id;
        tracing::debug!(level = level.as_str(), %id, "notification posted");
        // Ignore send errors (no subscribers is fine).
        let _ = self.tx.send(NotificationEvent::Posted(notification));
        id
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
