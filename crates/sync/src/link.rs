// crates/sync/src/link.rs
//! The realtime status link: a single WebSocket per signed-in session,
//! subscribed to the user's private progress queue and the global
//! progress feed.
//!
//! Failure is never surfaced to callers as an error. Authentication
//! and transport problems only flip the connectivity signal; inbound
//! frames that fail to parse are logged and dropped. The owning
//! lifecycle guarantees at most one `establish` per identity change.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mailshift_types::{Identity, JobUpdate};

/// Private per-user progress queue.
pub const USER_PROGRESS_QUEUE: &str = "/user/queue/progress";
/// Broadcast feed carrying the same event schema; duplicates across
/// the two topics are tolerated by the idempotent merge downstream.
pub const GLOBAL_PROGRESS_TOPIC: &str = "/topic/migration-progress";

/// Configuration for the realtime link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Realtime endpoint (e.g. wss://host/ws).
    pub url: String,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Outgoing liveness probe interval.
    pub heartbeat_interval: Duration,
}

impl LinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(4),
        }
    }
}

/// Connectivity signal, observable through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

type UpdateHandler = Box<dyn Fn(JobUpdate) + Send + Sync>;
type HandlerSlot = Arc<RwLock<Option<UpdateHandler>>>;
type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

struct ActiveConnection {
    user_id: String,
    cancel: CancellationToken,
}

/// One logical push connection. Sole owner of the transport; the rest
/// of the system sees only the connectivity signal and the command
/// surface (`send`, `force_reconnect`).
pub struct RealtimeLink {
    config: LinkConfig,
    state_tx: watch::Sender<LinkState>,
    state_rx: watch::Receiver<LinkState>,
    handler: HandlerSlot,
    outbound: OutboundSlot,
    active: Mutex<Option<ActiveConnection>>,
}

impl RealtimeLink {
    pub fn new(config: LinkConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        Self {
            config,
            state_tx,
            state_rx,
            handler: Arc::new(RwLock::new(None)),
            outbound: Arc::new(Mutex::new(None)),
            active: Mutex::new(None),
        }
    }

    /// Subscribe to the connectivity signal.
    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.state_rx.borrow() == LinkState::Connected
    }

    /// Register the event handler. Only the most recently registered
    /// handler receives events; replacing it never double-delivers.
    pub fn set_handler(&self, handler: impl Fn(JobUpdate) + Send + Sync + 'static) {
        match self.handler.write() {
            Ok(mut slot) => *slot = Some(Box::new(handler)),
            Err(e) => error!("RwLock poisoned registering handler: {e}"),
        }
    }

    pub fn clear_handler(&self) {
        match self.handler.write() {
            Ok(mut slot) => *slot = None,
            Err(e) => error!("RwLock poisoned clearing handler: {e}"),
        }
    }

    /// Open the link for an identity. Idempotent: if a connection is
    /// already active for the same identity this is a no-op. The
    /// spawned task keeps reconnecting (fixed delay) until torn down.
    pub fn establish(&self, identity: &Identity, token: Option<&str>) {
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!("Mutex poisoned establishing link: {e}");
                return;
            }
        };
        if let Some(conn) = active.as_ref() {
            if conn.user_id == identity.user_id && !conn.cancel.is_cancelled() {
                debug!(user_id = %identity.user_id, "link already active, skipping establish");
                return;
            }
            conn.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        *active = Some(ActiveConnection {
            user_id: identity.user_id.clone(),
            cancel: cancel.clone(),
        });
        drop(active);

        info!(user_id = %identity.user_id, url = %self.config.url, "realtime link starting");
        tokio::spawn(run_link(
            self.config.clone(),
            identity.user_id.clone(),
            token.map(str::to_owned),
            self.state_tx.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&self.outbound),
            cancel,
        ));
    }

    /// Unsubscribe, close the transport, go disconnected. Safe to call
    /// when already disconnected.
    pub fn teardown(&self) {
        let conn = match self.active.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => {
                error!("Mutex poisoned tearing down link: {e}");
                None
            }
        };
        if let Some(conn) = conn {
            info!(user_id = %conn.user_id, "tearing down realtime link");
            conn.cancel.cancel();
        }
        let _ = self.state_tx.send(LinkState::Disconnected);
    }

    /// Tear down and leave the slot free so the next `establish`
    /// starts fresh. Does not itself re-establish; that policy belongs
    /// to the owning lifecycle.
    pub fn force_reconnect(&self) {
        debug!("manual reconnect requested");
        self.teardown();
    }

    /// Fire-and-forget publish. Returns whether the frame was handed
    /// to a live connection; callers must not assume delivery.
    pub fn send(&self, destination: &str, payload: serde_json::Value) -> bool {
        if !self.is_connected() {
            debug!(%destination, "not connected, dropping outbound message");
            return false;
        }
        let guard = match self.outbound.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!("Mutex poisoned sending message: {e}");
                return false;
            }
        };
        match guard.as_ref() {
            Some(tx) => {
                let frame = serde_json::json!({
                    "type": "send",
                    "destination": destination,
                    "body": payload,
                });
                tx.send(frame.to_string()).is_ok()
            }
            None => false,
        }
    }
}

/// Connection supervisor: connect, stream until failure or teardown,
/// then retry after the fixed delay.
async fn run_link(
    config: LinkConfig,
    user_id: String,
    token: Option<String>,
    state_tx: watch::Sender<LinkState>,
    handler: HandlerSlot,
    outbound: OutboundSlot,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let _ = state_tx.send(LinkState::Connecting);

        match connect_and_stream(&config, token.as_deref(), &state_tx, &handler, &outbound, &cancel)
            .await
        {
            Ok(()) => info!(%user_id, "realtime connection closed"),
            Err(e) => warn!(%user_id, "realtime connection failed: {e}"),
        }

        clear_outbound(&outbound);
        let _ = state_tx.send(LinkState::Disconnected);

        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
    clear_outbound(&outbound);
    let _ = state_tx.send(LinkState::Disconnected);
}

async fn connect_and_stream(
    config: &LinkConfig,
    token: Option<&str>,
    state_tx: &watch::Sender<LinkState>,
    handler: &HandlerSlot,
    outbound: &OutboundSlot,
    cancel: &CancellationToken,
) -> Result<(), String> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| format!("bad realtime URL: {e}"))?;
    if let Some(token) = token {
        let value = format!("Bearer {token}")
            .parse()
            .map_err(|e| format!("credential not header-safe: {e}"))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (ws_stream, _) = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        connected = connect_async(request) => {
            connected.map_err(|e| format!("WS connect failed: {e}"))?
        }
    };
    let (mut sink, mut stream) = ws_stream.split();

    // Subscribe to both topics before reporting connected.
    for destination in [USER_PROGRESS_QUEUE, GLOBAL_PROGRESS_TOPIC] {
        let frame = serde_json::json!({"type": "subscribe", "destination": destination});
        sink.send(Message::Text(frame.to_string().into()))
            .await
            .map_err(|e| format!("subscribe failed: {e}"))?;
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    set_outbound(outbound, out_tx);
    let _ = state_tx.send(LinkState::Connected);
    info!("realtime link established");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                for destination in [USER_PROGRESS_QUEUE, GLOBAL_PROGRESS_TOPIC] {
                    let frame = serde_json::json!({"type": "unsubscribe", "destination": destination});
                    let _ = sink.send(Message::Text(frame.to_string().into())).await;
                }
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            Some(text) = out_rx.recv() => {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    return Err("outbound send failed".into());
                }
            }
            _ = tokio::time::sleep(config.heartbeat_interval) => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return Err("heartbeat failed".into());
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<JobUpdate>(&text) {
                            Ok(update) => dispatch(handler, update),
                            Err(e) => warn!(error = %e, "dropping unparseable status event"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(format!("transport error: {e}")),
                }
            }
        }
    }
}

fn dispatch(handler: &HandlerSlot, update: JobUpdate) {
    match handler.read() {
        Ok(slot) => match slot.as_ref() {
            Some(callback) => callback(update),
            None => debug!(job_id = %update.job_id, "no handler registered, dropping event"),
        },
        Err(e) => error!("RwLock poisoned dispatching event: {e}"),
    }
}

fn set_outbound(outbound: &OutboundSlot, tx: mpsc::UnboundedSender<String>) {
    match outbound.lock() {
        Ok(mut slot) => *slot = Some(tx),
        Err(e) => error!("Mutex poisoned setting outbound channel: {e}"),
    }
}

fn clear_outbound(outbound: &OutboundSlot) {
    match outbound.lock() {
        Ok(mut slot) => *slot = None,
        Err(e) => error!("Mutex poisoned clearing outbound channel: {e}"),
    }
}
