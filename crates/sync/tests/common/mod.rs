#![allow(dead_code)]
//! Shared test support: an in-process WebSocket endpoint that records
//! connections, auth headers, subscriptions and published frames, and
//! can push status events or drop every live connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

struct ClientHandle {
    tx: mpsc::UnboundedSender<String>,
    kill: CancellationToken,
}

pub struct WsHarness {
    pub url: String,
    connections: Arc<AtomicUsize>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    sent: Arc<Mutex<Vec<serde_json::Value>>>,
    clients: Arc<Mutex<Vec<ClientHandle>>>,
}

impl WsHarness {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}", listener.local_addr().expect("local addr"));

        let harness = Self {
            url,
            connections: Arc::new(AtomicUsize::new(0)),
            auth_headers: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            clients: Arc::new(Mutex::new(Vec::new())),
        };

        let connections = Arc::clone(&harness.connections);
        let auth_headers = Arc::clone(&harness.auth_headers);
        let subscriptions = Arc::clone(&harness.subscriptions);
        let sent = Arc::clone(&harness.sent);
        let clients = Arc::clone(&harness.clients);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                connections.fetch_add(1, Ordering::SeqCst);

                let auth_headers = Arc::clone(&auth_headers);
                let subscriptions = Arc::clone(&subscriptions);
                let sent = Arc::clone(&sent);
                let clients = Arc::clone(&clients);

                tokio::spawn(async move {
                    let header_sink = Arc::clone(&auth_headers);
                    let callback = move |request: &Request, response: Response| {
                        let auth = request
                            .headers()
                            .get("authorization")
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_owned);
                        header_sink.lock().unwrap().push(auth);
                        Ok(response)
                    };
                    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                    else {
                        return;
                    };
                    let (mut sink, mut stream) = ws.split();

                    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                    let kill = CancellationToken::new();
                    clients.lock().unwrap().push(ClientHandle {
                        tx,
                        kill: kill.clone(),
                    });

                    loop {
                        tokio::select! {
                            _ = kill.cancelled() => {
                                let _ = sink.send(Message::Close(None)).await;
                                break;
                            }
                            Some(text) = rx.recv() => {
                                if sink.send(Message::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            frame = stream.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(value) =
                                        serde_json::from_str::<serde_json::Value>(&text)
                                    {
                                        match value.get("type").and_then(|t| t.as_str()) {
                                            Some("subscribe") => {
                                                if let Some(destination) = value
                                                    .get("destination")
                                                    .and_then(|d| d.as_str())
                                                {
                                                    subscriptions
                                                        .lock()
                                                        .unwrap()
                                                        .push(destination.to_string());
                                                }
                                            }
                                            Some("send") => {
                                                sent.lock().unwrap().push(value);
                                            }
                                            _ => {}
                                        }
                                    }
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    let _ = sink.send(Message::Pong(data)).await;
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(_)) => break,
                            }
                        }
                    }
                });
            }
        });

        harness
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.auth_headers.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn sent_frames(&self) -> Vec<serde_json::Value> {
        self.sent.lock().unwrap().clone()
    }

    /// Push a raw text frame to every live connection.
    pub fn push(&self, body: &str) {
        let clients = self.clients.lock().unwrap();
        for client in clients.iter() {
            let _ = client.tx.send(body.to_string());
        }
    }

    /// Close every live connection, as a flaky network would.
    pub fn drop_connections(&self) {
        let mut clients = self.clients.lock().unwrap();
        for client in clients.drain(..) {
            client.kill.cancel();
        }
    }
}

/// Poll a condition until it holds or ~2 s elapse.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

/// Await a specific link state with a timeout.
pub async fn wait_state(
    rx: &mut tokio::sync::watch::Receiver<mailshift_sync::LinkState>,
    state: mailshift_sync::LinkState,
) {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for link state")
        .expect("link state channel closed");
}
