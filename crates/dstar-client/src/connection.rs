//! WebSocket connection lifecycle.
//!
//! [`ConnectionManager`] owns the socket. Each successful [`ConnectionManager::open`]
//! spawns one socket task that forwards inbound text frames to the event
//! channel and writes queued outbound commands. [`ConnectionHandle`] is the
//! cheap, cloneable send side used by the session controller.

use std::sync::Arc;
use std::time::Duration;

use dstar_core::{ConnectionStatus, OutboundCommand, TransportError};
use dstar_settings::ClientSettings;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something the connection reports to its consumer, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The socket finished its handshake.
    Opened,
    /// A raw inbound text frame.
    Frame(String),
    /// The socket is gone. `reason` is set for faults and peer close frames.
    Closed {
        /// What ended the connection, if known.
        reason: Option<String>,
    },
}

/// Where outbound commands go.
///
/// Implemented by [`ConnectionHandle`] and by recording fakes in tests.
pub trait CommandSink {
    /// Current connection status.
    fn connection_status(&self) -> ConnectionStatus;

    /// Queue a command for the peer. A no-op unless connected.
    fn send(&self, command: &OutboundCommand);
}

/// Turn an HTTP base URL and a path into a WebSocket URL.
///
/// `https` maps to `wss`, `http` to `ws`; `ws`/`wss` are kept as given.
pub fn derive_ws_url(base_url: &str, path: &str) -> Result<String, TransportError> {
    let base = base_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("wss://") || base.starts_with("ws://") {
        base.to_owned()
    } else {
        return Err(TransportError::InvalidEndpoint {
            url: base_url.to_owned(),
            reason: "expected an http, https, ws or wss URL".into(),
        });
    };
    if rest.ends_with("://") {
        return Err(TransportError::InvalidEndpoint {
            url: base_url.to_owned(),
            reason: "missing host".into(),
        });
    }
    if path.starts_with('/') {
        Ok(format!("{rest}{path}"))
    } else {
        Ok(format!("{rest}/{path}"))
    }
}

/// Parameters for one [`ConnectionManager`].
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Full WebSocket URL.
    pub url: String,
    /// Upper bound on the opening handshake.
    pub connect_timeout: Duration,
    /// Capacity of the event channel.
    pub event_capacity: usize,
    /// Capacity of the outbound queue.
    pub outbound_capacity: usize,
}

impl ConnectionConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, TransportError> {
        Ok(Self {
            url: derive_ws_url(&settings.server.base_url, &settings.server.ws_path)?,
            connect_timeout: Duration::from_millis(settings.connection.connect_timeout_ms),
            event_capacity: settings.connection.event_channel_capacity.max(1),
            outbound_capacity: settings.connection.outbound_channel_capacity.max(1),
        })
    }
}

/// Cloneable send side of a [`ConnectionManager`].
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    status: watch::Receiver<ConnectionStatus>,
    outbound: mpsc::Sender<String>,
}

impl ConnectionHandle {
    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

impl CommandSink for ConnectionHandle {
    fn connection_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn send(&self, command: &OutboundCommand) {
        if !self.connection_status().is_connected() {
            debug!(action = command.action(), "not connected, dropping command");
            return;
        }
        let text = match serde_json::to_string(command) {
            Ok(text) => text,
            Err(e) => {
                warn!(action = command.action(), error = %e, "failed to encode command");
                return;
            }
        };
        if let Err(e) = self.outbound.try_send(text) {
            warn!(action = command.action(), error = %e, "outbound queue rejected command");
        }
    }
}

/// Owner of the physical WebSocket.
///
/// At most one socket task runs at a time. Dropping the manager tears the
/// socket down.
pub struct ConnectionManager {
    config: ConnectionConfig,
    status: Arc<watch::Sender<ConnectionStatus>>,
    events: mpsc::Sender<ConnectionEvent>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    socket: Option<SocketTask>,
}

struct SocketTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ConnectionManager {
    /// Create a disconnected manager and the receiver for its events.
    pub fn new(config: ConnectionConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let manager = Self {
            config,
            status: Arc::new(status),
            events,
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            socket: None,
        };
        (manager, events_rx)
    }

    /// WebSocket URL this manager connects to.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A send handle bound to this manager.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            status: self.status.subscribe(),
            outbound: self.outbound_tx.clone(),
        }
    }

    /// Open the socket.
    ///
    /// Status is `connecting` while the handshake runs, then `connected` on
    /// success or back to `disconnected` on failure.
    #[instrument(skip_all, fields(url = %self.config.url))]
    pub async fn open(&mut self) -> Result<(), TransportError> {
        let current = self.status();
        if current != ConnectionStatus::Disconnected {
            return Err(TransportError::AlreadyOpen(current));
        }
        // A previous socket may have ended on its own.
        self.reap().await;

        let _ = self.status.send_replace(ConnectionStatus::Connecting);
        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout;

        let ws = match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                let _ = self.status.send_replace(ConnectionStatus::Disconnected);
                warn!(error = %e, "connect failed");
                return Err(TransportError::ConnectFailed {
                    url,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                let _ = self.status.send_replace(ConnectionStatus::Disconnected);
                warn!(timeout_ms = timeout.as_millis(), "connect timed out");
                return Err(TransportError::Timeout {
                    url,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        // Published before the socket task exists, so its final
        // `Disconnected` and `Closed` always come after these.
        let _ = self.status.send_replace(ConnectionStatus::Connected);
        info!("connected");
        if self.events.send(ConnectionEvent::Opened).await.is_err() {
            debug!("event receiver gone");
        }

        let cancel = CancellationToken::new();
        let join = tokio::spawn(socket_loop(
            ws,
            Arc::clone(&self.outbound_rx),
            self.events.clone(),
            Arc::clone(&self.status),
            cancel.clone(),
        ));
        self.socket = Some(SocketTask { cancel, join });
        Ok(())
    }

    /// Close the socket and wait for its task to finish. Idempotent.
    pub async fn close(&mut self) {
        if let Some(task) = self.socket.take() {
            task.cancel.cancel();
            if let Err(e) = task.join.await {
                warn!(error = %e, "socket task ended abnormally");
            }
        }
        let _ = self.status.send_replace(ConnectionStatus::Disconnected);
    }

    async fn reap(&mut self) {
        if let Some(task) = self.socket.take() {
            task.cancel.cancel();
            let _ = task.join.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.socket.take() {
            task.cancel.cancel();
        }
    }
}

async fn socket_loop(
    ws: WsStream,
    outbound: Arc<Mutex<mpsc::Receiver<String>>>,
    events: mpsc::Sender<ConnectionEvent>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut outbound = outbound.lock().await;

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break None;
            }
            cmd = outbound.recv() => {
                let Some(text) = cmd else { break None };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break Some(format!("send failed: {e}"));
                }
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                };
                if events.send(ConnectionEvent::Frame(text)).await.is_err() {
                    debug!("event receiver gone, closing socket");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break None;
                }
            }
        }
    };

    // Commands queued for this socket must not leak into the next one.
    while outbound.try_recv().is_ok() {}
    drop(outbound);

    let _ = status.send_replace(ConnectionStatus::Disconnected);
    info!(reason = reason.as_deref().unwrap_or(""), "disconnected");
    let _ = events.send(ConnectionEvent::Closed { reason }).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
