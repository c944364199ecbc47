//! StreamBroadcaster: WebSocket fan-out of [`StreamMessage`]s.
//!
//! Every upgraded socket is split into a reader loop and a writer task. The
//! writer drains a per-connection unbounded channel, so [`broadcast`] never
//! awaits a slow client and never touches a socket directly.
//!
//! [`broadcast`]: StreamBroadcaster::broadcast

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use logrelay_core::{Error, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::wire::StreamMessage;

pub type ConnectionId = u64;

/// Lifecycle of a tracked connection. Only `Open` connections receive
/// broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ReadyState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ReadyState::Open,
            1 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

struct Connection {
    tx: mpsc::UnboundedSender<Message>,
    state: AtomicU8,
}

impl Connection {
    fn state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

struct Server {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    next_id: AtomicU64,
    server: Mutex<Option<Server>>,
}

impl Shared {
    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn server(&self) -> MutexGuard<'_, Option<Server>> {
        self.server.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap `Clone` handle; clones share the connection set and the server.
#[derive(Clone, Default)]
pub struct StreamBroadcaster {
    shared: Arc<Shared>,
}

impl StreamBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the stream endpoint on `0.0.0.0:port`.
    pub async fn start(&self, port: u16) -> Result<SocketAddr> {
        self.start_with(&format!("0.0.0.0:{port}"), Router::new()).await
    }

    /// Bind `addr` and serve the stream endpoint (`/` and `/stream`) merged
    /// with `extra`. `extra` must not route `/` or `/stream`.
    pub async fn start_with(&self, addr: &str, extra: Router) -> Result<SocketAddr> {
        if self.shared.server().is_some() {
            return Err(Error::TransportStart("stream server already running".into()));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::TransportStart(format!("failed to bind {addr}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| Error::TransportStart(e.to_string()))?;

        let app = self.router().merge(extra);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "stream server terminated");
            }
        });

        let mut server = self.shared.server();
        if server.is_some() {
            // Lost a race with a concurrent start.
            cancel.cancel();
            return Err(Error::TransportStart("stream server already running".into()));
        }
        *server = Some(Server {
            addr: local,
            cancel,
            task,
        });

        info!(addr = %local, "log stream listening");
        Ok(local)
    }

    /// The WebSocket routes alone, for embedding in another server.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(upgrade))
            .route("/stream", get(upgrade))
            .with_state(self.clone())
    }

    /// Queue `message` for every open connection and return how many
    /// connections it was queued for.
    pub fn broadcast(&self, message: &StreamMessage) -> usize {
        let text = match message.encode() {
            Ok(text) => Utf8Bytes::from(text),
            Err(e) => {
                error!(error = %e, "dropping unencodable stream message");
                return 0;
            }
        };

        let connections = self.shared.connections();
        let mut sent = 0;
        for (id, conn) in connections.iter() {
            if conn.state() != ReadyState::Open {
                continue;
            }
            match conn.tx.send(Message::Text(text.clone())) {
                Ok(()) => sent += 1,
                Err(_) => trace!(connection_id = id, "writer gone, frame skipped"),
            }
        }
        trace!(sent, total = connections.len(), "broadcast stream message");
        sent
    }

    /// Track an outbound channel as a connection in the `Open` state.
    pub fn register(&self, tx: mpsc::UnboundedSender<Message>) -> ConnectionId {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.connections().insert(
            id,
            Connection {
                tx,
                state: AtomicU8::new(ReadyState::Open as u8),
            },
        );
        debug!(connection_id = id, "stream client connected");
        id
    }

    /// Returns `false` when `id` is not tracked.
    pub fn set_state(&self, id: ConnectionId, state: ReadyState) -> bool {
        match self.shared.connections().get(&id) {
            Some(conn) => {
                conn.set_state(state);
                true
            }
            None => false,
        }
    }

    pub fn state(&self, id: ConnectionId) -> Option<ReadyState> {
        self.shared.connections().get(&id).map(Connection::state)
    }

    pub fn unregister(&self, id: ConnectionId) {
        if let Some(conn) = self.shared.connections().remove(&id) {
            conn.set_state(ReadyState::Closed);
            debug!(connection_id = id, "stream client disconnected");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections().len()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.server().as_ref().map(|s| s.addr)
    }

    pub fn is_running(&self) -> bool {
        self.shared.server().is_some()
    }

    /// Close every connection, stop accepting and wait for the server task.
    /// Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let drained: Vec<(ConnectionId, Connection)> =
            self.shared.connections().drain().collect();

        for (id, conn) in drained {
            conn.set_state(ReadyState::Closing);
            if conn.tx.send(close_frame()).is_err() {
                trace!(connection_id = id, "close frame not delivered");
            }
        }

        let server = self.shared.server().take();
        if let Some(server) = server {
            server.cancel.cancel();
            if let Err(e) = server.task.await {
                warn!(error = %e, "stream server task did not exit cleanly");
            }
            info!(addr = %server.addr, "log stream stopped");
        }
    }

    async fn serve_socket(self, socket: WebSocket) {
        let (mut outbound, mut inbound) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let id = self.register(tx);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = outbound.send(message).await {
                    trace!(connection_id = id, error = %e, "stream write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        while let Some(frame) = inbound.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(_) => trace!(connection_id = id, "ignoring inbound frame"),
                Err(e) => {
                    debug!(connection_id = id, error = %e, "stream read failed");
                    break;
                }
            }
        }

        self.unregister(id);
        if let Err(e) = writer.await {
            trace!(connection_id = id, error = %e, "stream writer aborted");
        }
    }
}

impl std::fmt::Debug for StreamBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBroadcaster")
            .field("connections", &self.connection_count())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(broadcaster): State<StreamBroadcaster>) -> Response {
    ws.on_upgrade(move |socket| broadcaster.serve_socket(socket))
}

fn close_frame() -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: Utf8Bytes::from_static("server shutting down"),
    }))
}
