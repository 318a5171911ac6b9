//! Transport collaborator.
//!
//! Peers surface to the session as [`NetEvent`]s on a channel; the session
//! talks back through the [`Transport`] trait. Two implementations:
//! [`WebTransportServer`] for remote peers and [`LocalTransport`] for
//! in-process peers (offline host, tests).

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wtransport::VarInt;

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::net::connection::ConnectionId;
use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::net::framing::{read_frame, write_frame, FramingError};
use crate::net::protocol::{decode, encode, ClientMessage, ServerMessage};
use crate::net::tls::TlsConfig;

/// Connection lifecycle and inbound traffic, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Connected {
        connection: ConnectionId,
        remote_addr: Option<SocketAddr>,
    },
    Message {
        connection: ConnectionId,
        message: ClientMessage,
    },
    Disconnected {
        connection: ConnectionId,
    },
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),
    #[error("Connection closed: {0}")]
    Closed(ConnectionId),
    #[error("Encode failed: {0}")]
    Encode(#[from] crate::net::protocol::EncodeError),
}

/// Outbound side of the transport. Sends are fire-and-forget.
pub trait Transport: Send + Sync {
    /// Queue a message for one connection
    fn send(&self, connection: ConnectionId, message: &ServerMessage) -> Result<(), TransportError>;

    /// Close a connection after flushing queued messages
    fn disconnect(&self, connection: ConnectionId);

    /// Send to every listed connection, returning how many accepted the message
    fn broadcast(&self, connections: &[ConnectionId], message: &ServerMessage) -> usize {
        let mut delivered = 0;
        for connection in connections {
            match self.send(*connection, message) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Broadcast to {} skipped: {}", connection, e),
            }
        }
        delivered
    }
}

/// In-process transport that queues messages per connection
#[derive(Debug, Default)]
pub struct LocalTransport {
    outboxes: Mutex<HashMap<ConnectionId, Vec<ServerMessage>>>,
    closed: Mutex<HashSet<ConnectionId>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every message queued for a connection
    pub fn drain(&self, connection: ConnectionId) -> Vec<ServerMessage> {
        self.outboxes.lock().remove(&connection).unwrap_or_default()
    }

    /// Copy of the messages queued for a connection
    pub fn sent_to(&self, connection: ConnectionId) -> Vec<ServerMessage> {
        self.outboxes
            .lock()
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_closed(&self, connection: ConnectionId) -> bool {
        self.closed.lock().contains(&connection)
    }
}

impl Transport for LocalTransport {
    fn send(&self, connection: ConnectionId, message: &ServerMessage) -> Result<(), TransportError> {
        if self.is_closed(connection) {
            return Err(TransportError::Closed(connection));
        }
        self.outboxes
            .lock()
            .entry(connection)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    fn disconnect(&self, connection: ConnectionId) {
        self.closed.lock().insert(connection);
    }
}

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Writer channels of live WebTransport peers
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>>,
}

impl PeerTable {
    /// Register a peer under a fresh random id
    fn register(&self, sender: mpsc::UnboundedSender<Outbound>) -> ConnectionId {
        let mut peers = self.peers.write();
        let id = loop {
            let candidate = ConnectionId(rand::random::<u64>());
            if !peers.contains_key(&candidate) {
                break candidate;
            }
        };
        peers.insert(id, sender);
        id
    }

    fn unregister(&self, connection: ConnectionId) {
        self.peers.write().remove(&connection);
    }

    pub fn count(&self) -> usize {
        self.peers.read().len()
    }
}

impl Transport for PeerTable {
    fn send(&self, connection: ConnectionId, message: &ServerMessage) -> Result<(), TransportError> {
        let encoded = encode(message)?;
        let peers = self.peers.read();
        let sender = peers
            .get(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;
        sender
            .send(Outbound::Frame(encoded))
            .map_err(|_| TransportError::Closed(connection))
    }

    fn disconnect(&self, connection: ConnectionId) {
        if let Some(sender) = self.peers.read().get(&connection) {
            let _ = sender.send(Outbound::Close);
        }
    }

    fn broadcast(&self, connections: &[ConnectionId], message: &ServerMessage) -> usize {
        // Encode once for the whole fan-out
        let encoded = match encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Broadcast encode failed: {}", e);
                return 0;
            }
        };
        let peers = self.peers.read();
        connections
            .iter()
            .filter(|connection| {
                peers
                    .get(connection)
                    .is_some_and(|sender| sender.send(Outbound::Frame(encoded.clone())).is_ok())
            })
            .count()
    }
}

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    peers: Arc<PeerTable>,
    events: mpsc::UnboundedSender<NetEvent>,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    /// Create a new WebTransport server feeding `events`
    pub async fn new(
        config: ServerConfig,
        events: mpsc::UnboundedSender<NetEvent>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(
            config.tls_cert_path.as_deref(),
            config.tls_key_path.as_deref(),
        )
        .await?;

        Ok(Self {
            config,
            tls_config,
            peers: Arc::new(PeerTable::default()),
            events,
            metrics,
        })
    }

    /// Outbound handle for the session manager
    pub fn transport(&self) -> Arc<PeerTable> {
        self.peers.clone()
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Accept connections until the endpoint fails
    pub async fn run(self) -> anyhow::Result<()> {
        use wtransport::Endpoint;

        // Dual-stack bind (IPv4 + IPv6)
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_default(self.config.port)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;
        info!("WebTransport server listening on port {}", self.config.port);

        loop {
            let incoming = server.accept().await;
            let peers = self.peers.clone();
            let events = self.events.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, peers, events, metrics).await {
                    warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single WebTransport session
async fn handle_connection(
    incoming: wtransport::endpoint::IncomingSession,
    peers: Arc<PeerTable>,
    events: mpsc::UnboundedSender<NetEvent>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    debug!(
        "Session request from {:?}, path: {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let connection_id = peers.register(out_tx);
    metrics.connections_active.fetch_add(1, Ordering::Relaxed);

    let _ = events.send(NetEvent::Connected {
        connection: connection_id,
        remote_addr: Some(connection.remote_address()),
    });

    // One bidirectional stream carries the whole session. A close requested
    // before the peer opens it still applies.
    let mut pending = Vec::new();
    match await_stream(connection.accept_bi(), &mut out_rx, &mut pending, connection_id).await {
        Some((mut send, mut recv)) => {
            for bytes in pending {
                if let Err(e) = write_frame(&mut send, &bytes, MAX_MESSAGE_SIZE).await {
                    debug!("Stream write error on {}: {}", connection_id, e);
                    break;
                }
                metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
            }

            let reader_events = events.clone();
            let reader_metrics = metrics.clone();
            let mut reader = tokio::spawn(async move {
                loop {
                    let frame = match read_frame(&mut recv, MAX_MESSAGE_SIZE).await {
                        Ok(frame) => frame,
                        Err(FramingError::ConnectionClosed) => break,
                        Err(e) => {
                            debug!("Stream read error on {}: {}", connection_id, e);
                            break;
                        }
                    };
                    reader_metrics.messages_received.fetch_add(1, Ordering::Relaxed);

                    match decode::<ClientMessage>(&frame) {
                        Ok(message) => {
                            if reader_events
                                .send(NetEvent::Message {
                                    connection: connection_id,
                                    message,
                                })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode message from {}: {}", connection_id, e),
                    }
                }
            });

            loop {
                tokio::select! {
                    _ = &mut reader => break,
                    outbound = out_rx.recv() => match outbound {
                        Some(Outbound::Frame(bytes)) => {
                            if let Err(e) = write_frame(&mut send, &bytes, MAX_MESSAGE_SIZE).await {
                                debug!("Stream write error on {}: {}", connection_id, e);
                                break;
                            }
                            metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Some(Outbound::Close) | None => break,
                    },
                }
            }
            reader.abort();
        }
        None => connection.close(VarInt::from_u32(0), b"closed by host"),
    }

    peers.unregister(connection_id);
    metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
    let _ = events.send(NetEvent::Disconnected {
        connection: connection_id,
    });

    debug!("Connection closed ({})", connection_id);
    Ok(())
}

/// Wait for the peer's stream while honouring outbound traffic.
///
/// Frames queued meanwhile are kept in `pending`. Returns `None` when the
/// stream fails or the session asked to close first.
async fn await_stream<S, E: std::fmt::Display>(
    accept: impl Future<Output = Result<S, E>>,
    out_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    pending: &mut Vec<Vec<u8>>,
    connection_id: ConnectionId,
) -> Option<S> {
    tokio::pin!(accept);
    loop {
        tokio::select! {
            stream = &mut accept => {
                return match stream {
                    Ok(stream) => Some(stream),
                    Err(e) => {
                        debug!("Stream accept error on {}: {}", connection_id, e);
                        None
                    }
                };
            }
            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Frame(bytes)) => pending.push(bytes),
                Some(Outbound::Close) | None => {
                    debug!("{} closed before opening a stream", connection_id);
                    return None;
                }
            },
        }
    }
}
