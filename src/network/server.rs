//! WebSocket Game Server
//!
//! Thin transport adapter over [`SessionRegistry`]. Each connection carries
//! at most one player; session events are forwarded from the player's
//! subscription as JSON text frames.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::game::state::{PlayerId, SessionError, SessionId};
use crate::network::protocol::{
    ClaimRequest, ClientMessage, ErrorCode, JoinRequest, LeaveRequest, MarkRequest,
    ServerError, ServerMessage, SessionEvent,
};
use crate::network::registry::{RegistryError, SessionRegistry};

/// Idle connections are dropped after this long without a message.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Seat held by this connection.
    seat: Option<(PlayerId, SessionId)>,
    /// Last activity.
    last_activity: Instant,
    /// Forwards session events to the socket.
    forwarder: Option<JoinHandle<()>>,
}

impl ConnectedClient {
    fn release(&mut self) -> Option<(PlayerId, SessionId)> {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        self.seat.take()
    }
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    clients: Clients,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server over an existing registry.
    pub fn new(config: ServerConfig, registry: Arc<SessionRegistry>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Bingo server {} listening on {}", self.config.version, listener.local_addr()?);

        let cleanup_clients = self.clients.clone();
        let cleanup_registry = self.registry.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_registry).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            clients.write().await.insert(addr, ConnectedClient {
                seat: None,
                last_activity: Instant::now(),
                forwarder: None,
            });

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(client) = clients.write().await.get_mut(&addr) {
                                    client.last_activity = Instant::now();
                                }

                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(addr, client_msg, &clients, &registry, &msg_tx).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(error_message(ErrorCode::InvalidInput, "Invalid message format")).await;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            let seat = clients.write().await.remove(&addr).and_then(|mut c| c.release());

            // Let queued replies (including Shutdown) drain before closing.
            drop(msg_tx);
            let _ = tokio::time::timeout(Duration::from_secs(1), sender_task).await;

            if let Some((player_id, session_id)) = seat {
                if let Err(e) = registry.leave(&session_id, &player_id).await {
                    debug!("Disconnect cleanup for {}: {}", player_id.short(), e);
                }
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Clients,
        registry: &Arc<SessionRegistry>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let reply = match msg {
            ClientMessage::Join(req) => Self::handle_join(addr, req, clients, registry, sender).await,
            ClientMessage::Leave(req) => Self::handle_leave(addr, req, clients, registry).await,
            ClientMessage::Claim(req) => Self::handle_claim(addr, req, clients, registry).await,
            ClientMessage::Mark(req) => Self::handle_mark(addr, req, clients, registry).await,
            ClientMessage::SyncRequest { session_id } => {
                Self::handle_sync(addr, session_id, clients, registry, sender).await
            }
            ClientMessage::Ping { timestamp } => Some(ServerMessage::Pong {
                timestamp,
                server_time: std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
            }),
        };

        if let Some(reply) = reply {
            let _ = sender.send(reply).await;
        }
    }

    async fn handle_join(
        addr: SocketAddr,
        req: JoinRequest,
        clients: &Clients,
        registry: &Arc<SessionRegistry>,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Option<ServerMessage> {
        let held = clients.read().await.get(&addr).and_then(|c| c.seat);
        if let Some((_, held_session)) = held {
            let live = matches!(
                registry.snapshot(&held_session).await,
                Ok(update) if !update.state.is_over()
            );
            if live {
                return Some(error_message(ErrorCode::AlreadyInSession, "Connection already holds a seat"));
            }
            // Game over or recycled: the seat is stale.
            if let Some(client) = clients.write().await.get_mut(&addr) {
                client.release();
            }
            debug!("Client {} dropped stale seat in {}", addr, held_session.short());
        }

        let seat = match registry.join(req.player_id, req.display_name).await {
            Ok(seat) => seat,
            Err(e) => return Some(registry_error(&e)),
        };
        let session_id = seat.result.session_id;

        // Joined must reach the socket before any forwarded update.
        let _ = sender.send(ServerMessage::Joined(seat.result)).await;
        let forwarder = spawn_forwarder(registry.clone(), session_id, seat.events, sender.clone());

        if let Some(client) = clients.write().await.get_mut(&addr) {
            client.seat = Some((req.player_id, session_id));
            client.forwarder = Some(forwarder);
        }
        debug!("Client {} seated as {} in {}", addr, req.player_id.short(), session_id.short());
        None
    }

    async fn handle_leave(
        addr: SocketAddr,
        req: LeaveRequest,
        clients: &Clients,
        registry: &Arc<SessionRegistry>,
    ) -> Option<ServerMessage> {
        if let Err(reply) = check_seat(addr, req.player_id, req.session_id, clients).await {
            return Some(reply);
        }
        if let Some(client) = clients.write().await.get_mut(&addr) {
            client.release();
        }

        match registry.leave(&req.session_id, &req.player_id).await {
            Ok(_) => Some(ServerMessage::Left { session_id: req.session_id }),
            Err(e) => Some(registry_error(&e)),
        }
    }

    async fn handle_claim(
        addr: SocketAddr,
        req: ClaimRequest,
        clients: &Clients,
        registry: &Arc<SessionRegistry>,
    ) -> Option<ServerMessage> {
        if let Err(reply) = check_seat(addr, req.player_id, req.session_id, clients).await {
            return Some(reply);
        }

        match registry.claim(&req.session_id, &req.player_id, &req.marked_values).await {
            Ok(result) => Some(ServerMessage::ClaimResult(result)),
            Err(e) => Some(registry_error(&e)),
        }
    }

    async fn handle_mark(
        addr: SocketAddr,
        req: MarkRequest,
        clients: &Clients,
        registry: &Arc<SessionRegistry>,
    ) -> Option<ServerMessage> {
        if let Err(reply) = check_seat(addr, req.player_id, req.session_id, clients).await {
            return Some(reply);
        }

        match registry.mark(&req.session_id, &req.player_id, req.value).await {
            Ok(()) => Some(ServerMessage::Marked { session_id: req.session_id, value: req.value }),
            Err(e) => Some(registry_error(&e)),
        }
    }

    /// Fresh snapshot; the event stream restarts right after it.
    async fn handle_sync(
        addr: SocketAddr,
        session_id: SessionId,
        clients: &Clients,
        registry: &Arc<SessionRegistry>,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Option<ServerMessage> {
        let subscription = match registry.subscribe(&session_id).await {
            Ok(s) => s,
            Err(e) => return Some(registry_error(&e)),
        };

        let mut clients = clients.write().await;
        let Some(client) = clients.get_mut(&addr) else { return None };

        let _ = sender.send(ServerMessage::Snapshot(subscription.snapshot)).await;
        if let Some(task) = client.forwarder.take() {
            task.abort();
        }
        client.forwarder = Some(spawn_forwarder(
            registry.clone(),
            session_id,
            subscription.events,
            sender.clone(),
        ));
        None
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(clients: Clients, registry: Arc<SessionRegistry>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let idle: Vec<_> = {
                let mut clients = clients.write().await;
                let addrs: Vec<_> = clients
                    .iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > IDLE_TIMEOUT)
                    .map(|(addr, _)| *addr)
                    .collect();
                addrs
                    .into_iter()
                    .filter_map(|addr| clients.remove(&addr).map(|c| (addr, c)))
                    .collect()
            };

            for (addr, mut client) in idle {
                if let Some((player_id, session_id)) = client.release() {
                    let _ = registry.leave(&session_id, &player_id).await;
                }
                info!("Removed idle client {}", addr);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get live session count.
    pub async fn session_count(&self) -> usize {
        self.registry.session_count().await
    }
}

/// Forward one session's events to a socket until either side goes away.
fn spawn_forwarder(
    registry: Arc<SessionRegistry>,
    session_id: SessionId,
    mut events: broadcast::Receiver<SessionEvent>,
    sender: mpsc::Sender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if sender.send(ServerMessage::Update(event)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Listener on {} lagged by {} events, resyncing", session_id.short(), missed);
                    let Ok(subscription) = registry.subscribe(&session_id).await else { break };
                    if sender.send(ServerMessage::Snapshot(subscription.snapshot)).await.is_err() {
                        break;
                    }
                    events = subscription.events;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// The connection must hold exactly this seat.
async fn check_seat(
    addr: SocketAddr,
    player_id: PlayerId,
    session_id: SessionId,
    clients: &Clients,
) -> Result<(), ServerMessage> {
    let clients = clients.read().await;
    match clients.get(&addr).and_then(|c| c.seat) {
        Some(seat) if seat == (player_id, session_id) => Ok(()),
        _ => Err(error_message(ErrorCode::NotInSession, "Connection does not hold that seat")),
    }
}

fn error_message(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error(ServerError {
        code,
        message: message.to_string(),
    })
}

/// Map a registry failure onto a wire error.
pub fn error_code(err: &RegistryError) -> ErrorCode {
    match err {
        RegistryError::SessionNotFound => ErrorCode::SessionNotFound,
        RegistryError::PlayerNotInSession => ErrorCode::NotInSession,
        RegistryError::Session(e) => match e {
            SessionError::AlreadyInSession => ErrorCode::AlreadyInSession,
            SessionError::PlayerNotFound => ErrorCode::NotInSession,
            SessionError::NotActive | SessionError::AlreadyWon => ErrorCode::NotActive,
            SessionError::NotOnCard(_) | SessionError::NotCalled(_) => ErrorCode::InvalidMark,
            SessionError::SessionFull | SessionError::NotAvailable => ErrorCode::ServerOverloaded,
            SessionError::InvalidClaim(_) => ErrorCode::InvalidInput,
            SessionError::IllegalTransition { .. } | SessionError::InvariantViolation(_) => {
                ErrorCode::InternalError
            }
        },
    }
}

fn registry_error(err: &RegistryError) -> ServerMessage {
    error_message(error_code(err), &err.to_string())
}
