//! WebSocket Overlay Server
//!
//! Async WebSocket server for overlay displays and ingest clients.
//! Every connection receives the live event stream and may send requests,
//! which are routed to the economy orchestrator.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::economy::config::{parse_or, ConfigError};
use crate::economy::ticker::spawn_leaderboard_ticker;
use crate::economy::{Economy, EconomyError};
use crate::game::action::ActionRequest;
use crate::ledger::{Leaderboard, LedgerStore};
use crate::network::protocol::{ClientMessage, ErrorCode, Hello, OverlayEvent, Response};

/// Outbound frames queued per connection.
const OUTBOUND_BUFFER: usize = 256;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let port: u16 = parse_or(&lookup, "PORT", d.bind_addr.port())?;
        let max_connections = parse_or(&lookup, "MAX_CONNECTIONS", d.max_connections)?;
        Ok(Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            max_connections,
            ..d
        })
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Connection time.
    connected_at: Instant,
    /// Requests handled.
    requests: u64,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The overlay server.
pub struct OverlayServer<S> {
    /// Server configuration.
    config: ServerConfig,
    /// Economy orchestrator.
    economy: Economy<S>,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: LedgerStore + Leaderboard> OverlayServer<S> {
    /// Create a new server.
    pub fn new(config: ServerConfig, economy: Economy<S>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            economy,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind and run the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server on an already bound listener.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!("Overlay server listening on {}", listener.local_addr()?);

        let ticker_handle = spawn_leaderboard_ticker(self.economy.clone(), self.shutdown_tx.subscribe());

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
                            self.handle_connection(stream, addr).await;
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

        // the ticker saw the same shutdown signal
        let _ = ticker_handle.await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        // Register before the handshake so the limit counts pending connections.
        self.clients.write().await.insert(addr, ConnectedClient {
            connected_at: Instant::now(),
            requests: 0,
        });

        let clients = self.clients.clone();
        let economy = self.economy.clone();
        let version = self.config.version.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        // Subscribe before the snapshot is read so nothing falls between them.
        let mut events = economy.broadcaster().subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    clients.write().await.remove(&addr);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<OverlayEvent>(OUTBOUND_BUFFER);

            // Spawn message sender task
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
                let _ = ws_sender.close().await;
            });

            let _ = msg_tx.send(OverlayEvent::Hello(Hello {
                ts: now_millis() as i64,
                version,
            })).await;
            match economy.snapshot().await {
                Ok(snapshot) => {
                    for event in snapshot {
                        let _ = msg_tx.send(event).await;
                    }
                }
                Err(e) => warn!("Snapshot for {} failed: {}", addr, e),
            }

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                touch(&clients, addr).await;
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(request) => handle_request(&economy, request).await,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        OverlayEvent::error(ErrorCode::InvalidInput, "Invalid message format")
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                touch(&clients, addr).await;
                                let reply = match ActionRequest::from_bytes(&data) {
                                    Ok(request) => reply_to(economy.submit_request(&request).await.map(Response::Receipt)),
                                    Err(e) => {
                                        debug!("Invalid binary frame from {}: {}", addr, e);
                                        OverlayEvent::error(ErrorCode::InvalidInput, "Invalid binary action")
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
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
                            // tungstenite answers pings itself
                            _ => {}
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                if msg_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Client {} lagged, skipped {} events", addr, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            drop(msg_tx);
            let _ = sender_task.await;
            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} cleaned up after {} requests in {:?}",
                    addr,
                    client.requests,
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Economy orchestrator.
    pub fn economy(&self) -> &Economy<S> {
        &self.economy
    }
}

async fn touch(clients: &ClientMap, addr: SocketAddr) {
    if let Some(client) = clients.write().await.get_mut(&addr) {
        client.requests += 1;
    }
}

/// Route one request to the economy.
async fn handle_request<S: LedgerStore + Leaderboard>(
    economy: &Economy<S>,
    request: ClientMessage,
) -> OverlayEvent {
    let result = match request {
        ClientMessage::SubmitAction(action) => {
            economy.submit_request(&action).await.map(Response::Receipt)
        }
        ClientMessage::SpinPoints { user_id } => {
            economy.spin_with_points(user_id.as_deref()).await.map(Response::Receipt)
        }
        ClientMessage::GetLeaderboard { limit } => economy
            .leaderboard(limit)
            .await
            .map(|entries| Response::Leaderboard { entries }),
        ClientMessage::GetProgress => economy.progress().await.map(Response::Progress),
        ClientMessage::GetBalance { user_id } => {
            economy.balance(user_id.as_deref()).await.map(Response::Balance)
        }
        ClientMessage::GetJackpot => economy.jackpot().await.map(|pool| Response::Jackpot { pool }),
        ClientMessage::GetConfig => economy.live_config().await.map(Response::Config),
        ClientMessage::PatchConfig { token, patch } => {
            economy.patch_config(&token, patch).await.map(Response::Config)
        }
        ClientMessage::ForceBonus { token, user_id } => {
            economy.force_bonus(&token, &user_id).await.map(Response::Bonus)
        }
        ClientMessage::Ping { timestamp } => Ok(Response::Pong {
            timestamp,
            server_time: now_millis(),
        }),
    };
    reply_to(result)
}

fn reply_to(result: Result<Response, EconomyError>) -> OverlayEvent {
    match result {
        Ok(response) => OverlayEvent::Response(response),
        Err(e) => {
            match e {
                EconomyError::StoreUnavailable(_) => warn!("Request failed: {}", e),
                _ => debug!("Request rejected: {}", e),
            }
            OverlayEvent::error(e.code(), e.to_string())
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
