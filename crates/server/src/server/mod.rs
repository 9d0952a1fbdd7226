//! Game server implementation.
//!
//! Accepts WebSocket connections, decodes client frames at the
//! boundary and fans simulation broadcasts back out. All state
//! mutation happens inside `GameState` behind a single write lock, so
//! events apply strictly in arrival order and every tick settles
//! before the next event is processed.

use crate::config::Config;
use futures_util::{SinkExt, StreamExt};
use gravwell_protocol::{ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

pub mod client;
pub mod game;

pub use game::GameState;

/// A message for a single connection.
#[derive(Debug, Clone)]
pub struct TargetedMessage {
    /// Target client ID.
    pub client_id: u32,
    /// The wire message.
    pub message: ServerMessage,
}

/// Connection tracking state (shared across connection handlers).
struct ConnectionState {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            ip_connections: HashMap::new(),
            total_connections: 0,
        }
    }

    /// Try to add a connection, returns true if allowed.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }

        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }

        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    /// Remove a connection.
    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            if *count > 0 {
                *count -= 1;
                self.total_connections = self.total_connections.saturating_sub(1);
            }
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }
}

/// Run the game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    // Connection tracking state
    let conn_state = Arc::new(RwLock::new(ConnectionState::new()));

    // Fan-out channel for snapshots/leaderboard/chat plus a channel
    // for per-connection messages. Sends never block or wait for
    // acknowledgment; a slow receiver lags and drops.
    let (broadcast_tx, _broadcast_rx) = broadcast::channel::<ServerMessage>(64);
    let (targeted_tx, _targeted_rx) = broadcast::channel::<TargetedMessage>(64);

    // Shared game state
    let game_state = Arc::new(RwLock::new(GameState::new(
        &config,
        broadcast_tx.clone(),
        targeted_tx.clone(),
    )));

    // Independent timers: particle spawning and health regeneration.
    let spawn_state = Arc::clone(&game_state);
    let spawn_interval = config.particle.spawn_interval_ms;
    tokio::spawn(async move {
        game::run_spawn_loop(spawn_state, spawn_interval).await;
    });

    let regen_state = Arc::clone(&game_state);
    let regen_interval = config.regen.interval_ms;
    tokio::spawn(async move {
        game::run_regen_loop(regen_state, regen_interval).await;
    });

    // Connection limits
    let max_connections = config.server.max_connections;
    let ip_limit = config.server.ip_limit;

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip();

        {
            let mut state = conn_state.write().await;
            if !state.try_add_connection(ip, max_connections, ip_limit) {
                warn!("Connection rejected (limit reached): {}", addr);
                continue;
            }
        }

        let game_state = Arc::clone(&game_state);
        let conn_state = Arc::clone(&conn_state);
        let broadcast_rx = broadcast_tx.subscribe();
        let targeted_rx = targeted_tx.subscribe();

        tokio::spawn(async move {
            let result =
                handle_connection(stream, addr, game_state, broadcast_rx, targeted_rx).await;

            // Always remove from connection tracking when done
            {
                let mut state = conn_state.write().await;
                state.remove_connection(addr.ip());
            }

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    game_state: Arc<RwLock<GameState>>,
    mut broadcast_rx: broadcast::Receiver<ServerMessage>,
    mut targeted_rx: broadcast::Receiver<TargetedMessage>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (mut write, mut read) = ws_stream.split();

    // Register the session; this also queues the one-shot map size
    // message for this connection.
    let client_id = {
        let mut state = game_state.write().await;
        state.add_client(addr)
    };

    // Message loop - handle both incoming frames and broadcasts
    loop {
        tokio::select! {
            // Handle incoming WebSocket messages
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match ClientMessage::decode(text.as_str()) {
                            Ok(event) => {
                                let mut state = game_state.write().await;
                                state.handle_message(client_id, event);
                            }
                            // Malformed input never reaches the world.
                            Err(e) => {
                                warn!("Rejected frame from {}: {}", addr, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => {
                        break;
                    }
                    _ => {}
                }
            }
            // Fan-out broadcasts (snapshots, leaderboard, chat)
            broadcast_msg = broadcast_rx.recv() => {
                if let Ok(msg) = broadcast_msg {
                    match msg.encode() {
                        Ok(json) => {
                            if let Err(e) = write.send(Message::text(json)).await {
                                warn!("Failed to send broadcast to {}: {}", addr, e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to encode broadcast for {}: {}", addr, e),
                    }
                }
            }
            // Messages for this connection only
            targeted_msg = targeted_rx.recv() => {
                if let Ok(msg) = targeted_msg {
                    if msg.client_id != client_id {
                        continue;
                    }
                    match msg.message.encode() {
                        Ok(json) => {
                            if let Err(e) = write.send(Message::text(json)).await {
                                warn!("Failed to send message to {}: {}", addr, e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to encode message for {}: {}", addr, e),
                    }
                }
            }
        }
    }

    // Remove client
    {
        let mut state = game_state.write().await;
        state.remove_client(client_id);
    }

    Ok(())
}
