//! Server network layer handling UDP communications and session coordination

use crate::client_manager::ClientManager;
use crate::replication::ChannelReplicator;
use crate::session::{PlacementRequest, Session, SessionConfig};
use crate::world::World;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::catalog::{default_catalog, Catalog};
use shared::{ConnectionId, Packet, PROTOCOL_VERSION};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Obstacles per `Terrain` datagram
const TERRAIN_CHUNK: usize = 64;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Events forwarded from the background tasks to the run loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ConnectionId },
    Shutdown,
}

/// Messages sent from the session and main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    SendToClient {
        packet: Packet,
        client_id: ConnectionId,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ConnectionId>,
    },
}

/// Transport settings; player-state settings live in [`SessionConfig`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Silence after which a client is dropped
    pub timeout: Duration,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(33),
            max_clients: 8,
            timeout: Duration::from_secs(5),
            session: SessionConfig::default(),
        }
    }
}

/// Main server coordinating networking and the authoritative session
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    session: Arc<Session>,
    tick_duration: Duration,
    timeout: Duration,
    tick: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    /// Binds a server with the default catalog and an empty world
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, BoxError> {
        Self::with_world(addr, config, default_catalog(), World::new()).await
    }

    pub async fn with_world(
        addr: &str,
        config: ServerConfig,
        catalog: Catalog,
        world: World,
    ) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let replicator = Arc::new(ChannelReplicator::new(game_tx.clone()));
        let session = Session::new(config.session, Arc::new(catalog), world, replicator)?;

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            session: Arc::new(session),
            tick_duration: config.tick_duration,
            timeout: config.timeout,
            tick: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// Sender that can stop the run loop with [`ServerMessage::Shutdown`]
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Decodes datagrams and forwards them to the run loop
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Run loop is gone, dropping packet: {}", e);
                                break;
                            }
                        } else {
                            warn!("Undecodable datagram from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Socket receive failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Drains the outgoing queue onto the socket
    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToClient { packet, client_id } => {
                        let addr = clients.read().await.addr_of(client_id);
                        match addr {
                            Some(addr) => {
                                if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                                    error!("Failed to send to client {}: {}", client_id, e);
                                }
                            }
                            None => debug!("Dropping packet for departed client {}", client_id),
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = clients.read().await.get_client_addrs();

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Reports silent connections once per second
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = clients.write().await.check_timeouts(timeout);

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Run loop is gone, dropping timeout: {}", e);
                        return;
                    }
                }
            }
        });
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Outgoing queue closed: {}", e);
        }
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        self.queue(GameMessage::SendPacket { packet, addr });
    }

    /// Processes one incoming packet
    ///
    /// Refused joins and placement rejections are dropped here; only
    /// contract violations surface as errors and stop the server.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) -> Result<(), BoxError> {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );
                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: format!(
                                "Protocol version {} required, got {}",
                                PROTOCOL_VERSION, client_version
                            ),
                        },
                        addr,
                    );
                    return Ok(());
                }

                // A reconnect from the same address replaces the old connection
                let existing_client_id = self.clients.read().await.find_client_by_addr(addr);
                if let Some(existing_id) = existing_client_id {
                    info!("Replacing connection {} from {}", existing_id, addr);
                    self.clients.write().await.remove_client(existing_id);
                    self.session.leave(existing_id);
                }

                let admitted = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr).and_then(|client_id| {
                        clients
                            .get(client_id)
                            .map(|client| (client_id, client.team_color_index))
                    })
                };

                match admitted {
                    Some((client_id, team_color_index)) => match self.session.join(client_id) {
                        Ok(_) => {
                            // `Connected` resets the client's replica, so the
                            // pushes queued by the join are sent again after it
                            self.send_packet(
                                Packet::Connected {
                                    client_id,
                                    team_color_index,
                                },
                                addr,
                            );
                            self.send_world_to(addr);
                            if let Err(e) = self.session.ledger().republish(client_id) {
                                warn!("Could not resend gold to client {}: {}", client_id, e);
                            }
                        }
                        Err(e) if e.is_contract_violation() => {
                            error!("Client {} hit a contract violation: {}", client_id, e);
                            return Err(e.into());
                        }
                        Err(e) => {
                            warn!("Refusing client {} from {}: {}", client_id, addr, e);
                            self.clients.write().await.remove_client(client_id);
                            self.send_packet(
                                Packet::Disconnected {
                                    reason: format!("Join refused: {}", e),
                                },
                                addr,
                            );
                        }
                    },
                    None => {
                        self.send_packet(
                            Packet::Disconnected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::PlaceBuilding {
                building_id,
                position,
                rotation,
            } => {
                let Some(client_id) = self.find_and_touch(addr).await else {
                    warn!("Placement request from unknown address {}", addr);
                    return Ok(());
                };

                let request = PlacementRequest {
                    building_id,
                    position,
                    rotation,
                };
                match self.session.try_place_building(client_id, &request) {
                    Ok(_) => {}
                    Err(e) if e.is_contract_violation() => {
                        error!("Client {} hit a contract violation: {}", client_id, e);
                        return Err(e.into());
                    }
                    Err(e) => {
                        debug!(
                            "Rejected building {} from client {}: {}",
                            building_id, client_id, e
                        );
                    }
                }
            }

            Packet::Heartbeat => {
                if self.find_and_touch(addr).await.is_none() {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            Packet::Disconnect => {
                let client_id = self.clients.read().await.find_client_by_addr(addr);
                if let Some(client_id) = client_id {
                    self.clients.write().await.remove_client(client_id);
                    self.session.leave(client_id);
                }
            }

            _ => {
                warn!("Client-bound packet received from {}", addr);
            }
        }
        Ok(())
    }

    async fn find_and_touch(&self, addr: SocketAddr) -> Option<ConnectionId> {
        let mut clients = self.clients.write().await;
        let client_id = clients.find_client_by_addr(addr)?;
        clients.touch(client_id);
        Some(client_id)
    }

    /// Sends terrain and every existing entity to a newly connected client
    fn send_world_to(&self, addr: SocketAddr) {
        let obstacles = self.session.obstacles();
        for chunk in obstacles.chunks(TERRAIN_CHUNK) {
            self.send_packet(
                Packet::Terrain {
                    obstacles: chunk.to_vec(),
                },
                addr,
            );
        }
        for snapshot in self.session.snapshots() {
            self.send_packet(Packet::EntitySpawned(snapshot), addr);
        }
    }

    /// Drives the session until shutdown: packets, timeouts and ticks
    pub async fn run(&mut self) -> Result<(), BoxError> {
        // Background tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);

        info!("Authority server running");

        let result = loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            if let Err(e) = self.handle_packet(packet, addr).await {
                                break Err(e);
                            }
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.session.leave(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Authority server stopping");
                            break Ok(());
                        }
                    }
                },

                // Periodic monitoring
                _ = tick_interval.tick() => {
                    self.tick += 1;
                    if self.tick % 300 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {} players in session, {} entities",
                                self.tick,
                                client_count,
                                self.session.player_count(),
                                self.session.snapshots().len()
                            );
                        }
                    }
                },
            }
        };

        self.session.shutdown();
        result
    }
}

async fn send_packet_impl(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), BoxError> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}
