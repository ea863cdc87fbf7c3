use crate::game::ClientGameState;
use crate::orders::PlacementOrder;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::collections::VecDeque;
use std::error::Error;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Simulated latency, split evenly between send and receive
    pub fake_ping_ms: u64,
    /// Construction orders issued once the starting base has arrived
    pub orders: Vec<PlacementOrder>,
    /// Skip orders the local preview already rejects
    pub preview: bool,
    /// Exit this long after the last order; None runs until ctrl-c
    pub linger: Option<Duration>,
    pub heartbeat: Duration,
    pub order_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            fake_ping_ms: 0,
            orders: Vec::new(),
            preview: true,
            linger: None,
            heartbeat: Duration::from_secs(1),
            order_interval: Duration::from_millis(250),
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    game_state: ClientGameState,
    options: ClientOptions,
    pending: VecDeque<PlacementOrder>,
    drained_at: Option<Instant>,
}

impl Client {
    pub async fn new(server_addr: &str, options: ClientOptions) -> Result<Self, BoxError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            game_state: ClientGameState::new(),
            pending: options.orders.iter().copied().collect(),
            options,
            drained_at: None,
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn game_state_mut(&mut self) -> &mut ClientGameState {
        &mut self.game_state
    }

    async fn connect(&mut self) -> Result<(), BoxError> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), BoxError> {
        if self.options.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Sends the next queued order once the starting base is known
    async fn issue_next_order(&mut self) -> Result<(), BoxError> {
        if self.game_state.owned_buildings().is_empty() {
            return Ok(());
        }

        let Some(order) = self.pending.pop_front() else {
            return Ok(());
        };

        if self.options.preview {
            if let Err(e) = self
                .game_state
                .preview_placement(order.building_id, order.position)
            {
                warn!("Skipping building {}: {}", order.building_id, e);
                self.mark_drained();
                return Ok(());
            }
        }

        debug!(
            "Requesting building {} at ({:.1}, {:.1}, {:.1})",
            order.building_id, order.position.x, order.position.y, order.position.z
        );
        self.send_packet(&order.to_packet()).await?;
        self.mark_drained();
        Ok(())
    }

    fn mark_drained(&mut self) {
        if self.pending.is_empty() && self.drained_at.is_none() {
            self.drained_at = Some(Instant::now());
        }
    }

    fn linger_elapsed(&self) -> bool {
        match (self.options.linger, self.drained_at) {
            (Some(linger), Some(drained_at)) => drained_at.elapsed() >= linger,
            _ => false,
        }
    }

    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.connect().await?;

        let mut heartbeat_interval = interval(self.options.heartbeat);
        let mut order_interval = interval(self.options.order_interval);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.options.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.game_state.apply_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.game_state.is_connected() {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                },

                _ = order_interval.tick() => {
                    if self.game_state.is_connected() {
                        if let Err(e) = self.issue_next_order().await {
                            error!("Error sending order: {}", e);
                        }
                        self.mark_drained();
                    }
                    if self.linger_elapsed() {
                        info!("All orders issued; leaving");
                        break;
                    }
                },

                _ = &mut ctrl_c => {
                    info!("Ctrl-C received");
                    break;
                },
            }
        }

        if self.game_state.is_connected() {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }
        info!(
            "Final state: {} gold, {} buildings, {} units",
            self.game_state.gold(),
            self.game_state.owned_buildings().len(),
            self.game_state.owned_units().len()
        );

        Ok(())
    }
}
