//! Client connection management for the authority server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Connection ids, which are never reused within a run
//! - Connection id allocation and address tracking
//! - Team colour assignment from a fixed palette
//!
//! Player state (gold, owned entities) lives in the session; the client
//! manager only knows who is on the other end of each address.

use log::info;
use rand::seq::SliceRandom;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Number of distinct team colours clients can render
pub const TEAM_PALETTE_SIZE: u8 = 8;

/// Represents a connected client
#[derive(Debug)]
pub struct Client {
    /// Connection id assigned by the server
    pub id: ConnectionId,
    /// Where outgoing packets for this connection go
    pub addr: SocketAddr,
    /// Refreshed by every packet from this address
    pub last_seen: Instant,
    /// Index into the team colour palette
    pub team_color_index: u8,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr, team_color_index: u8) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            team_color_index,
        }
    }

    /// Records activity from this client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if no packets arrived within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Enforces the server capacity limit and hands out connection ids that are
/// never reused within one server run, so a stale id can never alias a newer
/// connection.
pub struct ClientManager {
    /// Connected clients indexed by connection id
    clients: HashMap<ConnectionId, Client>,
    /// Next available connection id
    next_client_id: u32,
    /// Connection cap
    max_clients: usize,
}

impl ClientManager {
    /// Admits at most `max_clients` concurrent connections
    ///
    /// Connection ids start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Admits a connection from `addr` unless the server is full
    ///
    /// Returns the new connection id, or None if the server is at capacity.
    /// The client gets a random team colour not used by anyone else while
    /// free colours remain.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = ConnectionId(self.next_client_id);
        self.next_client_id += 1;

        let team_color_index = self.pick_team_color();
        info!(
            "Client {} connected from {} (team colour {})",
            client_id, addr, team_color_index
        );
        self.clients
            .insert(client_id, Client::new(client_id, addr, team_color_index));

        Some(client_id)
    }

    /// Removes a client; returns false if it was already gone
    pub fn remove_client(&mut self, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a connection id by network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    pub fn get(&self, client_id: ConnectionId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn addr_of(&self, client_id: ConnectionId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Updates a client's activity timestamp; returns false for unknown ids
    pub fn touch(&mut self, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
            true
        } else {
            false
        }
    }

    /// Removes clients that have been silent longer than `timeout`
    ///
    /// Returns the removed ids so the session can tear down their state.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(*client_id);
        }

        timed_out
    }

    /// Gets all connection ids and their network addresses
    ///
    /// Used for broadcasting replicated packets to every connected client.
    pub fn get_client_addrs(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.clients
            .values()
            .map(|client| (client.id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn pick_team_color(&self) -> u8 {
        let free: Vec<u8> = (0..TEAM_PALETTE_SIZE)
            .filter(|index| {
                !self
                    .clients
                    .values()
                    .any(|client| client.team_color_index == *index)
            })
            .collect();

        let mut rng = rand::thread_rng();
        match free.choose(&mut rng) {
            Some(index) => *index,
            // More clients than colours; share one
            None => (self.next_client_id % u32::from(TEAM_PALETTE_SIZE)) as u8,
        }
    }
}
