//! Outbound replication from the session to the transport
//!
//! Spawns and despawns are broadcast to every client; balance pushes go to
//! the owning client only.

use crate::network::GameMessage;
use log::error;
use shared::ledger::{BalanceSink, BalanceUpdate};
use shared::{ConnectionId, EntityRef, EntitySnapshot, Packet};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

pub trait Replicator: Send + Sync {
    fn entity_spawned(&self, snapshot: &EntitySnapshot);
    fn entity_despawned(&self, entity: EntityRef, owner: ConnectionId);
}

/// Queues replicated packets for the network sender task
#[derive(Debug, Clone)]
pub struct ChannelReplicator {
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl ChannelReplicator {
    pub fn new(game_tx: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self { game_tx }
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Failed to queue replicated packet: {}", e);
        }
    }
}

impl BalanceSink for ChannelReplicator {
    fn push_balance(&self, owner: ConnectionId, update: BalanceUpdate) {
        self.queue(GameMessage::SendToClient {
            packet: Packet::GoldUpdated(update),
            client_id: owner,
        });
    }
}

impl Replicator for ChannelReplicator {
    fn entity_spawned(&self, snapshot: &EntitySnapshot) {
        self.queue(GameMessage::BroadcastPacket {
            packet: Packet::EntitySpawned(snapshot.clone()),
            exclude: None,
        });
    }

    fn entity_despawned(&self, entity: EntityRef, owner: ConnectionId) {
        self.queue(GameMessage::BroadcastPacket {
            packet: Packet::EntityDespawned { entity, owner },
            exclude: None,
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Replicated {
    Balance {
        owner: ConnectionId,
        update: BalanceUpdate,
    },
    Spawned(EntitySnapshot),
    Despawned {
        entity: EntityRef,
        owner: ConnectionId,
    },
}

/// Keeps replicated traffic in memory for headless sessions and tests
#[derive(Debug, Default)]
pub struct RecordingReplicator {
    log: Mutex<Vec<Replicated>>,
}

impl RecordingReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Replicated> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Balance values pushed to `owner` since the last `take`, oldest first
    pub fn balances_for(&self, owner: ConnectionId) -> Vec<u32> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|entry| match entry {
                Replicated::Balance { owner: to, update } if *to == owner => Some(update.gold()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, entry: Replicated) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl BalanceSink for RecordingReplicator {
    fn push_balance(&self, owner: ConnectionId, update: BalanceUpdate) {
        self.record(Replicated::Balance { owner, update });
    }
}

impl Replicator for RecordingReplicator {
    fn entity_spawned(&self, snapshot: &EntitySnapshot) {
        self.record(Replicated::Spawned(snapshot.clone()));
    }

    fn entity_despawned(&self, entity: EntityRef, owner: ConnectionId) {
        self.record(Replicated::Despawned { entity, owner });
    }
}
