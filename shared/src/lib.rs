//! Types shared by the authoritative server and the replica client
//!
//! The crate holds the wire protocol plus the authority core that both
//! sides run: the ownership registries, the authority event bridge, the
//! resource ledger with its read-only client replica, and the placement
//! validator.

pub mod bridge;
pub mod catalog;
pub mod error;
pub mod events;
pub mod geometry;
pub mod ledger;
pub mod ownership;
pub mod placement;

use catalog::Footprint;
use geometry::{Aabb, LayerMask, Quat, Vec3};
use ledger::BalanceUpdate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROTOCOL_VERSION: u32 = 1;
pub const STARTING_GOLD: u32 = 500;
pub const BUILDING_RANGE_LIMIT: f32 = 10.0;

/// Collider used for every unit
pub const UNIT_FOOTPRINT: Footprint = Footprint {
    center: Vec3::new(0.0, 0.5, 0.0),
    size: Vec3::new(1.0, 1.0, 1.0),
};

/// Identity of one participant; the unit ownership is partitioned by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Unit,
    Building,
}

impl EntityKind {
    /// Physics layer the entity's collider lives on
    pub fn layer(self) -> LayerMask {
        match self {
            EntityKind::Unit => LayerMask::UNIT,
            EntityKind::Building => LayerMask::BUILDING_BLOCK,
        }
    }
}

/// Reference to a spawned networked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub kind: EntityKind,
}

impl EntityRef {
    pub fn unit(id: EntityId) -> Self {
        Self {
            id,
            kind: EntityKind::Unit,
        }
    }

    pub fn building(id: EntityId) -> Self {
        Self {
            id,
            kind: EntityKind::Building,
        }
    }
}

/// Replicated description of a spawned entity
///
/// The owner is fixed at spawn time and never changes for the lifetime of
/// the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: EntityRef,
    pub owner: ConnectionId,
    pub template_id: Option<u32>,
    pub position: Vec3,
    pub rotation: Quat,
    pub bounds: Aabb,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    PlaceBuilding {
        building_id: u32,
        position: Vec3,
        rotation: Quat,
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: ConnectionId,
        team_color_index: u8,
    },
    Terrain {
        obstacles: Vec<Aabb>,
    },
    EntitySpawned(EntitySnapshot),
    EntityDespawned {
        entity: EntityRef,
        owner: ConnectionId,
    },
    GoldUpdated(BalanceUpdate),
    Disconnected {
        reason: String,
    },
}
