//! Client-side replica of the owning player's state
//!
//! Everything here is written only by packets from the server. The local
//! bridge registers entities the server says this connection owns, the
//! balance replica accepts nothing but server-minted updates, and the
//! replica world mirrors colliders so construction can be previewed with the
//! same validator the server runs.

use log::{debug, info, trace, warn};
use shared::bridge::{AuthorityBridge, EntityEvent};
use shared::catalog::{default_catalog, Catalog};
use shared::error::{AuthorityError, Result};
use shared::events::SubscriptionId;
use shared::geometry::{Aabb, LayerMask, Vec3, TERRAIN_LAYERS};
use shared::ledger::{BalanceChanged, BalanceReplica};
use shared::ownership::{LocalAuthority, OwnedEntities};
use shared::placement::{PlacementValidator, SpatialQuery};
use shared::{ConnectionId, EntityId, EntitySnapshot, Packet};
use std::collections::HashMap;

/// Entities and terrain as last replicated by the server
#[derive(Debug, Default)]
pub struct ReplicaWorld {
    entities: HashMap<EntityId, EntitySnapshot>,
    obstacles: Vec<Aabb>,
}

impl ReplicaWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: EntitySnapshot) {
        self.entities.insert(snapshot.entity.id, snapshot);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities.remove(&id)
    }

    pub fn add_obstacles(&mut self, obstacles: impl IntoIterator<Item = Aabb>) {
        self.obstacles.extend(obstacles);
    }

    pub fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.get(&id)
    }

    pub fn obstacles(&self) -> &[Aabb] {
        &self.obstacles
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.obstacles.clear();
    }
}

impl SpatialQuery for ReplicaWorld {
    fn overlaps(&self, bounds: &Aabb, mask: LayerMask) -> bool {
        if mask.intersects(TERRAIN_LAYERS) && self.obstacles.iter().any(|o| o.intersects(bounds)) {
            return true;
        }

        self.entities.values().any(|snapshot| {
            mask.intersects(snapshot.entity.kind.layer()) && snapshot.bounds.intersects(bounds)
        })
    }
}

pub struct ClientGameState {
    catalog: Catalog,
    validator: PlacementValidator,
    bridge: Option<AuthorityBridge<LocalAuthority>>,
    balance: BalanceReplica,
    world: ReplicaWorld,
    team_color_index: Option<u8>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::with_catalog(default_catalog())
    }

    /// Uses `catalog` for previews; it must match the server's catalog
    pub fn with_catalog(catalog: Catalog) -> Self {
        Self {
            catalog,
            validator: PlacementValidator::default(),
            bridge: None,
            balance: BalanceReplica::new(),
            world: ReplicaWorld::new(),
            team_color_index: None,
        }
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.bridge
            .as_ref()
            .map(|bridge| bridge.registry().connection())
    }

    pub fn is_connected(&self) -> bool {
        self.bridge.is_some()
    }

    pub fn team_color_index(&self) -> Option<u8> {
        self.team_color_index
    }

    pub fn gold(&self) -> u32 {
        self.balance.gold()
    }

    pub fn owned(&self) -> Option<&OwnedEntities> {
        self.bridge
            .as_ref()
            .map(|bridge| bridge.registry().owned_entities())
    }

    pub fn owned_units(&self) -> Vec<EntityId> {
        self.sorted_ids(|owned| owned.units().iter().copied().collect())
    }

    pub fn owned_buildings(&self) -> Vec<EntityId> {
        self.sorted_ids(|owned| owned.buildings().iter().copied().collect())
    }

    pub fn world(&self) -> &ReplicaWorld {
        &self.world
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn subscribe_balance<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&BalanceChanged) + Send + Sync + 'static,
    {
        self.balance.subscribe(callback)
    }

    pub fn unsubscribe_balance(&mut self, id: SubscriptionId) -> bool {
        self.balance.unsubscribe(id)
    }

    /// Observes ownership changes; None before the server assigned an id
    pub fn subscribe_ownership<F>(&mut self, callback: F) -> Option<SubscriptionId>
    where
        F: FnMut(&EntityEvent) + Send + Sync + 'static,
    {
        self.bridge
            .as_mut()
            .map(|bridge| bridge.subscribe(callback))
    }

    /// Applies one packet from the server
    pub fn apply_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected {
                client_id,
                team_color_index,
            } => self.on_connected(client_id, team_color_index),
            Packet::Terrain { obstacles } => {
                debug!("Received {} terrain obstacles", obstacles.len());
                self.world.add_obstacles(obstacles);
            }
            Packet::EntitySpawned(snapshot) => {
                let (entity, owner) = (snapshot.entity, snapshot.owner);
                self.world.insert(snapshot);
                if let Some(bridge) = self.bridge.as_mut() {
                    bridge.spawned(entity, owner);
                }
            }
            Packet::EntityDespawned { entity, owner } => {
                self.world.remove(entity.id);
                if let Some(bridge) = self.bridge.as_mut() {
                    bridge.despawned(entity, owner);
                }
            }
            Packet::GoldUpdated(update) => {
                if let Some(change) = self.balance.apply(update) {
                    info!("Gold {} -> {}", change.old, change.new);
                }
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.teardown();
            }
            other => trace!("Ignoring server-bound packet {:?}", other),
        }
    }

    /// Runs the server's acceptance checks against the replicated state.
    ///
    /// Advisory only: the server re-validates every request against its own
    /// world, and may still reject one that passes here.
    pub fn preview_placement(&self, building_id: u32, position: Vec3) -> Result<()> {
        let connection = self
            .connection()
            .ok_or(AuthorityError::StaleConnection(ConnectionId(0)))?;
        let template = self.catalog.resolve(building_id)?;

        if !self.balance.can_afford(template.price) {
            return Err(AuthorityError::InsufficientFunds {
                needed: template.price,
                available: self.balance.gold(),
            });
        }

        let anchors: Vec<Vec3> = self
            .owned()
            .map(|owned| {
                owned
                    .buildings()
                    .iter()
                    .filter_map(|id| self.world.get(*id))
                    .filter(|snapshot| snapshot.owner == connection)
                    .map(|snapshot| snapshot.position)
                    .collect()
            })
            .unwrap_or_default();

        self.validator
            .check(&self.world, &template.footprint, position, anchors)
            .map_err(AuthorityError::PlacementBlocked)
    }

    /// Detaches all subscriptions and forgets the connection
    pub fn teardown(&mut self) {
        if let Some(mut bridge) = self.bridge.take() {
            bridge.shutdown();
        }
        self.balance.clear_subscribers();
        self.team_color_index = None;
    }

    fn on_connected(&mut self, client_id: ConnectionId, team_color_index: u8) {
        info!(
            "Connected! Client ID: {} (team colour {})",
            client_id, team_color_index
        );
        if let Some(mut previous) = self.bridge.take() {
            previous.shutdown();
        }
        self.world.clear();
        self.balance = BalanceReplica::new();
        self.bridge = Some(AuthorityBridge::new(LocalAuthority::new(client_id)));
        self.team_color_index = Some(team_color_index);
    }

    fn sorted_ids(&self, pick: impl Fn(&OwnedEntities) -> Vec<EntityId>) -> Vec<EntityId> {
        let mut ids = self.owned().map(pick).unwrap_or_default();
        ids.sort();
        ids
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
