//! Ownership registries mapping spawned entities to their owning connection
//!
//! Two variants share the [`OwnershipRegistry`] contract:
//! - [`ServerAuthority`] tracks every connection's entities on the server
//! - [`LocalAuthority`] tracks only the entities of the connection a client
//!   instance belongs to, ignoring notifications for anyone else
//!
//! Owners are always compared by [`ConnectionId`] value, so two handles that
//! describe the same logical connection route to the same owned-sets.
//! Registries are written only through an
//! [`AuthorityBridge`](crate::bridge::AuthorityBridge).

use crate::error::{AuthorityError, Result};
use crate::{ConnectionId, EntityId, EntityKind, EntityRef};
use log::warn;
use std::collections::{HashMap, HashSet};

/// The live owned-sets of one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnedEntities {
    units: HashSet<EntityId>,
    buildings: HashSet<EntityId>,
}

impl OwnedEntities {
    pub fn units(&self) -> &HashSet<EntityId> {
        &self.units
    }

    pub fn buildings(&self) -> &HashSet<EntityId> {
        &self.buildings
    }

    pub fn contains(&self, entity: EntityRef) -> bool {
        self.set(entity.kind).contains(&entity.id)
    }

    pub fn len(&self) -> usize {
        self.units.len() + self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.buildings.is_empty()
    }

    /// Every owned entity, units first
    pub fn iter(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.units
            .iter()
            .map(|id| EntityRef::unit(*id))
            .chain(self.buildings.iter().map(|id| EntityRef::building(*id)))
    }

    fn set(&self, kind: EntityKind) -> &HashSet<EntityId> {
        match kind {
            EntityKind::Unit => &self.units,
            EntityKind::Building => &self.buildings,
        }
    }

    fn set_mut(&mut self, kind: EntityKind) -> &mut HashSet<EntityId> {
        match kind {
            EntityKind::Unit => &mut self.units,
            EntityKind::Building => &mut self.buildings,
        }
    }

    fn insert(&mut self, entity: EntityRef) -> bool {
        self.set_mut(entity.kind).insert(entity.id)
    }

    fn remove(&mut self, entity: EntityRef) -> bool {
        self.set_mut(entity.kind).remove(&entity.id)
    }
}

pub trait OwnershipRegistry {
    /// Adds `entity` to the owned-set of `owner`.
    ///
    /// Returns `Ok(true)` if the set changed and `Ok(false)` for a no-op.
    /// Fails with [`AuthorityError::StaleConnection`] when `owner` has
    /// already been torn down.
    fn register(&mut self, entity: EntityRef, owner: ConnectionId) -> Result<bool>;

    /// Removes `entity` from the owned-set of `owner`, same return contract
    /// as [`OwnershipRegistry::register`]
    fn unregister(&mut self, entity: EntityRef, owner: ConnectionId) -> Result<bool>;

    /// Owned-sets tracked for `owner`, if any
    fn owned(&self, owner: ConnectionId) -> Option<&OwnedEntities>;
}

/// Server-side registry holding every connected player's owned-sets
#[derive(Debug, Default)]
pub struct ServerAuthority {
    players: HashMap<ConnectionId, OwnedEntities>,
    owners: HashMap<EntityId, ConnectionId>,
}

impl ServerAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates empty owned-sets for a joining connection
    pub(crate) fn join(&mut self, connection: ConnectionId) -> bool {
        if self.players.contains_key(&connection) {
            return false;
        }
        self.players.insert(connection, OwnedEntities::default());
        true
    }

    /// Drops a leaving connection's owned-sets, returning what it still owned
    pub(crate) fn leave(&mut self, connection: ConnectionId) -> Option<OwnedEntities> {
        let owned = self.players.remove(&connection)?;
        for entity in owned.iter() {
            self.owners.remove(&entity.id);
        }
        Some(owned)
    }

    pub fn is_connected(&self, connection: ConnectionId) -> bool {
        self.players.contains_key(&connection)
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.players.keys().copied()
    }

    /// Connection currently owning `entity`
    pub fn owner_of(&self, entity: EntityId) -> Option<ConnectionId> {
        self.owners.get(&entity).copied()
    }
}

impl OwnershipRegistry for ServerAuthority {
    fn register(&mut self, entity: EntityRef, owner: ConnectionId) -> Result<bool> {
        if let Some(current) = self.owners.get(&entity.id) {
            if *current != owner {
                warn!(
                    "Refusing to register {} for connection {}: already owned by {}",
                    entity.id, owner, current
                );
            }
            return Ok(false);
        }

        let owned = self
            .players
            .get_mut(&owner)
            .ok_or(AuthorityError::StaleConnection(owner))?;
        owned.insert(entity);
        self.owners.insert(entity.id, owner);
        Ok(true)
    }

    fn unregister(&mut self, entity: EntityRef, owner: ConnectionId) -> Result<bool> {
        let owned = self
            .players
            .get_mut(&owner)
            .ok_or(AuthorityError::StaleConnection(owner))?;
        if !owned.remove(entity) {
            return Ok(false);
        }
        self.owners.remove(&entity.id);
        Ok(true)
    }

    fn owned(&self, owner: ConnectionId) -> Option<&OwnedEntities> {
        self.players.get(&owner)
    }
}

/// Client-side registry for the one connection this client instance owns
#[derive(Debug)]
pub struct LocalAuthority {
    connection: ConnectionId,
    owned: OwnedEntities,
}

impl LocalAuthority {
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            owned: OwnedEntities::default(),
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn owned_entities(&self) -> &OwnedEntities {
        &self.owned
    }
}

impl OwnershipRegistry for LocalAuthority {
    fn register(&mut self, entity: EntityRef, owner: ConnectionId) -> Result<bool> {
        if owner != self.connection {
            return Ok(false);
        }
        Ok(self.owned.insert(entity))
    }

    fn unregister(&mut self, entity: EntityRef, owner: ConnectionId) -> Result<bool> {
        if owner != self.connection {
            return Ok(false);
        }
        Ok(self.owned.remove(entity))
    }

    fn owned(&self, owner: ConnectionId) -> Option<&OwnedEntities> {
        (owner == self.connection).then_some(&self.owned)
    }
}
