//! Session-scoped bridge from spawn/despawn notifications to a registry
//!
//! The bridge owns its registry and hands out only shared references, which
//! makes it the sole writer of the owned-sets. It is created with the
//! session (or the client's connection) and shut down with it; after
//! [`AuthorityBridge::shutdown`] every late notification is dropped.

use crate::error::AuthorityError;
use crate::events::{Listeners, SubscriptionId};
use crate::ownership::{OwnedEntities, OwnershipRegistry, ServerAuthority};
use crate::{ConnectionId, EntityRef};
use log::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEvent {
    Spawned {
        entity: EntityRef,
        owner: ConnectionId,
    },
    Despawned {
        entity: EntityRef,
        owner: ConnectionId,
    },
}

impl EntityEvent {
    pub fn entity(&self) -> EntityRef {
        match self {
            EntityEvent::Spawned { entity, .. } | EntityEvent::Despawned { entity, .. } => *entity,
        }
    }

    pub fn owner(&self) -> ConnectionId {
        match self {
            EntityEvent::Spawned { owner, .. } | EntityEvent::Despawned { owner, .. } => *owner,
        }
    }
}

#[derive(Debug)]
pub struct AuthorityBridge<R> {
    registry: R,
    observers: Listeners<EntityEvent>,
    active: bool,
}

impl<R: OwnershipRegistry> AuthorityBridge<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            observers: Listeners::new(),
            active: true,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn spawned(&mut self, entity: EntityRef, owner: ConnectionId) -> bool {
        self.notify(EntityEvent::Spawned { entity, owner })
    }

    pub fn despawned(&mut self, entity: EntityRef, owner: ConnectionId) -> bool {
        self.notify(EntityEvent::Despawned { entity, owner })
    }

    /// Routes one notification into the registry.
    ///
    /// Observers only hear about events that changed the registry. Returns
    /// whether it did.
    pub fn notify(&mut self, event: EntityEvent) -> bool {
        if !self.active {
            trace!("Dropping {:?} after bridge shutdown", event);
            return false;
        }

        let result = match event {
            EntityEvent::Spawned { entity, owner } => self.registry.register(entity, owner),
            EntityEvent::Despawned { entity, owner } => self.registry.unregister(entity, owner),
        };

        match result {
            Ok(true) => {
                self.observers.emit(&event);
                true
            }
            Ok(false) => false,
            Err(AuthorityError::StaleConnection(connection)) => {
                trace!(
                    "Ignoring {:?} for torn-down connection {}",
                    event,
                    connection
                );
                false
            }
            Err(err) => {
                warn!("Registry rejected {:?}: {}", event, err);
                false
            }
        }
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&EntityEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Detaches every observer and stops routing notifications
    pub fn shutdown(&mut self) {
        if self.active {
            debug!(
                "Authority bridge shutting down ({} observers detached)",
                self.observers.len()
            );
        }
        self.active = false;
        self.observers.clear();
    }
}

impl AuthorityBridge<ServerAuthority> {
    pub fn connection_joined(&mut self, connection: ConnectionId) -> bool {
        self.active && self.registry.join(connection)
    }

    /// Tears down a connection's owned-sets.
    ///
    /// Call after its entities are despawned; anything still listed is
    /// returned so the caller can log the leak.
    pub fn connection_left(&mut self, connection: ConnectionId) -> Option<OwnedEntities> {
        self.registry.leave(connection)
    }
}
