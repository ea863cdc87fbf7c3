//! Authoritative per-player state for one game session
//!
//! The session ties the authority core together on the server: the
//! [`ResourceLedger`] with one account per connection, the
//! [`AuthorityBridge`] over a [`ServerAuthority`] registry, the spatial
//! [`World`] and the building [`Catalog`].
//!
//! ## Locking
//!
//! Locks are always taken in the order account → world → bridge. A
//! placement request holds its connection's account for the whole
//! pipeline, so two requests from the same connection cannot both pass the
//! affordability check. The world write lock is the single serialization
//! point for overlap checks and commits across connections.

use crate::replication::Replicator;
use crate::world::{SpawnSpec, World};
use log::{debug, info, warn};
use shared::bridge::AuthorityBridge;
use shared::catalog::{BuildingTemplate, Catalog, Footprint, BASE_TEMPLATE_ID};
use shared::error::{AuthorityError, PlacementFailure, Result};
use shared::geometry::{Aabb, Quat, Vec3};
use shared::ledger::{Authority, BalanceSink, ResourceLedger};
use shared::ownership::{OwnedEntities, OwnershipRegistry, ServerAuthority};
use shared::placement::{PlacementValidator, SpatialQuery};
use shared::{
    ConnectionId, EntityId, EntityKind, EntityRef, EntitySnapshot, BUILDING_RANGE_LIMIT,
    STARTING_GOLD, UNIT_FOOTPRINT,
};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Spawn slots tried past a connection's own before a join is refused
const SPAWN_SLOT_ATTEMPTS: u32 = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gold granted when a connection joins
    pub starting_gold: u32,
    /// Maximum distance from an owned building for new construction
    pub building_range_limit: f32,
    /// Catalog template spawned as each player's starting base
    pub starting_base_id: u32,
    /// Units spawned next to the starting base
    pub starting_units: u32,
    /// Distance between neighbouring spawn points
    pub spawn_spacing: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            starting_gold: STARTING_GOLD,
            building_range_limit: BUILDING_RANGE_LIMIT,
            starting_base_id: BASE_TEMPLATE_ID,
            starting_units: 1,
            spawn_spacing: 40.0,
        }
    }
}

/// A client's request to construct a building
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementRequest {
    pub building_id: u32,
    pub position: Vec3,
    pub rotation: Quat,
}

/// What a connection received when it joined
#[derive(Debug, Clone)]
pub struct JoinGrant {
    pub base: EntitySnapshot,
    pub units: Vec<EntitySnapshot>,
    pub gold: u32,
}

pub struct Session {
    config: SessionConfig,
    catalog: Arc<Catalog>,
    validator: PlacementValidator,
    ledger: ResourceLedger,
    bridge: RwLock<AuthorityBridge<ServerAuthority>>,
    world: RwLock<World>,
    replicator: Arc<dyn Replicator>,
}

impl Session {
    /// Creates a session; fails if the starting base template is not in the catalog
    pub fn new<R>(
        config: SessionConfig,
        catalog: Arc<Catalog>,
        world: World,
        replicator: Arc<R>,
    ) -> Result<Self>
    where
        R: Replicator + BalanceSink + 'static,
    {
        Self::build(config, catalog, world, replicator, Authority::Server)
    }

    /// A session whose ledger refuses every mutation unless `authority` is
    /// [`Authority::Server`]
    #[cfg(test)]
    pub(crate) fn with_ledger_authority<R>(
        config: SessionConfig,
        catalog: Arc<Catalog>,
        world: World,
        replicator: Arc<R>,
        authority: Authority,
    ) -> Result<Self>
    where
        R: Replicator + BalanceSink + 'static,
    {
        Self::build(config, catalog, world, replicator, authority)
    }

    fn build<R>(
        config: SessionConfig,
        catalog: Arc<Catalog>,
        world: World,
        replicator: Arc<R>,
        authority: Authority,
    ) -> Result<Self>
    where
        R: Replicator + BalanceSink + 'static,
    {
        catalog.resolve(config.starting_base_id)?;

        let sink: Arc<dyn BalanceSink> = replicator.clone();
        Ok(Self {
            validator: PlacementValidator::new(config.building_range_limit),
            config,
            catalog,
            ledger: ResourceLedger::new(authority, sink),
            bridge: RwLock::new(AuthorityBridge::new(ServerAuthority::new())),
            world: RwLock::new(world),
            replicator,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Creates the player state of a joining connection.
    ///
    /// Opens the gold account and spawns the starting base plus starting
    /// units so the connection has an anchor for its first construction.
    pub fn join(&self, connection: ConnectionId) -> Result<JoinGrant> {
        let base_template = self.catalog.resolve(self.config.starting_base_id)?.clone();

        if self.bridge().registry().is_connected(connection) {
            warn!("Connection {} joined twice; resetting its state", connection);
            self.leave(connection);
        }
        if !self.bridge_mut().connection_joined(connection) {
            debug!("Bridge is shut down; connection {} will own nothing", connection);
        }
        self.ledger.open_account(connection, self.config.starting_gold)?;

        let mut world = self.world_mut();
        let Some(origin) = self.free_spawn_point(&world, connection, &base_template.footprint)
        else {
            drop(world);
            warn!("No free spawn point for connection {}", connection);
            self.leave(connection);
            return Err(AuthorityError::PlacementBlocked(PlacementFailure::Overlap));
        };
        let base = self.spawn(
            &mut world,
            SpawnSpec {
                kind: EntityKind::Building,
                template_id: Some(base_template.id),
                footprint: base_template.footprint,
                position: origin,
                rotation: Quat::IDENTITY,
                owner: connection,
            },
        );

        let unit_offset = base_template.footprint.size.x * 0.5 + 1.5;
        let units = (0..self.config.starting_units)
            .map(|i| {
                self.spawn(
                    &mut world,
                    SpawnSpec {
                        kind: EntityKind::Unit,
                        template_id: None,
                        footprint: UNIT_FOOTPRINT,
                        position: origin + Vec3::new(unit_offset, 0.0, i as f32 * 1.5),
                        rotation: Quat::IDENTITY,
                        owner: connection,
                    },
                )
            })
            .collect();
        drop(world);

        info!(
            "Connection {} joined with {} gold, base {} at ({:.1}, {:.1}, {:.1})",
            connection,
            self.config.starting_gold,
            base.entity.id,
            origin.x,
            origin.y,
            origin.z
        );
        Ok(JoinGrant {
            base,
            units,
            gold: self.config.starting_gold,
        })
    }

    /// Destroys the player state of a leaving connection.
    ///
    /// Its entities are despawned first, which removes them from the
    /// registry through the bridge; then the owned-sets and the account go.
    pub fn leave(&self, connection: ConnectionId) -> Vec<EntityRef> {
        let despawned = {
            let mut world = self.world_mut();
            let owned = world.owned_by(connection);
            for entity in &owned {
                self.despawn_locked(&mut world, entity.id);
            }
            owned
        };

        if let Some(leftover) = self.bridge_mut().connection_left(connection) {
            if !leftover.is_empty() {
                warn!(
                    "Connection {} left with {} entities still registered",
                    connection,
                    leftover.len()
                );
            }
        }
        let final_gold = self.ledger.close_account(connection);

        info!(
            "Connection {} left ({} entities despawned, final gold {:?})",
            connection,
            despawned.len(),
            final_gold
        );
        despawned
    }

    /// Runs one placement request to completion.
    ///
    /// `TemplateLookup → AffordabilityCheck → PlacementValidation → Commit`.
    /// Any failure rejects the request without touching state. The request
    /// is not deduplicated: a resent request that passes again spends again.
    pub fn try_place_building(
        &self,
        connection: ConnectionId,
        request: &PlacementRequest,
    ) -> Result<EntitySnapshot> {
        let template = self.catalog.resolve(request.building_id)?;

        self.ledger.with_account(connection, |account| {
            if !account.can_afford(template.price) {
                return Err(AuthorityError::InsufficientFunds {
                    needed: template.price,
                    available: account.balance(),
                });
            }

            let mut world = self.world_mut();
            let anchors = self.owned_building_positions(&world, connection)?;
            self.validator
                .check(&*world, &template.footprint, request.position, anchors)
                .map_err(AuthorityError::PlacementBlocked)?;

            let snapshot = self.spawn(&mut world, building_spec(template, request, connection));
            account.debit(template.price)?;

            info!(
                "Connection {} placed {} {} for {} gold ({} left)",
                connection,
                template.name,
                snapshot.entity.id,
                template.price,
                account.balance()
            );
            Ok(snapshot)
        })
    }

    /// Non-mutating check of whether a request would currently be accepted
    pub fn can_place(&self, connection: ConnectionId, request: &PlacementRequest) -> Result<bool> {
        let template = self.catalog.resolve(request.building_id)?;
        let world = self.world();
        let anchors = self.owned_building_positions(&world, connection)?;
        Ok(self
            .validator
            .can_place(&*world, &template.footprint, request.position, anchors))
    }

    /// Spawns a unit for `owner`, e.g. when outer game logic finishes production
    pub fn spawn_unit(&self, owner: ConnectionId, position: Vec3) -> Result<EntitySnapshot> {
        if !self.bridge().registry().is_connected(owner) {
            return Err(AuthorityError::StaleConnection(owner));
        }
        let mut world = self.world_mut();
        Ok(self.spawn(
            &mut world,
            SpawnSpec {
                kind: EntityKind::Unit,
                template_id: None,
                footprint: UNIT_FOOTPRINT,
                position,
                rotation: Quat::IDENTITY,
                owner,
            },
        ))
    }

    /// Removes an entity destroyed by outer game logic
    pub fn despawn(&self, entity: EntityId) -> Option<EntitySnapshot> {
        let mut world = self.world_mut();
        self.despawn_locked(&mut world, entity)
    }

    pub fn balance(&self, connection: ConnectionId) -> Result<u32> {
        self.ledger.balance(connection)
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn owned_units(&self, connection: ConnectionId) -> Result<HashSet<EntityId>> {
        Ok(self.owned(connection)?.units().clone())
    }

    pub fn owned_buildings(&self, connection: ConnectionId) -> Result<HashSet<EntityId>> {
        Ok(self.owned(connection)?.buildings().clone())
    }

    pub fn owned(&self, connection: ConnectionId) -> Result<OwnedEntities> {
        self.bridge()
            .registry()
            .owned(connection)
            .cloned()
            .ok_or(AuthorityError::StaleConnection(connection))
    }

    /// Every entity currently in the world, for late-joining clients
    pub fn snapshots(&self) -> Vec<EntitySnapshot> {
        let mut snapshots: Vec<EntitySnapshot> = self.world().snapshots().cloned().collect();
        snapshots.sort_by_key(|snapshot| snapshot.entity.id);
        snapshots
    }

    pub fn obstacles(&self) -> Vec<Aabb> {
        self.world().obstacles().to_vec()
    }

    pub fn player_count(&self) -> usize {
        self.bridge().registry().connections().count()
    }

    /// Detaches bridge observers; later notifications are ignored
    pub fn shutdown(&self) {
        self.bridge_mut().shutdown();
    }

    /// First spawn point, starting at the connection's own slot, where the
    /// starting base would not overlap building-blocking geometry
    fn free_spawn_point(
        &self,
        world: &World,
        connection: ConnectionId,
        footprint: &Footprint,
    ) -> Option<Vec3> {
        let preferred = connection.0.saturating_sub(1);
        (preferred..preferred.saturating_add(SPAWN_SLOT_ATTEMPTS))
            .map(|slot| self.spawn_point(slot))
            .find(|origin| !world.overlaps(&footprint.at(*origin), self.validator.blocking_layer))
    }

    fn spawn_point(&self, slot: u32) -> Vec3 {
        let column = (slot % 4) as f32;
        let row = (slot / 4) as f32;
        Vec3::new(
            column * self.config.spawn_spacing,
            0.0,
            row * self.config.spawn_spacing,
        )
    }

    /// Instantiates, replicates and registers one entity.
    ///
    /// Takes the world guard so callers keep the commit inside their
    /// critical section.
    fn spawn(&self, world: &mut World, spec: SpawnSpec) -> EntitySnapshot {
        let snapshot = world.instantiate(spec);
        self.replicator.entity_spawned(&snapshot);
        self.bridge_mut().spawned(snapshot.entity, snapshot.owner);
        snapshot
    }

    fn despawn_locked(&self, world: &mut World, entity: EntityId) -> Option<EntitySnapshot> {
        let snapshot = world.despawn(entity)?;
        self.replicator
            .entity_despawned(snapshot.entity, snapshot.owner);
        self.bridge_mut()
            .despawned(snapshot.entity, snapshot.owner);
        debug!(
            "Despawned {} owned by connection {}",
            snapshot.entity.id, snapshot.owner
        );
        Some(snapshot)
    }

    fn owned_building_positions(&self, world: &World, connection: ConnectionId) -> Result<Vec<Vec3>> {
        let bridge = self.bridge();
        let owned = bridge
            .registry()
            .owned(connection)
            .ok_or(AuthorityError::StaleConnection(connection))?;
        Ok(owned
            .buildings()
            .iter()
            .filter_map(|id| world.position(*id))
            .collect())
    }

    fn world(&self) -> RwLockReadGuard<'_, World> {
        self.world.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn world_mut(&self) -> RwLockWriteGuard<'_, World> {
        self.world.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bridge(&self) -> RwLockReadGuard<'_, AuthorityBridge<ServerAuthority>> {
        self.bridge.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn bridge_mut(&self) -> RwLockWriteGuard<'_, AuthorityBridge<ServerAuthority>> {
        self.bridge.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn building_spec(
    template: &BuildingTemplate,
    request: &PlacementRequest,
    owner: ConnectionId,
) -> SpawnSpec {
    SpawnSpec {
        kind: EntityKind::Building,
        template_id: Some(template.id),
        footprint: template.footprint,
        position: request.position,
        rotation: request.rotation,
        owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{RecordingReplicator, Replicated};
    use assert_approx_eq::assert_approx_eq;
    use shared::catalog::default_catalog;
    use std::thread;
    use tokio_test::{assert_err, assert_ok};

    const ALICE: ConnectionId = ConnectionId(1);
    const BOB: ConnectionId = ConnectionId(2);

    const BARRACKS: u32 = 1;
    const TOWER: u32 = 2;
    const FACTORY: u32 = 3;
    const DEPOT: u32 = 4;

    fn session() -> (Session, Arc<RecordingReplicator>) {
        session_with(World::new())
    }

    fn session_with(world: World) -> (Session, Arc<RecordingReplicator>) {
        let replicator = Arc::new(RecordingReplicator::new());
        let session = Session::new(
            SessionConfig::default(),
            Arc::new(default_catalog()),
            world,
            replicator.clone(),
        )
        .unwrap();
        (session, replicator)
    }

    fn request(building_id: u32, x: f32, z: f32) -> PlacementRequest {
        PlacementRequest {
            building_id,
            position: Vec3::new(x, 0.0, z),
            rotation: Quat::IDENTITY,
        }
    }

    #[test]
    fn test_join_grants_base_units_and_gold() {
        let (session, replicator) = session();
        let grant = assert_ok!(session.join(ALICE));

        assert_eq!(grant.gold, 500);
        assert_eq!(grant.base.position, Vec3::ZERO);
        assert_eq!(grant.units.len(), 1);
        assert_eq!(session.balance(ALICE), Ok(500));
        assert_eq!(
            session.owned_buildings(ALICE).unwrap(),
            HashSet::from([grant.base.entity.id])
        );
        assert_eq!(session.owned_units(ALICE).unwrap().len(), 1);
        assert_eq!(replicator.balances_for(ALICE), vec![500]);
    }

    #[test]
    fn test_spawn_points_do_not_collide() {
        let (session, _) = session();
        let alice = session.join(ALICE).unwrap();
        let bob = session.join(BOB).unwrap();
        assert!(!alice.base.bounds.intersects(&bob.base.bounds));
        assert_eq!(session.player_count(), 2);
    }

    #[test]
    fn test_starting_base_skips_occupied_spawn_point() {
        let (session, _) = session();
        session.join(ALICE).unwrap();
        // Five towers chain out to Bob's spawn point at x = 40
        for x in [9.0, 18.0, 27.0, 36.0, 38.0] {
            assert_ok!(session.try_place_building(ALICE, &request(TOWER, x, 0.0)));
        }
        assert_eq!(session.balance(ALICE), Ok(0));

        let bob = assert_ok!(session.join(BOB));
        assert_approx_eq!(bob.base.position.x, 80.0);
        assert_approx_eq!(bob.base.position.z, 0.0);
        assert!(session
            .snapshots()
            .iter()
            .filter(|snapshot| snapshot.entity.kind == EntityKind::Building)
            .filter(|snapshot| snapshot.entity.id != bob.base.entity.id)
            .all(|snapshot| !snapshot.bounds.intersects(&bob.base.bounds)));
        assert!(bob
            .units
            .iter()
            .all(|unit| unit.position.distance_squared(bob.base.position) < 16.0));
    }

    #[test]
    fn test_join_refused_without_free_spawn_point() {
        let terrain = Aabb::from_center_size(Vec3::ZERO, Vec3::new(5000.0, 10.0, 5000.0));
        let (session, _) = session_with(World::with_obstacles(vec![terrain]));

        let err = assert_err!(session.join(ALICE));
        assert_eq!(err, AuthorityError::PlacementBlocked(PlacementFailure::Overlap));
        assert_eq!(session.player_count(), 0);
        assert_eq!(session.balance(ALICE), Err(AuthorityError::StaleConnection(ALICE)));
        assert!(session.snapshots().is_empty());
    }

    #[test]
    fn test_successful_placement_debits_and_registers() {
        let (session, replicator) = session();
        session.join(ALICE).unwrap();
        replicator.take();

        let placed = assert_ok!(session.try_place_building(ALICE, &request(BARRACKS, 5.0, 0.0)));

        assert_eq!(session.balance(ALICE), Ok(100));
        assert!(session
            .owned_buildings(ALICE)
            .unwrap()
            .contains(&placed.entity.id));

        let traffic = replicator.take();
        assert!(traffic.contains(&Replicated::Spawned(placed.clone())));
        assert!(traffic.contains(&Replicated::Balance {
            owner: ALICE,
            update: balance_update(100),
        }));
    }

    #[test]
    fn test_unaffordable_placement_is_rejected() {
        let (session, replicator) = session();
        session.join(ALICE).unwrap();
        replicator.take();

        let err = assert_err!(session.try_place_building(ALICE, &request(FACTORY, 5.0, 0.0)));
        assert_eq!(
            err,
            AuthorityError::InsufficientFunds {
                needed: 600,
                available: 500
            }
        );
        assert_eq!(session.balance(ALICE), Ok(500));
        assert_eq!(session.owned_buildings(ALICE).unwrap().len(), 1);
        assert!(replicator.take().is_empty());
    }

    #[test]
    fn test_overlapping_placement_is_rejected_regardless_of_funds() {
        let (session, replicator) = session();
        session.join(ALICE).unwrap();
        replicator.take();

        let err = assert_err!(session.try_place_building(ALICE, &request(TOWER, 1.0, 0.0)));
        assert_eq!(err, AuthorityError::PlacementBlocked(PlacementFailure::Overlap));
        assert_eq!(session.balance(ALICE), Ok(500));
        assert!(replicator.take().is_empty());
    }

    #[test]
    fn test_out_of_range_placement_is_rejected() {
        let (session, _) = session();
        session.join(ALICE).unwrap();

        let err = assert_err!(session.try_place_building(ALICE, &request(TOWER, 20.0, 0.0)));
        assert_eq!(
            err,
            AuthorityError::PlacementBlocked(PlacementFailure::OutOfRange)
        );
        assert_eq!(session.balance(ALICE), Ok(500));
    }

    #[test]
    fn test_unknown_template_is_rejected() {
        let (session, _) = session();
        session.join(ALICE).unwrap();

        assert_eq!(
            session.try_place_building(ALICE, &request(77, 5.0, 0.0)),
            Err(AuthorityError::UnknownTemplate(77))
        );
        assert_eq!(session.balance(ALICE), Ok(500));
    }

    #[test]
    fn test_terrain_blocks_placement() {
        let rock = Aabb::from_center_size(Vec3::new(6.0, 1.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        let (session, _) = session_with(World::with_obstacles(vec![rock]));
        session.join(ALICE).unwrap();

        assert_eq!(
            session.try_place_building(ALICE, &request(TOWER, 6.0, 0.0)),
            Err(AuthorityError::PlacementBlocked(PlacementFailure::Overlap))
        );
        assert_eq!(session.obstacles(), vec![rock]);
    }

    #[test]
    fn test_new_building_extends_range() {
        let (session, _) = session();
        session.join(ALICE).unwrap();

        assert_ok!(session.try_place_building(ALICE, &request(TOWER, 9.0, 0.0)));
        // 18 units from the base but within range of the tower
        assert_ok!(session.try_place_building(ALICE, &request(TOWER, 18.0, 0.0)));
        assert_eq!(session.balance(ALICE), Ok(300));
    }

    #[test]
    fn test_cannot_anchor_on_other_players_buildings() {
        let (session, _) = session();
        session.join(ALICE).unwrap();
        session.join(BOB).unwrap();

        // Bob's base sits at (40, 0, 0)
        assert_eq!(
            session.try_place_building(ALICE, &request(TOWER, 36.0, 0.0)),
            Err(AuthorityError::PlacementBlocked(PlacementFailure::OutOfRange))
        );
        assert_ok!(session.try_place_building(BOB, &request(TOWER, 36.0, 0.0)));
    }

    #[test]
    fn test_can_place_does_not_mutate() {
        let (session, replicator) = session();
        session.join(ALICE).unwrap();
        replicator.take();

        let probe = request(BARRACKS, 5.0, 0.0);
        assert_eq!(session.can_place(ALICE, &probe), Ok(true));
        assert_eq!(session.can_place(ALICE, &probe), Ok(true));
        assert_eq!(session.balance(ALICE), Ok(500));
        assert!(replicator.take().is_empty());
    }

    #[test]
    fn test_concurrent_requests_from_same_connection() {
        let (session, _) = session();
        session.join(ALICE).unwrap();

        let first = request(DEPOT, 6.0, 0.0);
        let second = request(DEPOT, 0.0, 6.0);

        let results = thread::scope(|scope| {
            let a = scope.spawn(|| session.try_place_building(ALICE, &first));
            let b = scope.spawn(|| session.try_place_building(ALICE, &second));
            [a.join().unwrap(), b.join().unwrap()]
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(
            *failure,
            AuthorityError::InsufficientFunds {
                needed: 300,
                available: 200
            }
        );
        assert_eq!(session.balance(ALICE), Ok(200));
        assert_eq!(session.owned_buildings(ALICE).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_requests_for_same_spot_from_different_connections() {
        // Both bases are within range of (20, 0, 0)
        let config = SessionConfig {
            building_range_limit: 25.0,
            ..SessionConfig::default()
        };
        let wide = Session::new(
            config,
            Arc::new(default_catalog()),
            World::new(),
            Arc::new(RecordingReplicator::new()),
        )
        .unwrap();
        wide.join(ALICE).unwrap();
        wide.join(BOB).unwrap();

        let contested = request(DEPOT, 20.0, 0.0);
        let results = thread::scope(|scope| {
            let a = scope.spawn(|| wide.try_place_building(ALICE, &contested));
            let b = scope.spawn(|| wide.try_place_building(BOB, &contested));
            [a.join().unwrap(), b.join().unwrap()]
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| *r
            == Err(AuthorityError::PlacementBlocked(PlacementFailure::Overlap))));
        let total = wide.balance(ALICE).unwrap() + wide.balance(BOB).unwrap();
        assert_eq!(total, 700);
    }

    #[test]
    fn test_leave_despawns_and_tears_down() {
        let (session, replicator) = session();
        session.join(ALICE).unwrap();
        session.join(BOB).unwrap();
        session
            .try_place_building(ALICE, &request(TOWER, 5.0, 0.0))
            .unwrap();
        replicator.take();

        let despawned = session.leave(ALICE);
        assert_eq!(despawned.len(), 3);

        let traffic = replicator.take();
        let despawns = traffic
            .iter()
            .filter(|entry| matches!(entry, Replicated::Despawned { owner, .. } if *owner == ALICE))
            .count();
        assert_eq!(despawns, 3);

        assert_eq!(session.balance(ALICE), Err(AuthorityError::StaleConnection(ALICE)));
        assert_eq!(
            session.owned_buildings(ALICE),
            Err(AuthorityError::StaleConnection(ALICE))
        );
        assert_eq!(session.owned_buildings(BOB).unwrap().len(), 1);
        assert!(matches!(
            session.try_place_building(ALICE, &request(TOWER, 5.0, 0.0)),
            Err(AuthorityError::StaleConnection(_))
        ));
    }

    #[test]
    fn test_external_despawn_updates_registry() {
        let (session, _) = session();
        let grant = session.join(ALICE).unwrap();

        let unit = grant.units[0].entity;
        assert!(session.despawn(unit.id).is_some());
        assert!(session.owned_units(ALICE).unwrap().is_empty());
        assert!(session.despawn(unit.id).is_none());

        // Losing the base removes the only range anchor
        session.despawn(grant.base.entity.id);
        assert_eq!(
            session.try_place_building(ALICE, &request(TOWER, 5.0, 0.0)),
            Err(AuthorityError::PlacementBlocked(PlacementFailure::OutOfRange))
        );
    }

    #[test]
    fn test_rejoin_resets_state() {
        let (session, _) = session();
        session.join(ALICE).unwrap();
        session
            .try_place_building(ALICE, &request(TOWER, 5.0, 0.0))
            .unwrap();

        let grant = session.join(ALICE).unwrap();
        assert_eq!(session.balance(ALICE), Ok(500));
        assert_eq!(
            session.owned_buildings(ALICE).unwrap(),
            HashSet::from([grant.base.entity.id])
        );
        assert_eq!(session.snapshots().len(), 2);
    }

    #[test]
    fn test_spawn_unit_registers_for_owner() {
        let (session, _) = session();
        session.join(ALICE).unwrap();

        let unit = assert_ok!(session.spawn_unit(ALICE, Vec3::new(3.0, 0.0, 3.0)));
        assert!(session.owned_units(ALICE).unwrap().contains(&unit.entity.id));
        assert_eq!(
            session.spawn_unit(BOB, Vec3::ZERO),
            Err(AuthorityError::StaleConnection(BOB))
        );
    }

    #[test]
    fn test_missing_base_template_fails_construction() {
        let config = SessionConfig {
            starting_base_id: 99,
            ..SessionConfig::default()
        };
        let result = Session::new(
            config,
            Arc::new(default_catalog()),
            World::new(),
            Arc::new(RecordingReplicator::new()),
        );
        assert!(matches!(result, Err(AuthorityError::UnknownTemplate(99))));
    }

    #[test]
    fn test_shutdown_ignores_late_notifications() {
        let (session, _) = session();
        session.join(ALICE).unwrap();
        session.shutdown();

        let unit = session.spawn_unit(ALICE, Vec3::new(3.0, 0.0, 3.0)).unwrap();
        assert!(!session.owned_units(ALICE).unwrap().contains(&unit.entity.id));
    }

    fn balance_update(gold: u32) -> shared::ledger::BalanceUpdate {
        let sink = Arc::new(shared::ledger::RecordingSink::new());
        let ledger = ResourceLedger::new(Authority::Server, sink.clone());
        ledger.open_account(ConnectionId(0), gold).unwrap();
        sink.take()[0].1
    }
}
