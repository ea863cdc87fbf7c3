//! Authoritative spatial world
//!
//! Holds every spawned networked entity together with its collider, plus
//! static terrain obstacles. Placement overlap checks always run against
//! this state, never against anything a client sent.

use shared::catalog::Footprint;
use shared::geometry::{Aabb, LayerMask, Quat, Vec3, TERRAIN_LAYERS};
use shared::placement::SpatialQuery;
use shared::{ConnectionId, EntityId, EntityKind, EntityRef, EntitySnapshot};
use std::collections::HashMap;

/// Everything needed to instantiate one entity
#[derive(Debug, Clone, Copy)]
pub struct SpawnSpec {
    pub kind: EntityKind,
    pub template_id: Option<u32>,
    pub footprint: Footprint,
    pub position: Vec3,
    pub rotation: Quat,
    pub owner: ConnectionId,
}

#[derive(Debug)]
pub struct World {
    next_entity_id: u32,
    entities: HashMap<EntityId, EntitySnapshot>,
    obstacles: Vec<Aabb>,
}

impl World {
    pub fn new() -> Self {
        Self {
            next_entity_id: 1,
            entities: HashMap::new(),
            obstacles: Vec::new(),
        }
    }

    pub fn with_obstacles(obstacles: Vec<Aabb>) -> Self {
        Self {
            obstacles,
            ..Self::new()
        }
    }

    pub fn add_obstacle(&mut self, bounds: Aabb) {
        self.obstacles.push(bounds);
    }

    pub fn obstacles(&self) -> &[Aabb] {
        &self.obstacles
    }

    /// Creates an entity bound to `spec.owner` and returns its replicated form
    pub fn instantiate(&mut self, spec: SpawnSpec) -> EntitySnapshot {
        let id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;

        let snapshot = EntitySnapshot {
            entity: EntityRef { id, kind: spec.kind },
            owner: spec.owner,
            template_id: spec.template_id,
            position: spec.position,
            rotation: spec.rotation,
            bounds: spec.footprint.at(spec.position),
        };
        self.entities.insert(id, snapshot.clone());
        snapshot
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.get(&id)
    }

    pub fn position(&self, id: EntityId) -> Option<Vec3> {
        self.entities.get(&id).map(|snapshot| snapshot.position)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.entities.values()
    }

    /// Entities owned by `owner`, in ascending id order
    pub fn owned_by(&self, owner: ConnectionId) -> Vec<EntityRef> {
        let mut owned: Vec<EntityRef> = self
            .entities
            .values()
            .filter(|snapshot| snapshot.owner == owner)
            .map(|snapshot| snapshot.entity)
            .collect();
        owned.sort_by_key(|entity| entity.id);
        owned
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialQuery for World {
    fn overlaps(&self, bounds: &Aabb, mask: LayerMask) -> bool {
        if mask.intersects(TERRAIN_LAYERS) && self.obstacles.iter().any(|o| o.intersects(bounds)) {
            return true;
        }

        self.entities.values().any(|snapshot| {
            mask.intersects(snapshot.entity.kind.layer()) && snapshot.bounds.intersects(bounds)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::UNIT_FOOTPRINT;

    const ALICE: ConnectionId = ConnectionId(1);
    const BOB: ConnectionId = ConnectionId(2);

    fn building(owner: ConnectionId, position: Vec3) -> SpawnSpec {
        SpawnSpec {
            kind: EntityKind::Building,
            template_id: Some(1),
            footprint: Footprint::grounded(Vec3::new(3.0, 2.0, 3.0)),
            position,
            rotation: Quat::IDENTITY,
            owner,
        }
    }

    #[test]
    fn test_instantiate_assigns_unique_ids() {
        let mut world = World::new();
        let a = world.instantiate(building(ALICE, Vec3::ZERO));
        let b = world.instantiate(building(ALICE, Vec3::new(10.0, 0.0, 0.0)));

        assert_ne!(a.entity.id, b.entity.id);
        assert_eq!(world.len(), 2);
        assert_eq!(world.position(b.entity.id), Some(Vec3::new(10.0, 0.0, 0.0)));
    }

    #[test]
    fn test_despawn_removes_collider() {
        let mut world = World::new();
        let spawned = world.instantiate(building(ALICE, Vec3::ZERO));
        let probe = Aabb::from_center_size(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(world.overlaps(&probe, LayerMask::BUILDING_BLOCK));

        assert!(world.despawn(spawned.entity.id).is_some());
        assert!(!world.overlaps(&probe, LayerMask::BUILDING_BLOCK));
        assert!(world.despawn(spawned.entity.id).is_none());
    }

    #[test]
    fn test_terrain_blocks_buildings() {
        let rock = Aabb::from_center_size(Vec3::new(20.0, 1.0, 20.0), Vec3::new(4.0, 2.0, 4.0));
        let world = World::with_obstacles(vec![rock]);
        let probe = Aabb::from_center_size(Vec3::new(21.0, 1.0, 21.0), Vec3::new(1.0, 1.0, 1.0));

        assert!(world.overlaps(&probe, LayerMask::BUILDING_BLOCK));
        assert!(world.overlaps(&probe, LayerMask::TERRAIN));
        assert!(!world.overlaps(&probe, LayerMask::UNIT));
    }

    #[test]
    fn test_units_do_not_block_construction() {
        let mut world = World::new();
        world.instantiate(SpawnSpec {
            kind: EntityKind::Unit,
            template_id: None,
            footprint: UNIT_FOOTPRINT,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            owner: ALICE,
        });
        let probe = Aabb::from_center_size(Vec3::new(0.0, 0.5, 0.0), Vec3::new(1.0, 1.0, 1.0));

        assert!(!world.overlaps(&probe, LayerMask::BUILDING_BLOCK));
        assert!(world.overlaps(&probe, LayerMask::UNIT));
    }

    #[test]
    fn test_owned_by_filters_owner() {
        let mut world = World::new();
        let mine = world.instantiate(building(ALICE, Vec3::ZERO));
        world.instantiate(building(BOB, Vec3::new(50.0, 0.0, 0.0)));

        assert_eq!(world.owned_by(ALICE), vec![mine.entity]);
        assert_eq!(world.owned_by(BOB).len(), 1);
        assert!(world.owned_by(ConnectionId(3)).is_empty());
    }
}
