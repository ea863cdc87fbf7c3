//! Legality checks for new construction
//!
//! A placement passes when its footprint is clear of building-blocking
//! geometry and it lies within range of a building the requester already
//! owns. The validator is a pure predicate over whatever world it is given:
//! the server passes its authoritative world, the client its replica for a
//! preview.

use crate::catalog::Footprint;
use crate::error::PlacementFailure;
use crate::geometry::{Aabb, LayerMask, Vec3};
use crate::BUILDING_RANGE_LIMIT;

/// Overlap queries against a spatial world
pub trait SpatialQuery {
    /// True if `bounds` intersects any collider on a layer in `mask`
    fn overlaps(&self, bounds: &Aabb, mask: LayerMask) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementValidator {
    pub blocking_layer: LayerMask,
    pub range_limit: f32,
}

impl Default for PlacementValidator {
    fn default() -> Self {
        Self {
            blocking_layer: LayerMask::BUILDING_BLOCK,
            range_limit: BUILDING_RANGE_LIMIT,
        }
    }
}

impl PlacementValidator {
    pub fn new(range_limit: f32) -> Self {
        Self {
            range_limit,
            ..Self::default()
        }
    }

    /// Checks a placement and names the first failing step.
    ///
    /// `anchors` are the positions of buildings owned by the requester. With
    /// no anchors the range check always fails.
    pub fn check<W, I>(
        &self,
        world: &W,
        footprint: &Footprint,
        position: Vec3,
        anchors: I,
    ) -> Result<(), PlacementFailure>
    where
        W: SpatialQuery + ?Sized,
        I: IntoIterator<Item = Vec3>,
    {
        if world.overlaps(&footprint.at(position), self.blocking_layer) {
            return Err(PlacementFailure::Overlap);
        }

        let limit_squared = self.range_limit * self.range_limit;
        if anchors
            .into_iter()
            .any(|anchor| position.distance_squared(anchor) <= limit_squared)
        {
            Ok(())
        } else {
            Err(PlacementFailure::OutOfRange)
        }
    }

    pub fn can_place<W, I>(&self, world: &W, footprint: &Footprint, position: Vec3, anchors: I) -> bool
    where
        W: SpatialQuery + ?Sized,
        I: IntoIterator<Item = Vec3>,
    {
        self.check(world, footprint, position, anchors).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Boxes {
        colliders: Vec<(Aabb, LayerMask)>,
        queries: Cell<usize>,
    }

    impl Boxes {
        fn new(colliders: Vec<(Aabb, LayerMask)>) -> Self {
            Self {
                colliders,
                queries: Cell::new(0),
            }
        }
    }

    impl SpatialQuery for Boxes {
        fn overlaps(&self, bounds: &Aabb, mask: LayerMask) -> bool {
            self.queries.set(self.queries.get() + 1);
            self.colliders
                .iter()
                .any(|(collider, layer)| mask.intersects(*layer) && collider.intersects(bounds))
        }
    }

    fn tower() -> Footprint {
        Footprint::grounded(Vec3::new(1.0, 3.0, 1.0))
    }

    fn base_at_origin() -> Boxes {
        let base = Footprint::grounded(Vec3::new(4.0, 2.0, 4.0)).at(Vec3::ZERO);
        Boxes::new(vec![(base, LayerMask::BUILDING_BLOCK)])
    }

    #[test]
    fn test_clear_and_in_range() {
        let world = base_at_origin();
        let validator = PlacementValidator::default();
        assert_eq!(
            validator.check(&world, &tower(), Vec3::new(5.0, 0.0, 0.0), [Vec3::ZERO]),
            Ok(())
        );
    }

    #[test]
    fn test_overlap_rejected_before_range() {
        let world = base_at_origin();
        let validator = PlacementValidator::default();
        assert_eq!(
            validator.check(&world, &tower(), Vec3::new(1.0, 0.0, 0.0), [Vec3::ZERO]),
            Err(PlacementFailure::Overlap)
        );
    }

    #[test]
    fn test_out_of_range() {
        let world = base_at_origin();
        let validator = PlacementValidator::default();
        assert_eq!(
            validator.check(&world, &tower(), Vec3::new(20.0, 0.0, 0.0), [Vec3::ZERO]),
            Err(PlacementFailure::OutOfRange)
        );
    }

    #[test]
    fn test_range_limit_is_inclusive() {
        let world = Boxes::new(Vec::new());
        let validator = PlacementValidator::new(10.0);
        assert!(validator.can_place(&world, &tower(), Vec3::new(10.0, 0.0, 0.0), [Vec3::ZERO]));
        assert!(!validator.can_place(&world, &tower(), Vec3::new(10.01, 0.0, 0.0), [Vec3::ZERO]));
    }

    #[test]
    fn test_any_owned_building_can_anchor() {
        let world = Boxes::new(Vec::new());
        let validator = PlacementValidator::default();
        let anchors = [Vec3::new(-50.0, 0.0, 0.0), Vec3::new(30.0, 0.0, 0.0)];
        assert!(validator.can_place(&world, &tower(), Vec3::new(25.0, 0.0, 0.0), anchors));
    }

    #[test]
    fn test_no_owned_buildings_always_fails() {
        let world = Boxes::new(Vec::new());
        let validator = PlacementValidator::default();
        assert_eq!(
            validator.check(&world, &tower(), Vec3::ZERO, std::iter::empty()),
            Err(PlacementFailure::OutOfRange)
        );
    }

    #[test]
    fn test_non_blocking_layers_are_ignored() {
        let unit = Aabb::from_center_size(Vec3::new(5.0, 0.5, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let world = Boxes::new(vec![(unit, LayerMask::UNIT)]);
        let validator = PlacementValidator::default();
        assert!(validator.can_place(&world, &tower(), Vec3::new(5.0, 0.0, 0.0), [Vec3::ZERO]));
    }

    #[test]
    fn test_predicate_is_repeatable() {
        let world = base_at_origin();
        let validator = PlacementValidator::default();
        let position = Vec3::new(3.0, 0.0, 3.0);

        let first = validator.check(&world, &tower(), position, [Vec3::ZERO]);
        let second = validator.check(&world, &tower(), position, [Vec3::ZERO]);

        assert_eq!(first, second);
        assert_eq!(world.colliders.len(), 1);
        assert_eq!(world.queries.get(), 2);
    }
}
