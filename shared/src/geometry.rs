//! World-space primitives shared by the server world and the client replica
//!
//! Positions are in world units on a Y-up axis. Footprints are tested as
//! axis-aligned boxes; building rotation is replicated but does not affect
//! the overlap test.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Squared Euclidean distance, used for range checks without a square root
    pub fn distance_squared(self, other: Vec3) -> f32 {
        (self - other).length_squared()
    }

    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Orientation requested for a new building, carried through to replication
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation about the vertical axis, the only one an RTS building uses
    pub fn from_yaw(radians: f32) -> Self {
        let half = radians * 0.5;
        Self {
            x: 0.0,
            y: half.sin(),
            z: 0.0,
            w: half.cos(),
        }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned bounding box described by its center and half extents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
        }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        Self::new(center, size * 0.5)
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    /// Returns true when the two boxes share interior volume.
    ///
    /// Boxes that only touch along a face are not considered overlapping,
    /// so buildings may be placed flush against each other.
    pub fn intersects(&self, other: &Aabb) -> bool {
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());

        !(a_max.x <= b_min.x
            || b_max.x <= a_min.x
            || a_max.y <= b_min.y
            || b_max.y <= a_min.y
            || a_max.z <= b_min.z
            || b_max.z <= a_min.z)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        let (min, max) = (self.min(), self.max());
        point.x >= min.x
            && point.x <= max.x
            && point.y >= min.y
            && point.y <= max.y
            && point.z >= min.z
            && point.z <= max.z
    }
}

bitflags! {
    /// Physics layers an overlap query can be restricted to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct LayerMask: u32 {
        const TERRAIN        = 1 << 0;
        const UNIT           = 1 << 1;
        /// Geometry that new construction may not overlap
        const BUILDING_BLOCK = 1 << 2;
    }
}

/// Layers a static terrain obstacle occupies
pub const TERRAIN_LAYERS: LayerMask = LayerMask::TERRAIN.union(LayerMask::BUILDING_BLOCK);

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_distance_squared() {
        let a = Vec3::new(1.0, 0.0, 2.0);
        let b = Vec3::new(4.0, 0.0, 6.0);
        assert_approx_eq!(a.distance_squared(b), 25.0);
        assert_approx_eq!(b.distance_squared(a), 25.0);
    }

    #[test]
    fn test_aabb_bounds() {
        let aabb = Aabb::from_center_size(Vec3::new(0.0, 1.0, 0.0), Vec3::new(4.0, 2.0, 4.0));
        assert_eq!(aabb.min(), Vec3::new(-2.0, 0.0, -2.0));
        assert_eq!(aabb.max(), Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::from_center_size(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0));
        let b = Aabb::from_center_size(Vec3::new(1.5, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn test_aabb_no_overlap() {
        let a = Aabb::from_center_size(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0));
        let b = Aabb::from_center_size(Vec3::new(10.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_aabb_exact_touch() {
        let a = Aabb::from_center_size(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0));
        let b = Aabb::from_center_size(Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_aabb_separated_on_one_axis_only() {
        let a = Aabb::from_center_size(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0));
        let b = Aabb::from_center_size(Vec3::new(0.5, 5.0, 0.5), Vec3::new(2.0, 2.0, 2.0));
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_contains_point() {
        let aabb = Aabb::from_center_size(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0));
        assert!(aabb.contains_point(Vec3::new(1.0, -1.0, 0.5)));
        assert!(!aabb.contains_point(Vec3::new(1.1, 0.0, 0.0)));
    }

    #[test]
    fn test_yaw_quaternion_is_normalized() {
        let q = Quat::from_yaw(std::f32::consts::FRAC_PI_2);
        let norm = q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w;
        assert_approx_eq!(norm, 1.0, 1e-6);
        assert_eq!(Quat::default(), Quat::IDENTITY);
    }
}
