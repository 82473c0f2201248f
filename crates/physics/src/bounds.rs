//! Axis-aligned bounds using glam types
//!
//! Engine-side bounding boxes. Rapier's own `Aabb` (nalgebra points) is only
//! used at the physics boundary and converted through `From`.

use glam::Vec3;
use rapier3d::parry::bounding_volume::Aabb as ParryAabb;

/// Axis-Aligned Bounding Box using glam types
///
/// Represents a box aligned to the world coordinate axes. All corners are axis-aligned,
/// making intersection tests simple min/max comparisons.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    ///
    /// # Arguments
    /// * `min` - Minimum corner (smallest x, y, z values)
    /// * `max` - Maximum corner (largest x, y, z values)
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from its center and half extents
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest AABB containing both points, in any order
    pub fn spanning(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Grow the box outwards by `amount` on every side
    pub fn expanded(&self, amount: Vec3) -> Self {
        Self {
            min: self.min - amount,
            max: self.max + amount,
        }
    }

    /// Test intersection with another AABB
    ///
    /// # Returns
    /// `true` if the AABBs overlap (including touching at edges/faces)
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Calculate the center point of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Calculate the half-size (half-extents) of the AABB
    pub fn half_size(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

impl From<ParryAabb> for Aabb {
    fn from(aabb: ParryAabb) -> Self {
        Self {
            min: Vec3::new(aabb.mins.x, aabb.mins.y, aabb.mins.z),
            max: Vec3::new(aabb.maxs.x, aabb.maxs.y, aabb.maxs.z),
        }
    }
}
