//! Active region tracking for terrain collision
//!
//! Determines which sections need collision geometry based on
//! dynamic body positions and velocities.

use super::section::SectionCoord;
use crate::bounds::Aabb;
use crate::space::{BodyState, PhysicsSpace};
use glam::Vec3;
use std::collections::HashSet;

/// Computes the set of sections active bodies may touch before the next scan
///
/// Each collider bound is swept along the body's velocity, then grown by its
/// own half size and a constant margin. Every section the result overlaps is
/// needed.
#[derive(Debug, Clone, Copy)]
pub struct ActiveBodyScanner {
    /// Seconds of travel to look ahead along the velocity
    expand_velocity: f32,
    /// Distance added around every body
    expand_constant: f32,
}

impl ActiveBodyScanner {
    /// Create a new scanner
    ///
    /// # Arguments
    /// * `expand_velocity` - Factor applied to the linear velocity for the sweep
    /// * `expand_constant` - Margin added on every side after the sweep
    pub fn new(expand_velocity: f32, expand_constant: f32) -> Self {
        Self {
            expand_velocity,
            expand_constant,
        }
    }

    /// Expanded bounds of one collider moving with `velocity`
    ///
    /// # Arguments
    /// * `bounds` - World-space bounds of the collider
    /// * `velocity` - Linear velocity of the owning body
    pub fn expand_bounds(&self, bounds: &Aabb, velocity: Vec3) -> Aabb {
        let pos = bounds.center();
        Aabb::spanning(pos, pos + velocity * self.expand_velocity)
            .expanded(bounds.half_size())
            .expanded(Vec3::splat(self.expand_constant))
    }

    /// Sections needed by a single body
    pub fn sections_for(&self, body: &BodyState, needed: &mut HashSet<SectionCoord>) {
        for bounds in &body.collider_bounds {
            let expanded = self.expand_bounds(bounds, body.linear_velocity);
            needed.extend(SectionCoord::enclosing(&expanded));
        }
    }

    /// Union of the sections needed by every active body
    ///
    /// Only reads the space.
    pub fn scan(&self, space: &impl PhysicsSpace) -> HashSet<SectionCoord> {
        let mut needed = HashSet::new();
        for handle in space.active_bodies() {
            if let Some(body) = space.read_body(handle) {
                self.sections_for(&body, &mut needed);
            }
        }
        needed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;
    use crate::PhysicsWorld;
    use rapier3d::prelude::*;

    fn body_at(center: Vec3, half: Vec3, velocity: Vec3) -> BodyState {
        BodyState {
            linear_velocity: velocity,
            collider_bounds: vec![Aabb::from_center_half_extents(center, half)],
        }
    }

    fn needed_by(scanner: &ActiveBodyScanner, body: &BodyState) -> HashSet<SectionCoord> {
        let mut needed = HashSet::new();
        scanner.sections_for(body, &mut needed);
        needed
    }

    #[test]
    fn test_expand_stationary_body() {
        let scanner = ActiveBodyScanner::new(0.1, 1.0);
        let bounds = Aabb::from_center_half_extents(Vec3::new(5.0, 5.0, 5.0), Vec3::splat(0.5));

        let expanded = scanner.expand_bounds(&bounds, Vec3::ZERO);
        assert_eq!(expanded.min, Vec3::splat(3.5));
        assert_eq!(expanded.max, Vec3::splat(6.5));
    }

    #[test]
    fn test_expand_follows_velocity() {
        let scanner = ActiveBodyScanner::new(0.5, 0.0);
        let bounds = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(1.0));

        let expanded = scanner.expand_bounds(&bounds, Vec3::new(-10.0, 0.0, 4.0));
        assert_eq!(expanded.min, Vec3::new(-6.0, -1.0, -1.0));
        assert_eq!(expanded.max, Vec3::new(1.0, 1.0, 3.0));
    }

    #[test]
    fn test_body_section_always_needed() {
        let scanner = ActiveBodyScanner::new(0.0, 0.0);
        for center in [
            Vec3::new(8.0, 8.0, 8.0),
            Vec3::new(-0.25, 31.9, 100.0),
            Vec3::new(-47.0, -3.0, 16.0),
        ] {
            let needed = needed_by(&scanner, &body_at(center, Vec3::splat(0.25), Vec3::ZERO));
            assert!(needed.contains(&SectionCoord::containing(center)));
        }
    }

    #[test]
    fn test_fast_body_reaches_next_section() {
        let scanner = ActiveBodyScanner::new(1.0, 0.5);
        let body = body_at(Vec3::new(14.0, 8.0, 8.0), Vec3::splat(0.5), Vec3::new(20.0, 0.0, 0.0));

        let needed = needed_by(&scanner, &body);
        assert!(needed.contains(&SectionCoord::new(0, 0, 0)));
        assert!(needed.contains(&SectionCoord::new(1, 0, 0)));
        assert!(needed.contains(&SectionCoord::new(2, 0, 0)));
        assert!(!needed.contains(&SectionCoord::new(-1, 0, 0)));
    }

    #[test]
    fn test_scan_unions_bodies() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        for x in [8.0, 40.0] {
            let body = world.add_rigid_body(
                RigidBodyBuilder::dynamic()
                    .translation(vector![x, 8.0, 8.0])
                    .build(),
            );
            world.add_collider(ColliderBuilder::ball(0.5).build(), body);
        }
        // Fixed bodies are never scanned
        let fixed = world.add_rigid_body(
            RigidBodyBuilder::fixed()
                .translation(vector![100.0, 8.0, 8.0])
                .build(),
        );
        world.add_collider(ColliderBuilder::ball(0.5).build(), fixed);
        world.step(1.0 / 60.0);

        let needed = ActiveBodyScanner::new(0.1, 1.0).scan(&world);
        assert_eq!(
            needed,
            HashSet::from([SectionCoord::new(0, 0, 0), SectionCoord::new(2, 0, 0)])
        );
    }

    #[test]
    fn test_scan_without_bodies_is_empty() {
        let world = PhysicsWorld::new(Vec3::ZERO);
        assert!(ActiveBodyScanner::new(0.1, 1.0).scan(&world).is_empty());
    }
}
