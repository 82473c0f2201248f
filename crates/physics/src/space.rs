//! Physics space abstraction
//!
//! The terrain engine only talks to the physics backend through
//! [`PhysicsSpace`]. [`PhysicsWorld`](crate::PhysicsWorld) is the rapier
//! implementation; tests wrap it to count collider traffic.

use crate::bounds::Aabb;
use glam::Vec3;
use rapier3d::prelude::{Collider, ColliderHandle, RigidBodyHandle};

/// What the terrain engine reads from an active body each step
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    pub linear_velocity: Vec3,
    /// World-space bounds of every collider attached to the body
    pub collider_bounds: Vec<Aabb>,
}

/// Operations the terrain engine needs from a physics space
///
/// All calls happen from the physics step context, never while the space is
/// being stepped.
pub trait PhysicsSpace {
    /// Bodies currently simulated (dynamic and awake)
    fn active_bodies(&self) -> Vec<RigidBodyHandle>;

    /// Read velocity and bounds of a body, `None` if it no longer exists
    fn read_body(&self, body: RigidBodyHandle) -> Option<BodyState>;

    /// Register a free-standing collider
    fn add_collider(&mut self, collider: Collider) -> ColliderHandle;

    /// Remove a collider without waking the bodies touching it
    fn remove_collider(&mut self, handle: ColliderHandle);

    /// Wake every body with a collider intersecting `bounds`
    fn wake_bodies_in(&mut self, bounds: &Aabb);
}
