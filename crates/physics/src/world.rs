use crate::bounds::Aabb;
use crate::space::{BodyState, PhysicsSpace};
use glam::Vec3;
use rapier3d::prelude::*;

/// Physics simulation world
///
/// Manages all rigid bodies, colliders, and physics simulation state.
/// This is a wrapper around Rapier's physics pipeline.
pub struct PhysicsWorld {
    pub(crate) rigid_body_set: RigidBodySet,
    pub(crate) collider_set: ColliderSet,
    pub(crate) impulse_joint_set: ImpulseJointSet,
    pub(crate) multibody_joint_set: MultibodyJointSet,
    pub(crate) integration_parameters: IntegrationParameters,
    pub(crate) physics_pipeline: PhysicsPipeline,
    pub(crate) island_manager: IslandManager,
    pub(crate) broad_phase: DefaultBroadPhase,
    pub(crate) narrow_phase: NarrowPhase,
    pub(crate) ccd_solver: CCDSolver,
    gravity: Vector<Real>,
}

impl PhysicsWorld {
    /// Create a new physics world with specified gravity
    ///
    /// # Arguments
    /// * `gravity` - Gravity vector (e.g., Vec3::new(0.0, -9.81, 0.0))
    pub fn new(gravity: Vec3) -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            gravity: vector![gravity.x, gravity.y, gravity.z],
        }
    }

    /// Step the physics simulation forward by dt seconds
    ///
    /// # Arguments
    /// * `dt` - Time step in seconds (typically 1/60 = 0.016666...)
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    /// Add a rigid body to the world
    ///
    /// # Returns
    /// Handle to the added rigid body
    pub fn add_rigid_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(body)
    }

    /// Remove a rigid body from the world
    ///
    /// Also removes all associated colliders automatically.
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) {
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    /// Add a collider to the world, attached to a rigid body
    ///
    /// # Returns
    /// Handle to the added collider
    pub fn add_collider(
        &mut self,
        collider: Collider,
        parent: RigidBodyHandle,
    ) -> ColliderHandle {
        self.collider_set.insert_with_parent(collider, parent, &mut self.rigid_body_set)
    }

    /// Get a reference to a rigid body
    pub fn get_rigid_body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.rigid_body_set.get(handle)
    }

    /// Get a mutable reference to a rigid body
    pub fn get_rigid_body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.rigid_body_set.get_mut(handle)
    }

    /// Get a reference to a collider
    pub fn get_collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.collider_set.get(handle)
    }

    /// Number of colliders in the world, body-attached or free
    pub fn collider_count(&self) -> usize {
        self.collider_set.len()
    }
}

impl PhysicsSpace for PhysicsWorld {
    fn active_bodies(&self) -> Vec<RigidBodyHandle> {
        // Awake dynamic bodies, as tracked by the island manager
        self.island_manager.active_dynamic_bodies().to_vec()
    }

    fn read_body(&self, body: RigidBodyHandle) -> Option<BodyState> {
        let body = self.rigid_body_set.get(body)?;
        let linvel = body.linvel();
        let collider_bounds = body
            .colliders()
            .iter()
            .filter_map(|&handle| self.collider_set.get(handle))
            .map(|collider| Aabb::from(collider.compute_aabb()))
            .collect();

        Some(BodyState {
            linear_velocity: Vec3::new(linvel.x, linvel.y, linvel.z),
            collider_bounds,
        })
    }

    fn add_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.collider_set.insert(collider)
    }

    fn remove_collider(&mut self, handle: ColliderHandle) {
        self.collider_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.rigid_body_set,
            false,
        );
    }

    fn wake_bodies_in(&mut self, bounds: &Aabb) {
        let touching: Vec<RigidBodyHandle> = self
            .collider_set
            .iter()
            .filter(|(_, collider)| bounds.intersects(&Aabb::from(collider.compute_aabb())))
            .filter_map(|(_, collider)| collider.parent())
            .collect();

        for handle in touching {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                body.wake_up(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gravity_simulation() {
        let mut world = PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0));

        let body = RigidBodyBuilder::dynamic()
            .translation(vector![0.0, 10.0, 0.0])
            .build();

        let handle = world.add_rigid_body(body);

        let collider = ColliderBuilder::ball(0.5).build();
        world.add_collider(collider, handle);

        // Simulate for 1 second
        world.step(1.0);

        let body_ref = world.get_rigid_body(handle).unwrap();
        // Should have fallen due to gravity
        assert!(body_ref.translation().y < 10.0);
    }

    #[test]
    fn test_active_bodies_skip_fixed() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let dynamic = world.add_rigid_body(RigidBodyBuilder::dynamic().build());
        world.add_rigid_body(RigidBodyBuilder::fixed().build());
        world.step(1.0 / 60.0);

        assert_eq!(world.active_bodies(), vec![dynamic]);
    }

    #[test]
    fn test_removed_body_leaves_active_set() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let kept = world.add_rigid_body(RigidBodyBuilder::dynamic().build());
        let removed = world.add_rigid_body(RigidBodyBuilder::dynamic().build());
        world.step(1.0 / 60.0);
        assert_eq!(world.active_bodies().len(), 2);

        world.remove_rigid_body(removed);
        assert_eq!(world.active_bodies(), vec![kept]);
    }

    #[test]
    fn test_read_body_reports_collider_bounds() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![4.0, 5.0, 6.0])
            .linvel(vector![1.0, 0.0, -2.0])
            .build();
        let handle = world.add_rigid_body(body);
        world.add_collider(ColliderBuilder::cuboid(0.5, 1.0, 0.5).build(), handle);

        let state = world.read_body(handle).unwrap();
        assert_eq!(state.linear_velocity, Vec3::new(1.0, 0.0, -2.0));
        assert_eq!(state.collider_bounds.len(), 1);

        let bounds = state.collider_bounds[0];
        assert!((bounds.center() - Vec3::new(4.0, 5.0, 6.0)).length() < 1e-4);
        assert!((bounds.half_size() - Vec3::new(0.5, 1.0, 0.5)).length() < 1e-4);
    }

    #[test]
    fn test_free_collider_add_remove() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let handle = PhysicsSpace::add_collider(&mut world, ColliderBuilder::ball(1.0).build());
        assert_eq!(world.collider_count(), 1);

        world.remove_collider(handle);
        assert_eq!(world.collider_count(), 0);
        assert!(world.get_collider(handle).is_none());
    }
}
