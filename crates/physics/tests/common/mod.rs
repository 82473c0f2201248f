//! Shared fixtures for dynamic terrain tests

#![allow(dead_code)]

use glam::{IVec2, IVec3, Vec3};
use rapier3d::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use terrain_physics::terrain::{
    DeferredScheduler, DynamicTerrain, SectionCoord, Voxel, VoxelShape, VoxelWorld,
};
use terrain_physics::{Aabb, BodyState, PhysicsSpace, PhysicsWorld, TerrainSettings};
use tracing_subscriber::EnvFilter;

pub const DT: Duration = Duration::from_millis(16);

/// Rapier world that counts terrain collider traffic
pub struct CountingSpace {
    pub world: PhysicsWorld,
    pub added: usize,
    pub removed: usize,
    pub wakes: usize,
}

impl CountingSpace {
    pub fn new() -> Self {
        Self {
            world: PhysicsWorld::new(Vec3::ZERO),
            added: 0,
            removed: 0,
            wakes: 0,
        }
    }

    /// Add a dynamic ball of radius 0.5
    pub fn spawn_ball(&mut self, at: Vec3) -> RigidBodyHandle {
        let body = self.world.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .translation(vector![at.x, at.y, at.z])
                .build(),
        );
        self.world
            .add_collider(ColliderBuilder::ball(0.5).build(), body);
        // Joins the island manager's active set
        self.world.step(DT.as_secs_f32());
        body
    }

    /// Move a body and let rapier sync its colliders
    pub fn teleport(&mut self, body: RigidBodyHandle, to: Vec3) {
        let rb = self.world.get_rigid_body_mut(body).unwrap();
        rb.set_translation(vector![to.x, to.y, to.z], true);
        rb.set_linvel(vector![0.0, 0.0, 0.0], true);
        self.world.step(DT.as_secs_f32());
    }

    pub fn despawn(&mut self, body: RigidBodyHandle) {
        self.world.remove_rigid_body(body);
    }

    /// Terrain colliders currently in the world
    pub fn live(&self) -> usize {
        self.added - self.removed
    }
}

impl PhysicsSpace for CountingSpace {
    fn active_bodies(&self) -> Vec<RigidBodyHandle> {
        self.world.active_bodies()
    }

    fn read_body(&self, body: RigidBodyHandle) -> Option<BodyState> {
        self.world.read_body(body)
    }

    fn add_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.added += 1;
        PhysicsSpace::add_collider(&mut self.world, collider)
    }

    fn remove_collider(&mut self, handle: ColliderHandle) {
        self.removed += 1;
        self.world.remove_collider(handle);
    }

    fn wake_bodies_in(&mut self, bounds: &Aabb) {
        self.wakes += 1;
        self.world.wake_bodies_in(bounds);
    }
}

/// Solid ground below y = 0, sections limited to -2..=2 vertically
#[derive(Default)]
pub struct TestWorld {
    unloaded: Mutex<HashSet<IVec2>>,
    overrides: Mutex<HashMap<IVec3, Voxel>>,
}

impl TestWorld {
    pub fn set_loaded(&self, region: IVec2, loaded: bool) {
        let mut unloaded = self.unloaded.lock().unwrap();
        if loaded {
            unloaded.remove(&region);
        } else {
            unloaded.insert(region);
        }
    }

    pub fn set_voxel(&self, pos: IVec3, voxel: Voxel) {
        self.overrides.lock().unwrap().insert(pos, voxel);
    }
}

impl VoxelWorld for TestWorld {
    fn contains_section(&self, coord: SectionCoord) -> bool {
        (-2..=2).contains(&coord.0.y)
    }

    fn is_region_loaded(&self, region: IVec2) -> bool {
        !self.unloaded.lock().unwrap().contains(&region)
    }

    fn classify_voxel(&self, pos: IVec3) -> Voxel {
        if let Some(voxel) = self.overrides.lock().unwrap().get(&pos) {
            return voxel.clone();
        }
        if pos.y < 0 {
            Voxel::Solid(VoxelShape::Full)
        } else {
            Voxel::Passable
        }
    }
}

pub type TestTerrain = DynamicTerrain<TestWorld, DeferredScheduler>;

/// Route engine logs to the test harness (`RUST_LOG=terrain_physics=trace`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn terrain_with(settings: TerrainSettings) -> (Arc<TestWorld>, TestTerrain) {
    init_tracing();
    let world = Arc::new(TestWorld::default());
    let terrain = DynamicTerrain::new(Arc::clone(&world), DeferredScheduler::new(), settings).unwrap();
    (world, terrain)
}

pub fn terrain() -> (Arc<TestWorld>, TestTerrain) {
    terrain_with(TerrainSettings {
        remove_in: 0.5,
        ..TerrainSettings::default()
    })
}

/// Drives a terrain engine with a deterministic clock
pub struct Clock {
    pub now: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { now: Instant::now() }
    }

    pub fn advance(&mut self, by: Duration) -> Instant {
        self.now += by;
        self.now
    }
}

/// Step, then let the host answer every request
pub fn step_and_fulfil(terrain: &mut TestTerrain, world: &TestWorld, space: &mut CountingSpace, now: Instant) {
    terrain.step_at(space, now);
    terrain.scheduler_mut().fulfil_all(world);
}

/// The floor section under a body resting at `pos`
pub fn floor_under(pos: Vec3) -> SectionCoord {
    let coord = SectionCoord::containing(pos);
    SectionCoord::new(coord.0.x, -1, coord.0.z)
}
