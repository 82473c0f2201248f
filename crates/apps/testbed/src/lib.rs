//! Headless dynamic terrain testbed
//!
//! A procedural voxel world (rolling hills, a water line and scattered slabs)
//! with bodies raining down on it. Terrain collision only exists where the
//! bodies are.

use glam::{IVec2, IVec3, Vec3};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use terrain_physics::rapier3d::prelude::*;
use terrain_physics::terrain::{
    DynamicTerrain, Matter, SectionCoord, SnapshotScheduler, TerrainStats, Voxel, VoxelBox,
    VoxelShape, VoxelWorld,
};
use terrain_physics::{PhysicsWorld, TerrainSettings};

/// Water surface height in voxels
pub const WATER_LEVEL: i32 = 3;

/// Block kind of the half-height slabs on the hills, routable through `layers.by_block`
pub const SLAB_BLOCK: &str = "slab";

/// Vertical section range of the world
const MIN_SECTION_Y: i32 = -4;
const MAX_SECTION_Y: i32 = 4;

/// Procedural hills with editable voxels
pub struct HillsWorld {
    /// Half width of the loaded square, in regions
    loaded_radius: i32,
    edits: RwLock<HashMap<IVec3, Voxel>>,
    slab: VoxelShape,
}

impl HillsWorld {
    pub fn new(loaded_radius: i32) -> Self {
        Self {
            loaded_radius,
            edits: RwLock::new(HashMap::new()),
            slab: VoxelShape::boxes(vec![VoxelBox::new(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0))]),
        }
    }

    /// Terrain surface height of a column
    pub fn height(&self, x: i32, z: i32) -> i32 {
        let (fx, fz) = (x as f32, z as f32);
        let hills = (fx * 0.11).sin() * 4.0 + (fz * 0.07).cos() * 5.0 + (fx * 0.03 + fz * 0.05).sin() * 3.0;
        hills.round() as i32
    }

    /// Overwrite a voxel, returning the section that changed
    ///
    /// Edits survive a poisoned lock: the map only ever holds whole entries.
    pub fn set_voxel(&self, pos: IVec3, voxel: Voxel) -> SectionCoord {
        let mut edits = self.edits.write().unwrap_or_else(|poisoned| {
            tracing::warn!(voxel = %pos, "voxel edit lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        });
        edits.insert(pos, voxel);
        SectionCoord::containing(pos.as_vec3())
    }

    fn is_slab(x: i32, z: i32) -> bool {
        (x.wrapping_mul(73_856_093) ^ z.wrapping_mul(19_349_663)).rem_euclid(11) == 0
    }
}

impl VoxelWorld for HillsWorld {
    fn contains_section(&self, coord: SectionCoord) -> bool {
        (MIN_SECTION_Y..=MAX_SECTION_Y).contains(&coord.0.y)
    }

    fn is_region_loaded(&self, region: IVec2) -> bool {
        region.x.abs() <= self.loaded_radius && region.y.abs() <= self.loaded_radius
    }

    fn classify_voxel(&self, pos: IVec3) -> Voxel {
        let edit = self
            .edits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pos)
            .cloned();
        if let Some(edit) = edit {
            return edit;
        }

        let height = self.height(pos.x, pos.z);
        if pos.y < height {
            Voxel::Solid(VoxelShape::Full)
        } else if pos.y == height && Self::is_slab(pos.x, pos.z) {
            Voxel::block(SLAB_BLOCK, Matter::Solid, self.slab.clone())
        } else if pos.y < WATER_LEVEL {
            Voxel::Fluid(VoxelShape::Full)
        } else {
            Voxel::Passable
        }
    }

    fn is_section_empty(&self, coord: SectionCoord) -> bool {
        // Hills stay below the second section layer
        coord.0.y >= 1
    }
}

/// Testbed run parameters
#[derive(Debug, Clone)]
pub struct TestbedConfig {
    pub steps: usize,
    pub bodies: usize,
    pub spawn_height: f32,
    pub spawn_radius: f32,
    /// Dig a hole under a body every this many steps (0 disables digging)
    pub dig_every: usize,
    /// Log stats every this many steps
    pub report_every: usize,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            steps: 600,
            bodies: 32,
            spawn_height: 30.0,
            spawn_radius: 40.0,
            dig_every: 120,
            report_every: 60,
        }
    }
}

/// Physics world, terrain engine and the bodies moving through them
pub struct Testbed<S> {
    physics: PhysicsWorld,
    terrain: DynamicTerrain<HillsWorld, S>,
    world: Arc<HillsWorld>,
    bodies: Vec<RigidBodyHandle>,
    config: TestbedConfig,
}

impl<S: SnapshotScheduler> Testbed<S> {
    pub fn new(
        world: Arc<HillsWorld>,
        scheduler: S,
        settings: TerrainSettings,
        config: TestbedConfig,
    ) -> terrain_physics::Result<Self> {
        let terrain = DynamicTerrain::new(Arc::clone(&world), scheduler, settings)?;
        tracing::info!(
            remove_in = terrain.settings().remove_in,
            layers = terrain.layers().len(),
            "terrain ready"
        );
        let mut testbed = Self {
            physics: PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0)),
            terrain,
            world,
            bodies: Vec::new(),
            config,
        };
        testbed.spawn_bodies();
        Ok(testbed)
    }

    /// Spawn bodies in a grid pattern, each with some sideways drift
    fn spawn_bodies(&mut self) {
        let count = self.config.bodies;
        let cols = (count as f32).sqrt().ceil().max(1.0) as usize;
        let radius = self.config.spawn_radius;

        for i in 0..count {
            let (row, col) = (i / cols, i % cols);
            let x = (col as f32 - cols as f32 / 2.0) * (radius * 2.0 / cols as f32);
            let z = (row as f32 - cols as f32 / 2.0) * (radius * 2.0 / cols as f32);
            let drift = vector![(i % 5) as f32 - 2.0, 0.0, (i % 3) as f32 - 1.0];

            let body = RigidBodyBuilder::dynamic()
                .translation(vector![x, self.config.spawn_height, z])
                .linvel(drift)
                .ccd_enabled(true)
                .build();
            let handle = self.physics.add_rigid_body(body);

            let collider = if i % 2 == 0 {
                ColliderBuilder::ball(0.5)
            } else {
                ColliderBuilder::cuboid(0.5, 0.5, 0.5)
            };
            self.physics.add_collider(collider.density(1.0).build(), handle);
            self.bodies.push(handle);
        }
        tracing::info!(bodies = count, "spawned bodies");
    }

    /// Advance one tick: terrain maintenance first, then the solve
    pub fn step(&mut self, step: usize, dt: f32) {
        self.terrain.on_physics_step(&mut self.physics);
        self.physics.step(dt);

        if self.config.dig_every > 0 && step > 0 && step % self.config.dig_every == 0 {
            self.dig_under(step / self.config.dig_every);
        }
        if self.config.report_every > 0 && step % self.config.report_every == 0 {
            self.report(step);
        }
    }

    /// Remove the voxel under one of the bodies
    fn dig_under(&mut self, nth: usize) {
        let Some(&handle) = self.bodies.get(nth % self.bodies.len().max(1)) else {
            return;
        };
        let Some(body) = self.physics.get_rigid_body(handle) else {
            return;
        };
        let at = body.translation();
        let below = Vec3::new(at.x, at.y - 1.0, at.z).floor().as_ivec3();

        let section = self.world.set_voxel(below, Voxel::Passable);
        tracing::debug!(voxel = %below, %section, "dug voxel");
        self.terrain.on_section_changed(&mut self.physics, section);
    }

    fn report(&self, step: usize) {
        let stats = self.terrain.stats();
        let lowest = self
            .bodies
            .iter()
            .filter_map(|&handle| self.physics.get_rigid_body(handle))
            .map(|body| body.translation().y)
            .fold(f32::INFINITY, f32::min);

        tracing::info!(
            step,
            built = stats.built,
            in_flight = stats.in_flight,
            retiring = stats.retiring,
            colliders = stats.colliders,
            shapes = stats.cached_shapes,
            step_us = stats.step_time_us,
            lowest_body = lowest,
            "terrain"
        );
    }

    pub fn run(&mut self, dt: f32) {
        for step in 0..self.config.steps {
            self.step(step, dt);
        }
    }

    pub fn stats(&self) -> TerrainStats {
        self.terrain.stats()
    }

    /// Tear down terrain collision, returning the final stats
    pub fn finish(mut self) -> TerrainStats {
        self.terrain.destroy(&mut self.physics);
        let stats = self.terrain.stats();
        tracing::info!(
            colliders = self.physics.collider_count(),
            shapes = stats.cached_shapes,
            "terrain destroyed"
        );
        stats
    }
}
