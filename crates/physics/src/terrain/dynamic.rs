//! Dynamic terrain collision
//!
//! [`DynamicTerrain`] keeps collision geometry alive only around active
//! bodies. Each physics step it scans the bodies, updates the section
//! registry, sends out requests for missing voxel data, and turns delivered
//! snapshots into colliders. Sections nobody needs any more are destroyed
//! once they stayed unneeded for the configured removal delay.

use super::active_region::ActiveBodyScanner;
use super::collider::CollisionSynthesizer;
use super::registry::{Delivery, SectionRegistry};
use super::retirement::{Retirement, RetirementPolicy};
use super::scheduler::{
    snapshot_channel, RegionRequest, SectionRequest, SnapshotDelivery, SnapshotScheduler,
    SnapshotSink,
};
use super::layer::{LayerKey, LayerTable};
use super::section::{Layers, SectionCoord, SectionState};
use super::shape_cache::ShapeCache;
use super::voxel::VoxelWorld;
use crate::error::Result;
use crate::settings::TerrainSettings;
use crate::space::PhysicsSpace;
use crossbeam_channel::Receiver;
use glam::IVec2;
use rapier3d::prelude::ColliderHandle;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of the engine's bookkeeping, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TerrainStats {
    /// Sections waiting for a request to be sent
    pub pending: usize,
    /// Sections with a request in flight
    pub in_flight: usize,
    /// Sections with data awaiting synthesis
    pub snapshots: usize,
    pub built: usize,
    /// Sections counting down to destruction
    pub retiring: usize,
    /// Terrain colliders registered in the physics space
    pub colliders: usize,
    /// Distinct baked shapes in the cache
    pub cached_shapes: usize,
    /// Duration of the last step in microseconds
    pub step_time_us: f32,
}

/// Synthesizes and retires terrain collision around active bodies
pub struct DynamicTerrain<W, S> {
    world: Arc<W>,
    scheduler: S,
    settings: TerrainSettings,
    scanner: ActiveBodyScanner,
    retirement: RetirementPolicy,
    synthesizer: CollisionSynthesizer,
    registry: SectionRegistry,
    sink: SnapshotSink,
    deliveries: Receiver<SnapshotDelivery>,
    last_step: Duration,
    destroyed: bool,
}

impl<W: VoxelWorld, S: SnapshotScheduler> DynamicTerrain<W, S> {
    /// Create an engine reading from `world` and fetching through `scheduler`
    ///
    /// # Errors
    /// Returns [`TerrainError::Settings`](crate::TerrainError::Settings) if
    /// the settings fail validation, including layer keys that name no
    /// configured layer.
    pub fn new(world: Arc<W>, scheduler: S, settings: TerrainSettings) -> Result<Self> {
        settings.validate()?;
        let layers = LayerTable::new(&settings.layers)?;
        let (sink, deliveries) = snapshot_channel();

        Ok(Self {
            world,
            scheduler,
            scanner: ActiveBodyScanner::new(settings.expand_velocity, settings.expand_constant),
            retirement: RetirementPolicy::new(settings.removal_delay()),
            synthesizer: CollisionSynthesizer::new(layers),
            settings,
            registry: SectionRegistry::new(),
            sink,
            deliveries,
            last_step: Duration::ZERO,
            destroyed: false,
        })
    }

    /// Run one step of terrain maintenance
    ///
    /// Call once per physics tick, before the space is stepped.
    pub fn on_physics_step(&mut self, space: &mut impl PhysicsSpace) {
        self.step_at(space, Instant::now());
    }

    /// Run one step of terrain maintenance at an explicit time
    pub fn step_at(&mut self, space: &mut impl PhysicsSpace, now: Instant) {
        if !self.settings.enabled || self.destroyed {
            return;
        }
        let started = Instant::now();

        let needed = self.scanner.scan(space);
        self.drain_deliveries();
        self.admit(&needed);
        self.retire(&needed, space, now);
        self.dispatch(&needed);
        self.synthesize(space);

        self.last_step = started.elapsed();
    }

    fn drain_deliveries(&mut self) {
        for SnapshotDelivery { request, result } in self.deliveries.try_iter() {
            if let Err(err) = &result {
                tracing::debug!(section = %request.coord, %err, "snapshot request failed");
            }
            if self.registry.accept(request.coord, request.ticket, result) == Delivery::Stale {
                tracing::trace!(section = %request.coord, ticket = request.ticket.0, "discarding stale snapshot");
            }
        }
    }

    fn admit(&mut self, needed: &HashSet<SectionCoord>) {
        for &coord in needed {
            match self.registry.get_mut(coord) {
                Some(section) => {
                    if RetirementPolicy::cancel(&mut section.retire_at) {
                        tracing::debug!(section = %coord, "retirement cancelled");
                    }
                }
                None if self.world.contains_section(coord) => {
                    tracing::trace!(section = %coord, "section needed");
                    self.registry.insert_pending(coord);
                }
                None => self.registry.insert_empty(coord),
            }
        }
    }

    fn retire(&mut self, needed: &HashSet<SectionCoord>, space: &mut impl PhysicsSpace, now: Instant) {
        let unwanted: Vec<SectionCoord> = self
            .registry
            .coords()
            .filter(|coord| !needed.contains(coord))
            .collect();

        for coord in unwanted {
            let Some(section) = self.registry.get_mut(coord) else {
                continue;
            };
            match self.retirement.evaluate(&mut section.retire_at, now) {
                Retirement::Armed => tracing::trace!(section = %coord, "retirement armed"),
                Retirement::Waiting => {}
                Retirement::Expired => self.destroy_section(coord, space),
            }
        }
    }

    fn destroy_section(&mut self, coord: SectionCoord, space: &mut impl PhysicsSpace) {
        let Some(section) = self.registry.remove(coord) else {
            return;
        };
        tracing::trace!(section = %coord, colliders = section.collider_count(), "destroying section");

        if let SectionState::Built(layers) = section.state {
            self.synthesizer.release_layers(layers, space);
        }
        if let Some(layers) = section.superseded {
            self.synthesizer.release_layers(layers, space);
        }
    }

    fn dispatch(&mut self, needed: &HashSet<SectionCoord>) {
        let mut wanted: Vec<SectionCoord> = self
            .registry
            .unrequested()
            .filter(|coord| needed.contains(coord))
            .collect();
        wanted.sort();

        let mut regions: BTreeMap<(i32, i32), Vec<SectionRequest>> = BTreeMap::new();
        for coord in wanted {
            if let Some(ticket) = self.registry.issue_ticket(coord) {
                let region = coord.region();
                regions
                    .entry((region.x, region.y))
                    .or_default()
                    .push(SectionRequest { coord, ticket });
            }
        }

        for ((x, z), sections) in regions {
            tracing::trace!(region = %IVec2::new(x, z), sections = sections.len(), "requesting snapshots");
            self.scheduler.schedule(
                RegionRequest {
                    region: IVec2::new(x, z),
                    sections,
                },
                self.sink.clone(),
            );
        }
    }

    fn synthesize(&mut self, space: &mut impl PhysicsSpace) {
        for (coord, snapshot) in self.registry.take_dirty() {
            let layers = match self.synthesizer.build(coord, &snapshot, space) {
                Ok(layers) => layers,
                Err(err) => {
                    tracing::warn!(section = %coord, %err, "collision synthesis failed, section left empty");
                    Layers::new()
                }
            };
            if let Some(old) = self.registry.install(coord, layers) {
                self.synthesizer.release_layers(old, space);
            }
        }
    }

    /// Rebuild a section after its voxels changed
    ///
    /// Bodies touching the section are woken so they notice the change. A
    /// section that has data or colliders is requested again; its current
    /// colliders stay in place until the rebuild replaces them.
    pub fn on_section_changed(&mut self, space: &mut impl PhysicsSpace, coord: SectionCoord) {
        if self.destroyed {
            return;
        }
        space.wake_bodies_in(&coord.bounds());

        if !self.world.contains_section(coord) {
            return;
        }
        if self.registry.invalidate(coord) {
            tracing::debug!(section = %coord, "section changed, rebuilding");
        }
    }

    /// Remove every terrain collider and release every shape reference
    ///
    /// The engine does nothing on later steps.
    pub fn destroy(&mut self, space: &mut impl PhysicsSpace) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let sections = self.registry.drain();
        let count = sections.len();
        for (_, section) in sections {
            if let SectionState::Built(layers) = section.state {
                self.synthesizer.release_layers(layers, space);
            }
            if let Some(layers) = section.superseded {
                self.synthesizer.release_layers(layers, space);
            }
        }

        let leaked = self.synthesizer.destroy();
        tracing::debug!(sections = count, leaked, "dynamic terrain destroyed");
    }

    pub fn section_state(&self, coord: SectionCoord) -> Option<&SectionState> {
        self.registry.get(coord).map(|section| &section.state)
    }

    pub fn section_count(&self) -> usize {
        self.registry.len()
    }

    /// Section and layer a terrain collider belongs to
    pub fn owner_of(&self, collider: ColliderHandle) -> Option<(SectionCoord, LayerKey)> {
        self.registry.owner_of(collider)
    }

    /// Configured layers, indexed by key
    pub fn layers(&self) -> &LayerTable {
        self.synthesizer.layers()
    }

    pub fn shape_cache(&self) -> &ShapeCache {
        self.synthesizer.shape_cache()
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn stats(&self) -> TerrainStats {
        let counts = self.registry.state_counts();
        TerrainStats {
            pending: counts.pending,
            in_flight: counts.in_flight,
            snapshots: counts.snapshot,
            built: counts.built,
            retiring: counts.retiring,
            colliders: self.registry.collider_count(),
            cached_shapes: self.synthesizer.shape_cache().len(),
            step_time_us: self.last_step.as_secs_f32() * 1_000_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::scheduler::InlineScheduler;
    use crate::terrain::voxel::{Voxel, VoxelShape};
    use crate::PhysicsWorld;
    use glam::{IVec3, Vec3};
    use rapier3d::prelude::*;

    /// Flat ground: solid below y = 0, nothing outside 0 <= y section < 2 or below -1
    struct Flat;

    impl VoxelWorld for Flat {
        fn contains_section(&self, coord: SectionCoord) -> bool {
            (-1..2).contains(&coord.0.y)
        }

        fn is_region_loaded(&self, _region: IVec2) -> bool {
            true
        }

        fn classify_voxel(&self, pos: IVec3) -> Voxel {
            if pos.y < 0 {
                Voxel::Solid(VoxelShape::Full)
            } else {
                Voxel::Passable
            }
        }
    }

    fn engine() -> DynamicTerrain<Flat, InlineScheduler<Flat>> {
        let world = Arc::new(Flat);
        DynamicTerrain::new(
            Arc::clone(&world),
            InlineScheduler::new(world),
            TerrainSettings::default(),
        )
        .unwrap()
    }

    fn drop_ball(space: &mut PhysicsWorld, at: Vec3) -> RigidBodyHandle {
        let body = space.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .translation(vector![at.x, at.y, at.z])
                .build(),
        );
        space.add_collider(ColliderBuilder::ball(0.5).build(), body);
        space.step(1.0 / 60.0);
        body
    }

    #[test]
    fn test_new_rejects_invalid_settings() {
        let world = Arc::new(Flat);
        let settings = TerrainSettings {
            remove_in: -1.0,
            ..TerrainSettings::default()
        };
        assert!(DynamicTerrain::new(Arc::clone(&world), InlineScheduler::new(world), settings).is_err());
    }

    #[test]
    fn test_new_rejects_route_to_unknown_layer() {
        let world = Arc::new(Flat);
        let mut settings = TerrainSettings::default();
        settings.layers.by_block.insert("slab".to_owned(), "slabs".to_owned());

        let result = DynamicTerrain::new(Arc::clone(&world), InlineScheduler::new(world), settings);
        assert!(matches!(result, Err(crate::TerrainError::Settings(_))));
    }

    #[test]
    fn test_body_above_ground_builds_floor() {
        let mut space = PhysicsWorld::new(Vec3::ZERO);
        let mut terrain = engine();
        drop_ball(&mut space, Vec3::new(8.0, 0.6, 8.0));

        let now = Instant::now();
        terrain.step_at(&mut space, now);
        let floor = SectionCoord::new(0, -1, 0);
        assert!(matches!(terrain.section_state(floor), Some(SectionState::Pending { request: Some(_) })));

        terrain.step_at(&mut space, now);
        assert!(terrain.section_state(floor).unwrap().is_built());

        let stats = terrain.stats();
        assert_eq!(stats.colliders, 1);
        assert_eq!(stats.cached_shapes, 1);
        assert_eq!(stats.built, terrain.section_count());
    }

    #[test]
    fn test_out_of_extent_sections_are_never_requested() {
        let mut space = PhysicsWorld::new(Vec3::ZERO);
        let mut terrain = engine();
        drop_ball(&mut space, Vec3::new(8.0, 100.0, 8.0));

        terrain.step_at(&mut space, Instant::now());
        let above = SectionCoord::new(0, 6, 0);
        assert!(terrain.section_state(above).unwrap().is_built());
        assert_eq!(terrain.stats().in_flight, 0);
    }

    #[test]
    fn test_owner_of_resolves_terrain_colliders() {
        let mut space = PhysicsWorld::new(Vec3::ZERO);
        let mut terrain = engine();
        drop_ball(&mut space, Vec3::new(8.0, 0.6, 8.0));

        let now = Instant::now();
        terrain.step_at(&mut space, now);
        terrain.step_at(&mut space, now);

        let SectionState::Built(layers) = terrain.section_state(SectionCoord::new(0, -1, 0)).unwrap() else {
            panic!("floor not built");
        };
        let solid = terrain.layers().default_solid().clone();
        let handle = layers[&solid].colliders[0];
        assert_eq!(terrain.owner_of(handle), Some((SectionCoord::new(0, -1, 0), solid)));
    }

    #[test]
    fn test_destroy_clears_everything() {
        let mut space = PhysicsWorld::new(Vec3::ZERO);
        let mut terrain = engine();
        drop_ball(&mut space, Vec3::new(8.0, 0.6, 8.0));

        let now = Instant::now();
        terrain.step_at(&mut space, now);
        terrain.step_at(&mut space, now);
        terrain.destroy(&mut space);

        // Only the ball remains
        assert_eq!(space.collider_count(), 1);
        assert_eq!(terrain.section_count(), 0);
        assert!(terrain.shape_cache().is_empty());

        terrain.step_at(&mut space, now);
        assert_eq!(terrain.section_count(), 0);
    }
}
