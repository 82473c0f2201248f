//! Dynamic terrain collision for voxel worlds
//!
//! Collision geometry is generated on demand for the sections of the world
//! that active bodies may touch, and torn down again once nobody needs it.
//! The physics step never waits for voxel data: snapshots are fetched through
//! a host-supplied scheduler and picked up on a later step.
//!
//! # Architecture
//!
//! - [`ActiveBodyScanner`]: Computes the sections needed by active bodies each step
//! - [`SectionRegistry`]: Per-section state (`Pending`, `Snapshot`, `Built`) plus dirty and request indices
//! - [`SnapshotScheduler`]: Hook through which voxel data is requested, with inline, worker pool and deferred implementations
//! - [`CollisionSynthesizer`]: Turns a snapshot into one compound collider per layer
//! - [`LayerTable`]: Named layers with their materials, and the block kinds routed to them
//! - [`RetirementPolicy`]: Debounces destruction of sections that are no longer needed
//! - [`ShapeCache`]: Reference-counted baked cuboids shared across sections
//! - [`DynamicTerrain`]: Ties everything together behind `on_physics_step`
//!
//! # Usage
//!
//! ```ignore
//! use terrain_physics::terrain::{DynamicTerrain, WorkerPoolScheduler};
//!
//! let scheduler = WorkerPoolScheduler::new(world.clone(), 4)?;
//! let mut terrain = DynamicTerrain::new(world, scheduler, settings)?;
//!
//! // Each physics frame, before stepping
//! terrain.on_physics_step(&mut physics);
//! physics.step(dt);
//!
//! // At teardown
//! terrain.destroy(&mut physics);
//! ```

mod active_region;
mod collider;
mod dynamic;
mod layer;
mod registry;
mod retirement;
mod scheduler;
mod section;
mod shape_cache;
mod snapshot;
mod voxel;

pub use active_region::ActiveBodyScanner;
pub use collider::{CollisionSynthesizer, LayerPlan, Part, SectionPlan};
pub use dynamic::{DynamicTerrain, TerrainStats};
pub use layer::{LayerKey, LayerTable};
pub use registry::{Delivery, SectionRegistry, StateCounts};
pub use retirement::{Retirement, RetirementPolicy};
pub use scheduler::{
    fulfil, DeferredScheduler, InlineScheduler, RegionRequest, SectionRequest, SnapshotDelivery,
    SnapshotScheduler, SnapshotSink, WorkerPoolScheduler,
};
pub use section::{
    ColliderGroup, Layers, Section, SectionCoord, SectionState, Ticket, SECTION_SIZE,
    SECTION_VOLUME,
};
pub use shape_cache::{CompoundPart, ShapeCache, ShapeKey, ShapeRef, SHAPE_QUANTUM};
pub use snapshot::{is_section_local, voxel_index, voxel_local, VoxelSnapshot};
pub use voxel::{BlockKind, Matter, Voxel, VoxelBox, VoxelShape, VoxelWorld};
