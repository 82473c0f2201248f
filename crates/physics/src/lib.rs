mod bounds;
mod error;
mod settings;
mod space;
pub mod terrain;
mod world;

pub use bounds::Aabb;
pub use error::{Result, SnapshotError, TerrainError};
pub use settings::{
    Layer, LayerSettings, TerrainSettings, DEFAULT_FLUID_LAYER, DEFAULT_SOLID_LAYER,
};
pub use space::{BodyState, PhysicsSpace};
pub use world::PhysicsWorld;

// Re-export for convenience
pub use glam;
pub use rapier3d;
