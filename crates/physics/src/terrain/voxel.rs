//! Voxel classification and world access
//!
//! The world collaborator classifies voxels and captures whole sections
//! into [`VoxelSnapshot`]s. Capturing runs on whatever thread the host's
//! scheduler picks, so implementations must be `Send + Sync`.

use super::section::{SectionCoord, SECTION_SIZE};
use super::snapshot::VoxelSnapshot;
use crate::error::SnapshotError;
use glam::{IVec2, IVec3, Vec3};
use std::sync::Arc;

/// Box inside a single voxel, in voxel-local `[0, 1]` space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl VoxelBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }
}

/// Collision geometry of one voxel
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelShape {
    /// Fills the whole voxel
    Full,
    /// Arbitrary union of boxes (slabs, stairs, fences, ...)
    Boxes(Arc<[VoxelBox]>),
}

impl VoxelShape {
    pub fn boxes(boxes: impl Into<Arc<[VoxelBox]>>) -> Self {
        VoxelShape::Boxes(boxes.into())
    }
}

/// Whether a voxel collides or is a fluid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Matter {
    Solid,
    Fluid,
}

/// Name of a block kind, matched against the `layers.by_block` routes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKind(Arc<str>);

impl BlockKind {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Classified voxel
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Voxel {
    #[default]
    Passable,
    /// Solid voxel on the default solid layer
    Solid(VoxelShape),
    /// Fluid voxel on the default fluid layer
    Fluid(VoxelShape),
    /// Voxel of a named block kind
    ///
    /// Lands on the layer its kind is routed to, or on the default layer of
    /// its matter when the kind has no route.
    Block {
        kind: BlockKind,
        matter: Matter,
        shape: VoxelShape,
    },
}

impl Voxel {
    pub fn block(kind: &str, matter: Matter, shape: VoxelShape) -> Self {
        Voxel::Block {
            kind: BlockKind::new(kind),
            matter,
            shape,
        }
    }

    pub fn is_passable(&self) -> bool {
        matches!(self, Voxel::Passable)
    }
}

/// Read access to the voxel world
pub trait VoxelWorld: Send + Sync + 'static {
    /// Whether a section lies inside the world's valid extent
    ///
    /// Sections outside it are never requested and hold no collision.
    fn contains_section(&self, coord: SectionCoord) -> bool;

    /// Whether the horizontal region (column of sections) is loaded
    fn is_region_loaded(&self, region: IVec2) -> bool;

    /// Classify the voxel at a world voxel position
    fn classify_voxel(&self, pos: IVec3) -> Voxel;

    /// Cheap check letting capture skip sections known to be all passable
    fn is_section_empty(&self, _coord: SectionCoord) -> bool {
        false
    }

    /// Capture snapshots of the given sections of one loaded region
    fn fetch_region_snapshot(
        &self,
        region: IVec2,
        sections: &[SectionCoord],
    ) -> Result<Vec<(SectionCoord, VoxelSnapshot)>, SnapshotError> {
        if !self.is_region_loaded(region) {
            return Err(SnapshotError::RegionUnavailable { region });
        }

        Ok(sections
            .iter()
            .map(|&coord| (coord, self.capture_section(coord)))
            .collect())
    }

    /// Capture one section by classifying each of its voxels
    fn capture_section(&self, coord: SectionCoord) -> VoxelSnapshot {
        if !self.contains_section(coord) || self.is_section_empty(coord) {
            return VoxelSnapshot::empty();
        }

        let base = coord.0 * SECTION_SIZE;
        VoxelSnapshot::from_fn(|local| self.classify_voxel(base + local))
    }
}
