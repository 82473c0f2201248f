//! Immutable voxel data of one section

use super::section::{SECTION_SIZE, SECTION_VOLUME};
use super::voxel::Voxel;
use crate::error::{Result, TerrainError};
use glam::IVec3;

static PASSABLE: Voxel = Voxel::Passable;

/// Whether a position lies inside `[0, SECTION_SIZE)` on every axis
pub fn is_section_local(local: IVec3) -> bool {
    local.cmpge(IVec3::ZERO).all() && local.cmplt(IVec3::splat(SECTION_SIZE)).all()
}

/// Index of a section-local voxel position (`x + z*16 + y*256`)
pub fn voxel_index(local: IVec3) -> usize {
    debug_assert!(is_section_local(local), "voxel {local} outside section");
    (local.x + local.z * SECTION_SIZE + local.y * SECTION_SIZE * SECTION_SIZE) as usize
}

/// Section-local position of a voxel index
pub fn voxel_local(index: usize) -> IVec3 {
    let i = index as i32;
    IVec3::new(
        i % SECTION_SIZE,
        i / (SECTION_SIZE * SECTION_SIZE),
        (i / SECTION_SIZE) % SECTION_SIZE,
    )
}

/// Captured voxels of one section
///
/// Either the shared all-passable snapshot or exactly [`SECTION_VOLUME`] voxels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoxelSnapshot {
    voxels: Option<Box<[Voxel]>>,
}

impl VoxelSnapshot {
    /// Snapshot of a section with nothing in it
    pub fn empty() -> Self {
        Self { voxels: None }
    }

    /// Wrap a full voxel array
    pub fn from_voxels(voxels: Vec<Voxel>) -> Result<Self> {
        if voxels.len() != SECTION_VOLUME {
            return Err(TerrainError::SnapshotLength {
                expected: SECTION_VOLUME,
                actual: voxels.len(),
            });
        }
        Ok(Self::collapse(voxels.into_boxed_slice()))
    }

    /// Build a snapshot by evaluating every section-local position
    pub fn from_fn(mut voxel_at: impl FnMut(IVec3) -> Voxel) -> Self {
        let voxels: Box<[Voxel]> = (0..SECTION_VOLUME).map(|i| voxel_at(voxel_local(i))).collect();
        Self::collapse(voxels)
    }

    fn collapse(voxels: Box<[Voxel]>) -> Self {
        if voxels.iter().all(Voxel::is_passable) {
            Self::empty()
        } else {
            Self {
                voxels: Some(voxels),
            }
        }
    }

    /// Whether every voxel is passable
    pub fn is_empty(&self) -> bool {
        self.voxels.is_none()
    }

    /// Voxel at a section-local position, `None` outside the section
    pub fn get(&self, local: IVec3) -> Option<&Voxel> {
        if !is_section_local(local) {
            return None;
        }
        match &self.voxels {
            Some(voxels) => voxels.get(voxel_index(local)),
            None => Some(&PASSABLE),
        }
    }

    /// Non-passable voxels with their section-local positions, in index order
    pub fn occupied(&self) -> impl Iterator<Item = (IVec3, &Voxel)> + '_ {
        self.voxels
            .iter()
            .flat_map(|voxels| voxels.iter().enumerate())
            .filter(|(_, voxel)| !voxel.is_passable())
            .map(|(i, voxel)| (voxel_local(i), voxel))
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }
}
