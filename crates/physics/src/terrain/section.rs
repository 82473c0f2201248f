//! Section coordinates and per-section state
//!
//! A section is a fixed-size cube of the voxel world and the unit in which
//! terrain collision is generated and retired.

use super::layer::LayerKey;
use super::shape_cache::ShapeRef;
use super::snapshot::VoxelSnapshot;
use crate::bounds::Aabb;
use glam::{IVec2, IVec3, Vec3};
use rapier3d::prelude::ColliderHandle;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Edge length of a section, in voxels and world units
pub const SECTION_SIZE: i32 = 16;

/// Number of voxels in one section
pub const SECTION_VOLUME: usize = (SECTION_SIZE * SECTION_SIZE * SECTION_SIZE) as usize;

/// Integer coordinate of a section (world position divided by [`SECTION_SIZE`])
///
/// Ordered lexicographically by `(x, y, z)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SectionCoord(pub IVec3);

impl Ord for SectionCoord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.to_array().cmp(&other.0.to_array())
    }
}

impl PartialOrd for SectionCoord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl SectionCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self(IVec3::new(x, y, z))
    }

    /// Section holding a world-space point
    pub fn containing(point: Vec3) -> Self {
        Self((point / SECTION_SIZE as f32).floor().as_ivec3())
    }

    /// World-space minimum corner
    pub fn origin(&self) -> Vec3 {
        (self.0 * SECTION_SIZE).as_vec3()
    }

    /// World-space bounds of the whole section
    pub fn bounds(&self) -> Aabb {
        let origin = self.origin();
        Aabb::new(origin, origin + Vec3::splat(SECTION_SIZE as f32))
    }

    /// Horizontal region (column) this section belongs to
    pub fn region(&self) -> IVec2 {
        IVec2::new(self.0.x, self.0.z)
    }

    /// Every section touched by `bounds`
    ///
    /// Both edges are inclusive: a box ending exactly on a section boundary
    /// also covers the section on the far side of it.
    pub fn enclosing(bounds: &Aabb) -> impl Iterator<Item = SectionCoord> {
        let min = Self::containing(bounds.min).0;
        let max = Self::containing(bounds.max).0;

        (min.x..=max.x).flat_map(move |x| {
            (min.y..=max.y)
                .flat_map(move |y| (min.z..=max.z).map(move |z| SectionCoord::new(x, y, z)))
        })
    }
}

impl fmt::Display for SectionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}

/// Generation number of one snapshot request
///
/// A delivery is only accepted by a section still waiting on the same ticket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Ticket(pub u64);

/// Colliders of one layer of one section, with the shape references they hold
#[derive(Debug, Default)]
pub struct ColliderGroup {
    pub colliders: Vec<ColliderHandle>,
    pub shapes: Vec<ShapeRef>,
}

/// Built collision of a section, by layer
pub type Layers = BTreeMap<LayerKey, ColliderGroup>;

/// Lifecycle state of a section
#[derive(Debug)]
pub enum SectionState {
    /// Wanted, no voxel data yet. Holds the ticket of the request in flight,
    /// or `None` when a request still has to be issued.
    Pending { request: Option<Ticket> },
    /// Voxel data arrived and awaits synthesis
    Snapshot(Arc<VoxelSnapshot>),
    /// Colliders registered in the physics space
    Built(Layers),
}

impl SectionState {
    pub fn is_pending(&self) -> bool {
        matches!(self, SectionState::Pending { .. })
    }

    pub fn is_built(&self) -> bool {
        matches!(self, SectionState::Built(_))
    }
}

/// One entry of the section registry
#[derive(Debug)]
pub struct Section {
    pub state: SectionState,
    /// Deadline after which an unwanted section is destroyed
    pub retire_at: Option<Instant>,
    /// Colliders of the previous build, kept live while a rebuild is in flight
    pub superseded: Option<Layers>,
}

impl Section {
    pub fn pending() -> Self {
        Self {
            state: SectionState::Pending { request: None },
            retire_at: None,
            superseded: None,
        }
    }

    /// A section that never gets data and holds no colliders
    pub fn empty() -> Self {
        Self {
            state: SectionState::Built(Layers::new()),
            retire_at: None,
            superseded: None,
        }
    }

    /// Number of colliders this section currently owns in the physics space
    pub fn collider_count(&self) -> usize {
        let built = match &self.state {
            SectionState::Built(layers) => count_colliders(layers),
            _ => 0,
        };
        built + self.superseded.as_ref().map_or(0, count_colliders)
    }
}

fn count_colliders(layers: &Layers) -> usize {
    layers.values().map(|group| group.colliders.len()).sum()
}
