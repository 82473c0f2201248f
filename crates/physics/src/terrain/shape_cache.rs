//! Reference-counted cache of baked collision shapes
//!
//! Every voxel part of a built section holds one [`ShapeRef`] acquired from
//! the cache. The cache keeps one reference of its own per entry, so a shape
//! used by `n` live parts has a count of `n + 1`. Only at teardown does the
//! cache give up its hold, and only for entries nobody else still references.

use super::voxel::VoxelBox;
use glam::Vec3;
use rapier3d::prelude::SharedShape;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Resolution at which shape dimensions are compared, in voxel units
pub const SHAPE_QUANTUM: f32 = 1.0 / 1024.0;

fn quantize(value: f32) -> u32 {
    (value / SHAPE_QUANTUM).round() as u32
}

/// Identity of a cached cuboid: its half extents, quantized
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ShapeKey {
    half_extents: [u32; 3],
}

impl ShapeKey {
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self {
            half_extents: [
                quantize(half_extents.x),
                quantize(half_extents.y),
                quantize(half_extents.z),
            ],
        }
    }

    /// The shape of a voxel that fills its whole cell
    pub fn unit() -> Self {
        Self::cuboid(Vec3::splat(0.5))
    }

    pub fn half_extents(&self) -> Vec3 {
        Vec3::new(
            self.half_extents[0] as f32,
            self.half_extents[1] as f32,
            self.half_extents[2] as f32,
        ) * SHAPE_QUANTUM
    }
}

/// One cuboid of a voxel's decomposition
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct CompoundPart {
    /// Offset of the cuboid center from the voxel center
    pub offset: Vec3,
    pub key: ShapeKey,
}

/// Exact box layout of an irregular voxel
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct BoxSignature(Vec<[u32; 6]>);

impl BoxSignature {
    fn of(boxes: &[VoxelBox]) -> Self {
        Self(
            boxes
                .iter()
                .map(|b| {
                    [
                        quantize(b.min.x),
                        quantize(b.min.y),
                        quantize(b.min.z),
                        quantize(b.max.x),
                        quantize(b.max.y),
                        quantize(b.max.z),
                    ]
                })
                .collect(),
        )
    }
}

/// Baked geometry shared between sections
pub struct BakedShape {
    key: ShapeKey,
    shape: SharedShape,
    refs: AtomicUsize,
}

impl fmt::Debug for BakedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BakedShape")
            .field("key", &self.key)
            .field("refs", &self.refs.load(Ordering::Relaxed))
            .finish()
    }
}

/// One acquired reference to a cached shape
///
/// Not `Clone`: every reference is taken with [`ShapeCache::acquire`] and
/// handed back with [`ShapeCache::release`].
#[derive(Debug)]
pub struct ShapeRef(Arc<BakedShape>);

impl ShapeRef {
    pub fn key(&self) -> ShapeKey {
        self.0.key
    }

    pub fn shape(&self) -> &SharedShape {
        &self.0.shape
    }

    /// Current reference count, including the cache's own hold
    pub fn ref_count(&self) -> usize {
        self.0.refs.load(Ordering::Acquire)
    }

    /// Whether two references point at the same baked shape
    pub fn same_shape(&self, other: &ShapeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Cache of baked shapes keyed by geometry
#[derive(Debug, Default)]
pub struct ShapeCache {
    shapes: HashMap<ShapeKey, Arc<BakedShape>>,
    compounds: HashMap<BoxSignature, Arc<[CompoundPart]>>,
    acquired: u64,
    released: u64,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference to the shape for `key`, baking it on first use
    pub fn acquire(&mut self, key: ShapeKey) -> ShapeRef {
        let baked = self.shapes.entry(key).or_insert_with(|| {
            let half = key.half_extents();
            tracing::trace!(?key, "baking cuboid shape");
            Arc::new(BakedShape {
                key,
                shape: SharedShape::cuboid(half.x, half.y, half.z),
                refs: AtomicUsize::new(1),
            })
        });
        baked.refs.fetch_add(1, Ordering::AcqRel);
        self.acquired += 1;
        ShapeRef(Arc::clone(baked))
    }

    /// Hand back a reference taken with [`acquire`](Self::acquire)
    pub fn release(&mut self, shape: ShapeRef) {
        let key = shape.key();
        let cached = self
            .shapes
            .get(&key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &shape.0));
        // While cached, the count may never fall onto the cache's own hold
        let floor = if cached { 1 } else { 0 };

        let prev = shape.0.refs.fetch_sub(1, Ordering::AcqRel);
        if prev <= floor {
            debug_assert!(
                false,
                "shape {key:?} released more often than acquired (count was {prev})"
            );
            tracing::error!(?key, prev, "shape released more often than acquired");
            shape.0.refs.fetch_add(1, Ordering::AcqRel);
            return;
        }
        self.released += 1;
    }

    /// Cuboid decomposition of an irregular voxel, cached by its exact box layout
    ///
    /// Boxes must already be validated to lie inside the unit cell.
    pub fn decompose(&mut self, boxes: &[VoxelBox]) -> Arc<[CompoundPart]> {
        let signature = BoxSignature::of(boxes);
        Arc::clone(self.compounds.entry(signature).or_insert_with(|| {
            boxes
                .iter()
                .map(|b| CompoundPart {
                    offset: (b.min + b.max) * 0.5 - Vec3::splat(0.5),
                    key: ShapeKey::cuboid((b.max - b.min) * 0.5),
                })
                .collect()
        }))
    }

    /// Reference count of a cached shape, including the cache's own hold
    pub fn ref_count(&self, key: ShapeKey) -> Option<usize> {
        self.shapes
            .get(&key)
            .map(|baked| baked.refs.load(Ordering::Acquire))
    }

    /// Number of distinct baked shapes
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Total references taken over the cache's lifetime
    pub fn acquired(&self) -> u64 {
        self.acquired
    }

    /// Total references handed back over the cache's lifetime
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Drop the cache's hold on every shape nobody else references
    ///
    /// Shapes still referenced elsewhere are reported and left alive: freeing
    /// them would pull geometry out from under a live collider. Returns the
    /// number of such leaked shapes.
    pub fn destroy(&mut self) -> usize {
        let mut leaked = 0;
        for (key, baked) in self.shapes.drain() {
            let refs = baked.refs.load(Ordering::Acquire);
            if refs == 1 {
                baked.refs.store(0, Ordering::Release);
            } else {
                leaked += 1;
                tracing::warn!(
                    ?key,
                    outstanding = refs - 1,
                    "cached shape still referenced at teardown; a section failed to release it"
                );
            }
        }
        self.compounds.clear();
        leaked
    }
}
