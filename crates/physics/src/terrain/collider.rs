//! Collision synthesis from voxel snapshots
//!
//! A snapshot is turned into at most one compound collider per layer. Voxels
//! are assigned to layers by the [`LayerTable`]. Every
//! compound child is a cuboid from the [`ShapeCache`]: full voxels share the
//! unit cuboid, irregular voxels are decomposed into cached cuboids.
//!
//! Synthesis runs in two passes. [`CollisionSynthesizer::plan`] validates the
//! snapshot and lays out parts without touching the cache's reference counts,
//! so a failing snapshot never leaks references. [`CollisionSynthesizer::build`]
//! then acquires one reference per part and registers the colliders.

use super::layer::{LayerKey, LayerTable};
use super::section::{ColliderGroup, Layers, SectionCoord};
use super::shape_cache::{CompoundPart, ShapeCache, ShapeKey};
use super::snapshot::{voxel_index, VoxelSnapshot};
use super::voxel::{VoxelBox, VoxelShape};
use crate::error::{Result, TerrainError};
use crate::settings::Layer;
use crate::space::PhysicsSpace;
use glam::{IVec3, Vec3};
use rapier3d::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One compound child: a cached cuboid placed inside the section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Part {
    /// Cuboid center relative to the section origin
    pub offset: Vec3,
    pub key: ShapeKey,
}

/// Ordered parts of one layer
pub type LayerPlan = Vec<Part>;

/// Layout of a whole section, by layer. Layers without parts are absent.
pub type SectionPlan = BTreeMap<LayerKey, LayerPlan>;

/// Builds section colliders and owns the shape cache they draw from
#[derive(Debug)]
pub struct CollisionSynthesizer {
    cache: ShapeCache,
    layers: LayerTable,
}

impl CollisionSynthesizer {
    pub fn new(layers: LayerTable) -> Self {
        Self {
            cache: ShapeCache::new(),
            layers,
        }
    }

    pub fn shape_cache(&self) -> &ShapeCache {
        &self.cache
    }

    pub fn layers(&self) -> &LayerTable {
        &self.layers
    }

    /// Lay out the compound parts of every layer of a snapshot
    ///
    /// # Errors
    /// [`TerrainError::InvalidVoxelShape`] if a voxel carries boxes that are
    /// empty, inverted, non-finite or outside the unit cell.
    pub fn plan(&mut self, snapshot: &VoxelSnapshot) -> Result<SectionPlan> {
        let mut plan = SectionPlan::new();

        for (local, voxel) in snapshot.occupied() {
            let Some((layer, shape)) = self.layers.route(voxel) else {
                continue;
            };
            if self.layers.get(layer).is_none() {
                return Err(TerrainError::Settings(format!("no layer '{layer}'")));
            }
            let center = local.as_vec3() + Vec3::splat(0.5);
            let parts = plan.entry(layer.clone()).or_default();

            match shape {
                VoxelShape::Full => parts.push(Part {
                    offset: center,
                    key: ShapeKey::unit(),
                }),
                VoxelShape::Boxes(boxes) => {
                    validate_boxes(local, boxes)?;
                    let decomposed: Arc<[CompoundPart]> = self.cache.decompose(boxes);
                    parts.extend(decomposed.iter().map(|part| Part {
                        offset: center + part.offset,
                        key: part.key,
                    }));
                }
            }
        }

        plan.retain(|_, parts| !parts.is_empty());
        Ok(plan)
    }

    /// Synthesize and register the colliders of one section
    ///
    /// Each non-empty layer becomes one compound collider anchored at the
    /// section origin, with the material of its layer. Solid layers collide
    /// and report collision events; fluid layers are sensors.
    pub fn build(
        &mut self,
        coord: SectionCoord,
        snapshot: &VoxelSnapshot,
        space: &mut impl PhysicsSpace,
    ) -> Result<Layers> {
        let plan = self.plan(snapshot)?;
        let origin = coord.origin();
        let mut layers = Layers::new();

        for (key, parts) in plan {
            let Some(&layer) = self.layers.get(&key) else {
                continue;
            };
            let mut group = ColliderGroup::default();
            let mut children = Vec::with_capacity(parts.len());

            for part in &parts {
                let shape = self.cache.acquire(part.key);
                children.push((
                    Isometry::translation(part.offset.x, part.offset.y, part.offset.z),
                    shape.shape().clone(),
                ));
                group.shapes.push(shape);
            }

            let collider = material(layer, ColliderBuilder::compound(children))
                .translation(vector![origin.x, origin.y, origin.z])
                .build();
            group.colliders.push(space.add_collider(collider));

            tracing::trace!(section = %coord, layer = %key, parts = parts.len(), "built layer");
            layers.insert(key, group);
        }

        Ok(layers)
    }

    /// Remove every collider of `layers`, then hand back their shape references
    pub fn release_layers(&mut self, layers: Layers, space: &mut impl PhysicsSpace) {
        for group in layers.values() {
            for &handle in &group.colliders {
                space.remove_collider(handle);
            }
        }
        for group in layers.into_values() {
            for shape in group.shapes {
                self.cache.release(shape);
            }
        }
    }

    /// Tear down the shape cache, returning the number of leaked shapes
    pub fn destroy(&mut self) -> usize {
        self.cache.destroy()
    }
}

fn material(layer: Layer, builder: ColliderBuilder) -> ColliderBuilder {
    match layer {
        Layer::Solid {
            friction,
            restitution,
        } => builder
            .friction(friction)
            .restitution(restitution)
            .active_events(ActiveEvents::COLLISION_EVENTS),
        Layer::Fluid { density } => builder.sensor(true).density(density),
    }
}

fn validate_boxes(local: IVec3, boxes: &[VoxelBox]) -> Result<()> {
    let invalid = |reason: String| TerrainError::InvalidVoxelShape {
        index: voxel_index(local),
        reason,
    };

    if boxes.is_empty() {
        return Err(invalid("no boxes".into()));
    }
    for b in boxes {
        if !(b.min.is_finite() && b.max.is_finite()) {
            return Err(invalid(format!("non-finite box {b:?}")));
        }
        if b.min.cmpge(b.max).any() {
            return Err(invalid(format!("box without volume {b:?}")));
        }
        if b.min.cmplt(Vec3::ZERO).any() || b.max.cmpgt(Vec3::ONE).any() {
            return Err(invalid(format!("box outside the voxel {b:?}")));
        }
    }
    Ok(())
}
