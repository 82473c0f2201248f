//! Named collision layers
//!
//! Every built section holds at most one collider per layer. Plain solid and
//! fluid voxels go to the default layers; block voxels may be routed to a
//! layer of their own with its own material.

use super::voxel::{Matter, Voxel, VoxelShape};
use crate::error::Result;
use crate::settings::{Layer, LayerSettings};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Key of a configured layer
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct LayerKey(Arc<str>);

impl LayerKey {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated layer settings, indexed for routing voxels
#[derive(Debug, Clone)]
pub struct LayerTable {
    layers: BTreeMap<LayerKey, Layer>,
    default_solid: LayerKey,
    default_fluid: LayerKey,
    by_block: HashMap<Arc<str>, LayerKey>,
}

impl LayerTable {
    /// Validate `settings` and index them
    ///
    /// # Errors
    /// [`TerrainError::Settings`](crate::TerrainError::Settings) if a default
    /// or block route names an unknown layer, or a layer material is invalid.
    pub fn new(settings: &LayerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::index(settings))
    }

    fn index(settings: &LayerSettings) -> Self {
        Self {
            layers: settings
                .all
                .iter()
                .map(|(key, layer)| (LayerKey::new(key), *layer))
                .collect(),
            default_solid: LayerKey::new(&settings.default_solid),
            default_fluid: LayerKey::new(&settings.default_fluid),
            by_block: settings
                .by_block
                .iter()
                .map(|(block, key)| (Arc::from(block.as_str()), LayerKey::new(key)))
                .collect(),
        }
    }

    pub fn get(&self, key: &LayerKey) -> Option<&Layer> {
        self.layers.get(key)
    }

    pub fn default_solid(&self) -> &LayerKey {
        &self.default_solid
    }

    pub fn default_fluid(&self) -> &LayerKey {
        &self.default_fluid
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer and geometry of a voxel, `None` for passable voxels
    pub fn route<'v>(&self, voxel: &'v Voxel) -> Option<(&LayerKey, &'v VoxelShape)> {
        match voxel {
            Voxel::Passable => None,
            Voxel::Solid(shape) => Some((&self.default_solid, shape)),
            Voxel::Fluid(shape) => Some((&self.default_fluid, shape)),
            Voxel::Block {
                kind,
                matter,
                shape,
            } => {
                let key = self
                    .by_block
                    .get(kind.as_str())
                    .unwrap_or(match matter {
                        Matter::Solid => &self.default_solid,
                        Matter::Fluid => &self.default_fluid,
                    });
                Some((key, shape))
            }
        }
    }
}

impl Default for LayerTable {
    fn default() -> Self {
        Self::index(&LayerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DEFAULT_FLUID_LAYER, DEFAULT_SOLID_LAYER};
    use crate::TerrainError;

    fn with_ice() -> LayerSettings {
        let mut settings = LayerSettings::default();
        settings.all.insert(
            "ice".to_owned(),
            Layer::Solid {
                friction: 0.02,
                restitution: 0.0,
            },
        );
        settings.by_block.insert("packed_ice".to_owned(), "ice".to_owned());
        settings
    }

    #[test]
    fn test_default_table_has_solid_and_fluid() {
        let table = LayerTable::default();

        assert_eq!(table.len(), 2);
        assert_eq!(table.default_solid().as_str(), DEFAULT_SOLID_LAYER);
        assert_eq!(table.default_fluid().as_str(), DEFAULT_FLUID_LAYER);
        assert!(matches!(table.get(table.default_fluid()), Some(Layer::Fluid { .. })));
    }

    #[test]
    fn test_plain_voxels_use_default_layers() {
        let table = LayerTable::default();

        let (key, _) = table.route(&Voxel::Solid(VoxelShape::Full)).unwrap();
        assert_eq!(key, table.default_solid());
        let (key, _) = table.route(&Voxel::Fluid(VoxelShape::Full)).unwrap();
        assert_eq!(key, table.default_fluid());
        assert!(table.route(&Voxel::Passable).is_none());
    }

    #[test]
    fn test_block_route_overrides_default() {
        let table = LayerTable::new(&with_ice()).unwrap();

        let ice = Voxel::block("packed_ice", Matter::Solid, VoxelShape::Full);
        assert_eq!(table.route(&ice).unwrap().0.as_str(), "ice");

        // Unrouted kinds fall back to the default layer of their matter
        let stone = Voxel::block("stone", Matter::Solid, VoxelShape::Full);
        assert_eq!(table.route(&stone).unwrap().0, table.default_solid());
        let lava = Voxel::block("lava", Matter::Fluid, VoxelShape::Full);
        assert_eq!(table.route(&lava).unwrap().0, table.default_fluid());
    }

    #[test]
    fn test_new_rejects_dangling_route() {
        let mut settings = with_ice();
        settings.by_block.insert("slab".to_owned(), "slabs".to_owned());

        assert!(matches!(LayerTable::new(&settings), Err(TerrainError::Settings(_))));
    }

    #[test]
    fn test_new_rejects_unknown_default() {
        let settings = LayerSettings {
            default_solid: "ground".to_owned(),
            ..LayerSettings::default()
        };

        assert!(matches!(LayerTable::new(&settings), Err(TerrainError::Settings(_))));
    }
}
