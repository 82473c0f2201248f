//! Terrain collision settings
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! enabled = true
//! remove_in = 1.0
//! expand_velocity = 0.1
//! expand_constant = 1.0
//!
//! [layers]
//! default_solid = "solid"
//! default_fluid = "fluid"
//!
//! [layers.all.solid]
//! type = "solid"
//! friction = 0.4
//! restitution = 0.2
//!
//! [layers.all.fluid]
//! type = "fluid"
//! density = 1.0
//!
//! [layers.by_block]
//! # ice = "ice"
//! ```
//!
//! Giving `layers.all` replaces the default layer set, so both default keys
//! must name one of the layers listed there.

use crate::error::{Result, TerrainError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Key of the layer plain solid voxels land on by default
pub const DEFAULT_SOLID_LAYER: &str = "solid";
/// Key of the layer plain fluid voxels land on by default
pub const DEFAULT_FLUID_LAYER: &str = "fluid";

/// Settings for [`DynamicTerrain`](crate::terrain::DynamicTerrain)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// When false, physics steps leave terrain collision untouched
    pub enabled: bool,
    /// Seconds a section must stay unwanted before its colliders are destroyed
    pub remove_in: f64,
    /// How far ahead along a body's velocity (in seconds of travel) bounds are stretched
    pub expand_velocity: f32,
    /// Constant margin added around every body's bounds
    pub expand_constant: f32,
    pub layers: LayerSettings,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            remove_in: 1.0,
            expand_velocity: 0.1,
            expand_constant: 1.0,
            layers: LayerSettings::default(),
        }
    }
}

/// Collision layers and how voxels are routed to them
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayerSettings {
    /// Every layer, by key
    pub all: BTreeMap<String, Layer>,
    /// Layer of solid voxels without a block route
    pub default_solid: String,
    /// Layer of fluid voxels without a block route
    pub default_fluid: String,
    /// Block kind name to layer key
    pub by_block: BTreeMap<String, String>,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            all: BTreeMap::from([
                (
                    DEFAULT_SOLID_LAYER.to_owned(),
                    Layer::Solid {
                        friction: default_friction(),
                        restitution: default_restitution(),
                    },
                ),
                (
                    DEFAULT_FLUID_LAYER.to_owned(),
                    Layer::Fluid {
                        density: default_density(),
                    },
                ),
            ]),
            default_solid: DEFAULT_SOLID_LAYER.to_owned(),
            default_fluid: DEFAULT_FLUID_LAYER.to_owned(),
            by_block: BTreeMap::new(),
        }
    }
}

impl LayerSettings {
    /// Check layer materials and that every key refers to a configured layer
    pub fn validate(&self) -> Result<()> {
        for (key, layer) in &self.all {
            match *layer {
                Layer::Solid {
                    friction,
                    restitution,
                } => {
                    if !(friction >= 0.0 && friction.is_finite()) {
                        return Err(TerrainError::Settings(format!(
                            "layer '{key}': friction must be a finite value >= 0, got {friction}"
                        )));
                    }
                    if !(restitution >= 0.0 && restitution.is_finite()) {
                        return Err(TerrainError::Settings(format!(
                            "layer '{key}': restitution must be a finite value >= 0, got {restitution}"
                        )));
                    }
                }
                Layer::Fluid { density } => {
                    if !(density > 0.0 && density.is_finite()) {
                        return Err(TerrainError::Settings(format!(
                            "layer '{key}': density must be > 0, got {density}"
                        )));
                    }
                }
            }
        }

        for (role, key) in [
            ("default_solid", &self.default_solid),
            ("default_fluid", &self.default_fluid),
        ] {
            if !self.all.contains_key(key) {
                return Err(TerrainError::Settings(format!(
                    "{role}: no layer '{key}'"
                )));
            }
        }
        for (block, key) in &self.by_block {
            if !self.all.contains_key(key) {
                return Err(TerrainError::Settings(format!(
                    "by_block '{block}': no layer '{key}'"
                )));
            }
        }
        Ok(())
    }
}

/// Physics behaviour of one collision layer
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// Collidable terrain with a surface material
    Solid {
        #[serde(default = "default_friction")]
        friction: f32,
        #[serde(default = "default_restitution")]
        restitution: f32,
    },
    /// Sensor terrain that bodies pass through
    Fluid {
        #[serde(default = "default_density")]
        density: f32,
    },
}

fn default_friction() -> f32 {
    0.4
}

fn default_restitution() -> f32 {
    0.2
}

fn default_density() -> f32 {
    1.0
}

impl TerrainSettings {
    /// Parse and validate settings from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a TOML settings file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check value ranges and layer references
    pub fn validate(&self) -> Result<()> {
        if !(self.remove_in >= 0.0 && self.remove_in.is_finite()) {
            return Err(TerrainError::Settings(format!(
                "remove_in must be a finite value >= 0, got {}",
                self.remove_in
            )));
        }
        if !(self.expand_velocity >= 0.0) {
            return Err(TerrainError::Settings(format!(
                "expand_velocity must be >= 0, got {}",
                self.expand_velocity
            )));
        }
        if !(self.expand_constant >= 0.0) {
            return Err(TerrainError::Settings(format!(
                "expand_constant must be >= 0, got {}",
                self.expand_constant
            )));
        }
        self.layers.validate()
    }

    /// Removal delay as a duration
    pub fn removal_delay(&self) -> Duration {
        Duration::from_secs_f64(self.remove_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let settings = TerrainSettings::from_toml_str("").unwrap();
        assert_eq!(settings, TerrainSettings::default());
        assert_eq!(settings.removal_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_document() {
        let settings = TerrainSettings::from_toml_str(
            r#"
            remove_in = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(settings.remove_in, 2.5);
        assert_eq!(settings.layers, LayerSettings::default());
        assert!(settings.enabled);
    }

    #[test]
    fn test_custom_layers_and_block_routes() {
        let settings = TerrainSettings::from_toml_str(
            r#"
            [layers]
            default_solid = "ground"
            default_fluid = "water"

            [layers.all.ground]
            type = "solid"
            friction = 0.9

            [layers.all.ice]
            type = "solid"
            friction = 0.02
            restitution = 0.0

            [layers.all.water]
            type = "fluid"

            [layers.by_block]
            packed_ice = "ice"
            "#,
        )
        .unwrap();

        let layers = &settings.layers;
        assert_eq!(layers.all.len(), 3);
        assert_eq!(
            layers.all["ground"],
            Layer::Solid {
                friction: 0.9,
                restitution: 0.2
            }
        );
        assert_eq!(layers.all["water"], Layer::Fluid { density: 1.0 });
        assert_eq!(layers.by_block["packed_ice"], "ice");
    }

    #[test]
    fn test_rejects_missing_default_layer() {
        // Replacing the layer set drops "fluid", which is still the default
        let err = TerrainSettings::from_toml_str(
            r#"
            [layers.all.solid]
            type = "solid"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, TerrainError::Settings(msg) if msg.contains("default_fluid")));
    }

    #[test]
    fn test_rejects_block_route_to_unknown_layer() {
        let err = TerrainSettings::from_toml_str("[layers.by_block]\nslab = \"slabs\"").unwrap_err();
        assert!(matches!(err, TerrainError::Settings(msg) if msg.contains("slabs")));
    }

    #[test]
    fn test_rejects_negative_delay() {
        let err = TerrainSettings::from_toml_str("remove_in = -1.0").unwrap_err();
        assert!(matches!(err, TerrainError::Settings(_)));
    }

    #[test]
    fn test_rejects_non_positive_density() {
        let mut settings = TerrainSettings::default();
        settings
            .layers
            .all
            .insert(DEFAULT_FLUID_LAYER.to_owned(), Layer::Fluid { density: 0.0 });
        assert!(matches!(settings.validate(), Err(TerrainError::Settings(_))));
    }

    #[test]
    fn test_rejects_negative_friction() {
        let mut settings = TerrainSettings::default();
        settings.layers.all.insert(
            "ice".to_owned(),
            Layer::Solid {
                friction: -0.1,
                restitution: 0.0,
            },
        );
        assert!(matches!(settings.validate(), Err(TerrainError::Settings(_))));
    }

    #[test]
    fn test_rejects_negative_expansion() {
        let err = TerrainSettings::from_toml_str("expand_constant = -0.5").unwrap_err();
        assert!(matches!(err, TerrainError::Settings(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = TerrainSettings::from_toml_str("remove_in = \"soon\"").unwrap_err();
        assert!(matches!(err, TerrainError::Toml(_)));
    }
}
