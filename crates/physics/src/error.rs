//! Error types for dynamic terrain collision

use glam::IVec2;
use thiserror::Error;

/// Result type for terrain operations
pub type Result<T> = std::result::Result<T, TerrainError>;

/// Errors raised by the terrain engine itself
#[derive(Error, Debug)]
pub enum TerrainError {
    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// Settings file could not be parsed
    #[error("Settings parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Settings file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A voxel carried geometry that cannot be turned into a collider
    #[error("Invalid shape for voxel {index}: {reason}")]
    InvalidVoxelShape { index: usize, reason: String },

    /// A snapshot did not cover exactly one section
    #[error("Snapshot length mismatch: expected {expected}, got {actual}")]
    SnapshotLength { expected: usize, actual: usize },
}

/// Failures reported by the world side while capturing a snapshot
///
/// Both variants are transient: the section stays pending and is requested
/// again on a later step while it is still wanted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    /// The horizontal region holding the section is not loaded
    #[error("Region {region} is not loaded")]
    RegionUnavailable { region: IVec2 },

    /// Any other world-side failure
    #[error("Snapshot failed: {0}")]
    Failed(String),
}
