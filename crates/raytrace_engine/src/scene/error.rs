//! Scene API errors

use std::fmt;

use thiserror::Error;

/// Kind of a capacity-bounded scene resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// User geometries
    Geometry,
    /// User instances
    Instance,
    /// Unique materials
    Material,
    /// Unique textures
    Texture,
    /// Point lights
    PointLight,
    /// Projector lights
    ActiveLight,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Geometry => "geometry",
            ResourceKind::Instance => "instance",
            ResourceKind::Material => "material",
            ResourceKind::Texture => "texture",
            ResourceKind::PointLight => "point light",
            ResourceKind::ActiveLight => "active light",
        };
        f.write_str(name)
    }
}

/// Errors raised synchronously by scene mutations
#[derive(Debug, Error)]
pub enum SceneError {
    /// A bounded table is full; the submission was not applied
    #[error("{resource} capacity of {limit} exceeded")]
    CapacityExceeded {
        /// Which table is full
        resource: ResourceKind,
        /// Configured capacity
        limit: usize,
    },

    /// A key does not name a live user object
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Mesh data failed validation
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// An image could not be loaded
    #[error("Failed to load texture '{path}': {reason}")]
    TextureLoad {
        /// Source path (or `<memory>`)
        path: String,
        /// Decoder message
        reason: String,
    },
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
