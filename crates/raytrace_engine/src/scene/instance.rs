//! Geometry instances

use slotmap::new_key_type;

use super::geometry::GeometryKey;
use crate::foundation::math::Mat4;

new_key_type! {
    /// Stable handle to a submitted instance
    pub struct InstanceKey;
}

/// Visibility mask that hits every ray type
pub const MASK_ALL: u8 = 0xFF;

/// Placement of a geometry in the scene
///
/// Holds a weak reference to its geometry; removing the geometry removes the
/// instance too.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryInstance {
    /// Referenced geometry
    pub geometry: GeometryKey,
    /// Object-to-world transform
    pub transform: Mat4,
    /// Ray visibility mask
    pub mask: u8,
}

impl GeometryInstance {
    /// Visible instance of `geometry`
    pub fn new(geometry: GeometryKey, transform: Mat4) -> Self {
        Self {
            geometry,
            transform,
            mask: MASK_ALL,
        }
    }
}
