//! Placeholder keeping an empty scene buildable
//!
//! A scene-wide index over zero instances is rejected by the build API, so
//! while the user has no instances the manager keeps one placeholder instance
//! of a near-zero-area triangle in the list. The placeholder sits behind the
//! camera along its view axis, has an empty visibility mask and follows the
//! camera every frame.

use super::camera::Camera;
use super::geometry::{MeshData, Vertex};
use super::material::Material;
use crate::foundation::math::Mat4;

/// Distance behind the camera
pub const PLACEHOLDER_OFFSET: f32 = 10.0;

/// Edge length of the placeholder triangle
const PLACEHOLDER_EDGE: f32 = 1e-4;

/// Visibility mask no ray carries
pub const PLACEHOLDER_MASK: u8 = 0x00;

/// Degenerate-scene state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegenerateState {
    /// The instance list holds user instances only
    #[default]
    Populated,
    /// The instance list holds exactly the placeholder
    DummyInjected,
}

/// Mesh of the placeholder geometry
pub fn placeholder_mesh() -> MeshData {
    let normal = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex::new([0.0, 0.0, 0.0], normal, [0.0, 0.0]),
        Vertex::new([PLACEHOLDER_EDGE, 0.0, 0.0], normal, [1.0, 0.0]),
        Vertex::new([0.0, PLACEHOLDER_EDGE, 0.0], normal, [0.0, 1.0]),
    ];
    MeshData::new("placeholder", vertices, vec![0, 1, 2], Material::default())
}

/// Transform of the placeholder for a camera pose
pub fn placeholder_transform(camera: &Camera) -> Mat4 {
    Mat4::new_translation(&(camera.position - camera.forward * PLACEHOLDER_OFFSET))
}
