//! Per-frame uniform block
//!
//! Written into the current ring slot's uniform buffer once that slot's
//! completion signal was awaited.

use crate::core::RenderFeatures;
use crate::foundation::math::{Mat4Ext, Mat4};
use crate::scene::lights::GpuLightBlock;
use crate::scene::{Camera, EnvironmentMap};

/// Uniform block read by the trace shaders
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FrameUniforms {
    /// Inverse view matrix (camera to world)
    pub view_inverse: [[f32; 4]; 4],
    /// Inverse projection matrix
    pub projection_inverse: [[f32; 4]; 4],
    /// xyz camera position, w = vertical field of view in radians
    pub camera_position: [f32; 4],
    /// Scene lights
    pub lights: GpuLightBlock,
    /// Monotonic frame number (low 32 bits), seeds the sampler
    pub frame_index: u32,
    /// Frames accumulated into the output so far, 0 restarts accumulation
    pub accumulated_frames: u32,
    /// Maximum path depth
    pub max_path_depth: u32,
    /// Samples per pixel this frame
    pub samples_per_pixel: u32,
    /// Environment radiance scale, 0 without an environment
    pub environment_intensity: f32,
    /// 1 when an environment map is bound
    pub has_environment: u32,
    /// Padding to 16-byte alignment
    pub _padding: [u32; 2],
}

unsafe impl bytemuck::Pod for FrameUniforms {}
unsafe impl bytemuck::Zeroable for FrameUniforms {}

impl FrameUniforms {
    /// Size of the block in bytes
    pub const SIZE: u64 = std::mem::size_of::<FrameUniforms>() as u64;

    /// Assemble the block for one frame
    pub fn new(
        camera: &Camera,
        aspect: f32,
        lights: GpuLightBlock,
        environment: Option<&EnvironmentMap>,
        features: &RenderFeatures,
        frame_number: u64,
        accumulated_frames: u32,
    ) -> Self {
        let view: Mat4 = camera.view_matrix();
        let projection: Mat4 = camera.projection_matrix(aspect);
        let p = camera.position;

        Self {
            view_inverse: view.inverse_or_identity().to_cols_array(),
            projection_inverse: projection.inverse_or_identity().to_cols_array(),
            camera_position: [p.x, p.y, p.z, camera.fov_y],
            lights,
            frame_index: frame_number as u32,
            accumulated_frames: if features.accumulate_frames { accumulated_frames } else { 0 },
            max_path_depth: features.max_path_depth,
            samples_per_pixel: features.samples_per_pixel,
            environment_intensity: environment.map_or(0.0, |e| e.intensity),
            has_environment: u32::from(environment.is_some()),
            _padding: [0; 2],
        }
    }

    /// Raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
