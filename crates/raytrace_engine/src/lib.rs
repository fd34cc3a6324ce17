//! # Raytrace Engine
//!
//! Real-time ray tracing core: turns a mutable scene into the two-level
//! spatial index a ray tracing device consumes, and keeps that index and its
//! buffers consistent while frames are in flight.
//!
//! ## Layers
//!
//! - [`scene`]: geometries, instances, materials and lights with dirty tracking
//! - [`accel`]: per-object and scene-wide index builds, compaction and refit
//! - [`render`]: frame synchronization, uniforms, submission and presentation
//! - [`device`]: the backend seam, with a Vulkan and a headless implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use raytrace_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let backend = HeadlessBackend::new();
//!     let target = OffscreenTarget::new(640, 480);
//!     let mut renderer = Renderer::new(&config, backend, target)?;
//!
//!     let camera = Camera::default();
//!     renderer.render_frame(&camera)?;
//!     renderer.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;
pub mod config;
pub mod foundation;

pub mod accel;
pub mod device;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        accel::{SceneBuildMode, SpatialIndexBuilder},
        core::{Config, RenderFeatures, RendererConfig, SceneLimits},
        device::{DeviceBackend, HeadlessBackend},
        foundation::math::{Mat4, Vec3, Vec4},
        render::{FrameReport, OffscreenTarget, PresentationTarget, RenderError, Renderer, VulkanBackend},
        scene::{
            Camera, DirectionalLight, GeometryFlags, GeometryKey, InstanceKey, Material, MeshData, PointLight,
            SceneError, SceneResourceManager, Vertex,
        },
    };
}
