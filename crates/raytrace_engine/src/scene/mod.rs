//! Scene model and resource management
//!
//! Host-side scene contents (geometries, instances, materials, textures,
//! lights, environment) and the [`SceneResourceManager`] that turns them into
//! device resources.
//!
//! ## Architecture
//!
//! ```text
//! Application mutations
//!      ↓
//! SceneResourceManager (dirty flags, capacity checks, placeholder)
//!      ↓  resolve()
//! SpatialIndexBuilder + DeviceBackend
//!      ↓
//! SceneBindings (read by the trace pass)
//! ```

pub mod allocator;
pub mod bindings;
pub mod camera;
pub mod degenerate;
pub mod environment;
pub mod error;
pub mod geometry;
pub mod instance;
pub mod lights;
pub mod material;
pub mod release;
pub mod resource_manager;

#[cfg(test)]
mod tests;

pub use bindings::{GpuGeometryRecord, SceneBindings};
pub use camera::Camera;
pub use degenerate::DegenerateState;
pub use environment::{EnvironmentMap, ImageData};
pub use error::{ResourceKind, SceneError, SceneResult};
pub use geometry::{Geometry, GeometryFlags, GeometryKey, MeshData, Submesh, Vertex};
pub use instance::{GeometryInstance, InstanceKey};
pub use lights::{ActiveLight, DirectionalLight, Light, LightSet, PointLight};
pub use material::Material;
pub use resource_manager::{ResolveReport, SceneResourceManager, SceneStats};
