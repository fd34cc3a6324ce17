//! Acceleration structures
//!
//! Per-object (bottom-level) and scene-wide (top-level) spatial indices.

pub mod builder;
pub mod per_object;
pub mod scene_index;

pub use builder::{BuilderStats, PendingPerObjectBuild, SpatialIndexBuilder};
pub use per_object::{describe_per_object, PerObjectDescriptor, PerObjectSlot, SlotState};
pub use scene_index::{EncodedInstance, InstanceFlags, SceneBuildMode, SceneInstance};
