//! Vulkan backend implementation
//!
//! Headless ray tracing device over `VK_KHR_acceleration_structure`. Organized
//! into context setup, resource wrappers and the [`DeviceBackend`](crate::device::DeviceBackend)
//! implementation.

/// Instance, device selection and logical device
pub mod context;

/// Device-addressable buffers
pub mod buffer;

/// Fences, semaphores and frame completion signals
pub mod sync;

/// Command pool and one-time submissions
pub mod commands;

/// Sampled textures and the trace output image
pub mod texture;

/// Acceleration structures and compaction queries
pub mod acceleration;

/// Main backend implementation
pub mod backend;

pub use backend::{ClearRecorder, TraceFrame, TraceRecorder, VulkanBackend};
pub use context::{PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanResult};
