//! Backend implementations for the render module
//!
//! Currently only Vulkan is supported. The host-memory
//! [`HeadlessBackend`](crate::device::HeadlessBackend) lives with the device trait.

/// Vulkan rendering backend implementation
pub mod vulkan;
