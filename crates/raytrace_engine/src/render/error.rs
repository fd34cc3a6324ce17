//! Frame-loop error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::render::backends::vulkan::VulkanError;
use crate::scene::SceneError;

/// Errors surfaced by the renderer
///
/// Scene errors come from configuration of the scene itself; everything else
/// is fatal for the frame loop.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Scene API rejected a request
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Device call failed
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Vulkan setup failed before a device existed
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Renderer used after shutdown
    #[error("Renderer has been shut down")]
    ShutDown,
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
