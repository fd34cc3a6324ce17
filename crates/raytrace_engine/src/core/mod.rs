//! # Core Engine Module
//!
//! Shared configuration consumed by the scene, acceleration-structure and
//! frame-pacing layers.

pub mod config;

// Re-export commonly used config types
pub use config::{
    RendererConfig,
    SceneLimits,
    RenderFeatures,
    OutputExtent,
};
pub use crate::config::{Config, ConfigError};
