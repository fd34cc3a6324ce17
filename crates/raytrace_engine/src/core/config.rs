//! # Renderer Configuration
//!
//! Configuration for the ray tracing core: capacity limits for the scene
//! model, feature toggles for the trace pass and frame pacing parameters.
//!
//! ## Configuration Categories
//!
//! - **Scene Limits**: hard capacities checked at submission time
//! - **Render Features**: accumulation, path depth, sample rate, refresh requests
//! - **Renderer Config**: application metadata, frames in flight, output extent

use serde::{Serialize, Deserialize};

use crate::config::{Config, ConfigError};
use crate::scene::lights::{MAX_ACTIVE_LIGHTS, MAX_POINT_LIGHTS};

/// # Scene Limits
///
/// Capacity limits for every bounded table owned by the scene resource
/// manager. Submissions beyond these limits are rejected with an explicit
/// error; nothing is silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneLimits {
    /// Maximum number of user geometries (the degenerate placeholder is not counted)
    pub max_geometries: usize,
    /// Maximum number of user instances
    pub max_instances: usize,
    /// Maximum number of unique materials submitted since the last scene clear
    ///
    /// Interned materials stay allocated when the geometries using them are
    /// removed; only `clear_scene` frees their slots.
    pub max_materials: usize,
    /// Maximum number of unique textures
    pub max_textures: usize,
    /// Maximum number of point lights
    pub max_point_lights: usize,
    /// Maximum number of projector ("active") lights
    pub max_active_lights: usize,
}

impl SceneLimits {
    /// Validate the limits against the fixed light-array sizes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_geometries == 0 {
            return Err(ConfigError::Invalid {
                field: "max_geometries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_instances == 0 {
            return Err(ConfigError::Invalid {
                field: "max_instances",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_materials == 0 {
            return Err(ConfigError::Invalid {
                field: "max_materials",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_point_lights > MAX_POINT_LIGHTS {
            return Err(ConfigError::Invalid {
                field: "max_point_lights",
                reason: format!("{} exceeds the light array size {}", self.max_point_lights, MAX_POINT_LIGHTS),
            });
        }
        if self.max_active_lights > MAX_ACTIVE_LIGHTS {
            return Err(ConfigError::Invalid {
                field: "max_active_lights",
                reason: format!("{} exceeds the light array size {}", self.max_active_lights, MAX_ACTIVE_LIGHTS),
            });
        }
        Ok(())
    }
}

impl Default for SceneLimits {
    fn default() -> Self {
        Self {
            max_geometries: 1024,
            max_instances: 4096,
            max_materials: 512,
            max_textures: 256,
            max_point_lights: MAX_POINT_LIGHTS,
            max_active_lights: MAX_ACTIVE_LIGHTS,
        }
    }
}

/// # Render Features
///
/// Feature toggles consumed by the trace pass every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFeatures {
    /// Accumulate samples across frames while the scene is static
    pub accumulate_frames: bool,
    /// Maximum number of bounces per path
    pub max_path_depth: u32,
    /// Samples traced per pixel per frame
    pub samples_per_pixel: u32,
    /// One-shot request to rebuild pipelines and the output surface
    #[serde(default)]
    pub refresh_requested: bool,
}

impl RenderFeatures {
    /// Whether switching from `self` to `other` needs a pipeline refresh
    ///
    /// Path depth is baked into the trace pipeline's recursion limit.
    pub fn requires_refresh(&self, other: &RenderFeatures) -> bool {
        self.max_path_depth != other.max_path_depth || other.refresh_requested
    }
}

impl Default for RenderFeatures {
    fn default() -> Self {
        Self {
            accumulate_frames: true,
            max_path_depth: 4,
            samples_per_pixel: 1,
            refresh_requested: false,
        }
    }
}

/// Size of the trace output image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputExtent {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl OutputExtent {
    /// Create a new extent
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Aspect ratio (width / height)
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl Default for OutputExtent {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// # Renderer Configuration
///
/// Top-level configuration for the ray tracing core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Maximum frames in flight (size of the completion-signal ring)
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers
    pub enable_validation: Option<bool>,
    /// Compact per-object indices after building them
    pub compact_per_object_indices: bool,
    /// Size of the trace output image
    pub output_extent: OutputExtent,
    /// Scene capacity limits
    pub limits: SceneLimits,
    /// Trace feature toggles
    pub features: RenderFeatures,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            max_frames_in_flight: 2,
            enable_validation: None, // Auto-detect based on build type
            compact_per_object_indices: true,
            output_extent: OutputExtent::default(),
            limits: SceneLimits::default(),
            features: RenderFeatures::default(),
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Enable or disable per-object index compaction
    pub fn with_compaction(mut self, enabled: bool) -> Self {
        self.compact_per_object_indices = enabled;
        self
    }

    /// Set the output extent
    pub fn with_output_extent(mut self, width: u32, height: u32) -> Self {
        self.output_extent = OutputExtent::new(width, height);
        self
    }

    /// Set scene limits
    pub fn with_limits(mut self, limits: SceneLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set render features
    pub fn with_features(mut self, features: RenderFeatures) -> Self {
        self.features = features;
        self
    }

    /// Whether validation layers should be enabled
    ///
    /// Falls back to debug-build detection when not set explicitly.
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "application_name",
                reason: "cannot be empty".to_string(),
            });
        }
        if self.max_frames_in_flight == 0 || self.max_frames_in_flight > 4 {
            return Err(ConfigError::Invalid {
                field: "max_frames_in_flight",
                reason: format!("{} is outside 1..=4", self.max_frames_in_flight),
            });
        }
        if self.output_extent.width == 0 || self.output_extent.height == 0 {
            return Err(ConfigError::Invalid {
                field: "output_extent",
                reason: "width and height must be non-zero".to_string(),
            });
        }
        if self.features.max_path_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_path_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.features.samples_per_pixel == 0 {
            return Err(ConfigError::Invalid {
                field: "samples_per_pixel",
                reason: "must be at least 1".to_string(),
            });
        }
        self.limits.validate()
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Ray Tracing Application")
    }
}

impl Config for RendererConfig {
    fn check(&self) -> Result<(), ConfigError> {
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.limits.max_point_lights, 32);
        assert_eq!(config.limits.max_active_lights, 8);
    }

    #[test]
    fn test_light_limits_cannot_exceed_array_size() {
        let mut limits = SceneLimits::default();
        limits.max_point_lights = MAX_POINT_LIGHTS + 1;
        let config = RendererConfig::default().with_limits(limits);

        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "max_point_lights"),
            other => panic!("Expected invalid point light limit, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let config = RendererConfig::default().with_max_frames_in_flight(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_path_depth_change_requires_refresh() {
        let current = RenderFeatures::default();
        let mut next = current;
        next.max_path_depth = 8;
        assert!(current.requires_refresh(&next));

        let mut sample_change = current;
        sample_change.samples_per_pixel = 4;
        assert!(!current.requires_refresh(&sample_change));
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let path = std::env::temp_dir().join("raytrace_engine_config_test.toml");

        let config = RendererConfig::new("Config Test")
            .with_output_extent(640, 480)
            .with_compaction(false);
        config.save_to_file(&path).expect("save config");

        let loaded = RendererConfig::load_from_file(&path).expect("load config");
        assert_eq!(loaded.application_name, "Config Test");
        assert_eq!(loaded.output_extent, OutputExtent::new(640, 480));
        assert!(!loaded.compact_per_object_indices);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        match RendererConfig::load_from_file("renderer.yaml") {
            Err(ConfigError::UnsupportedFormat(_)) => {}
            other => panic!("Expected failure, got {:?}", other.map(|c| c.application_name)),
        }
    }
}
