//! # Rendering System
//!
//! Frame loop over the scene resource manager and a [`DeviceBackend`](crate::device::DeviceBackend).
//!
//! ## Architecture
//!
//! - **Renderer**: drives resolution, uniforms, submission and presentation each frame
//! - **Frame Synchronizer**: ring of completion signals gating resource reuse
//! - **Presentation**: where finished output images go, and whether they went stale
//! - **Vulkan Backend**: production device implementation

/// Graphics backend implementations
pub mod backends;

pub mod error;
pub mod frame_sync;
pub mod presentation;
pub mod renderer;
pub mod uniforms;

pub use backends::vulkan::{ClearRecorder, TraceFrame, TraceRecorder, VulkanBackend};
pub use error::{RenderError, RenderResult};
pub use frame_sync::{FrameContext, FrameSynchronizer};
pub use presentation::{OffscreenTarget, PresentOutcome, PresentationTarget};
pub use renderer::{FrameReport, Renderer};
pub use uniforms::FrameUniforms;
