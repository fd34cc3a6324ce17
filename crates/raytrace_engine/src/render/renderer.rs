//! # Renderer
//!
//! Drives the frame loop over a [`DeviceBackend`] and a
//! [`PresentationTarget`]. The renderer owns the scene, the frame ring and
//! the output image; callers mutate the scene through
//! [`scene_mut`](Renderer::scene_mut) and call
//! [`render_frame`](Renderer::render_frame) once per frame.
//!
//! ## Frame Sequence
//!
//! ```text
//! begin_frame (wait slot) → refresh? → prepare_frame(camera)
//!   → [wait previous frame → resolve scene] → write uniforms
//!   → submit → present → advance
//! ```

use crate::core::{RenderFeatures, RendererConfig};
use crate::device::{DeviceBackend, ImageHandle};
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame_sync::FrameSynchronizer;
use crate::render::presentation::{PresentOutcome, PresentationTarget};
use crate::render::uniforms::FrameUniforms;
use crate::scene::{Camera, ResolveReport, SceneResourceManager};

/// What one call to [`Renderer::render_frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number
    pub frame_number: u64,
    /// Ring slot used
    pub slot: usize,
    /// Scene resolution performed before submission
    pub resolve: ResolveReport,
    /// Accumulated frames the trace blended with, 0 after any change
    pub accumulated_frames: u32,
    /// Whether the output surface was recreated first
    pub refreshed: bool,
    /// Presentation outcome
    pub presented: PresentOutcome,
}

/// Frame loop driver
pub struct Renderer<B: DeviceBackend, P: PresentationTarget> {
    backend: B,
    target: P,
    scene: SceneResourceManager,
    sync: FrameSynchronizer,
    features: RenderFeatures,
    output: ImageHandle,
    extent: (u32, u32),
    accumulated_frames: u32,
    observed_revision: u64,
    last_camera: Option<Camera>,
    shut_down: bool,
}

impl<B: DeviceBackend, P: PresentationTarget> Renderer<B, P> {
    /// Create a renderer
    ///
    /// The output image takes the target's extent, or the configured extent
    /// when the target reports none.
    pub fn new(config: &RendererConfig, mut backend: B, target: P) -> RenderResult<Self> {
        config.validate()?;
        log::info!(
            "Creating renderer '{}' on {} backend with {} frames in flight",
            config.application_name,
            backend.name(),
            config.max_frames_in_flight
        );

        let mut sync = FrameSynchronizer::new(&mut backend, config.max_frames_in_flight, FrameUniforms::SIZE)?;

        let extent = match target.extent() {
            (0, _) | (_, 0) => (config.output_extent.width, config.output_extent.height),
            extent => extent,
        };
        let output = match backend.create_output_image(extent.0, extent.1) {
            Ok(output) => output,
            Err(e) => {
                sync.destroy(&mut backend);
                return Err(e.into());
            }
        };

        Ok(Self {
            backend,
            target,
            scene: SceneResourceManager::new(config),
            sync,
            features: RenderFeatures {
                refresh_requested: false,
                ..config.features
            },
            output,
            extent,
            accumulated_frames: 0,
            observed_revision: 0,
            last_camera: None,
            shut_down: false,
        })
    }

    /// Render one frame from `camera`
    pub fn render_frame(&mut self, camera: &Camera) -> RenderResult<FrameReport> {
        if self.shut_down {
            return Err(RenderError::ShutDown);
        }

        let frame = self.sync.begin_frame(&mut self.backend)?;

        let refreshed = self.sync.take_needs_refresh();
        if refreshed {
            self.refresh_surface()?;
        }

        let camera_moved = self.last_camera.map_or(true, |last| camera.moved_from(&last));
        self.scene.prepare_frame(camera);

        let mut resolve = ResolveReport::default();
        if self.scene.needs_device_sync() {
            self.sync.wait_previous_frame(&mut self.backend)?;
            resolve = self.scene.resolve(&mut self.backend).map_err(|e| {
                log::error!("Scene resolution for frame {} failed: {}", frame.frame_number, e);
                e
            })?;
        }

        if camera_moved || refreshed || resolve.changed_scene() || self.scene.revision() != self.observed_revision {
            self.accumulated_frames = 0;
        }
        self.observed_revision = self.scene.revision();

        let aspect = self.extent.0 as f32 / self.extent.1.max(1) as f32;
        let uniforms = FrameUniforms::new(
            camera,
            aspect,
            self.scene.lights().to_gpu(),
            self.scene.environment(),
            &self.features,
            frame.frame_number,
            self.accumulated_frames,
        );
        self.backend.write_buffer(frame.uniforms, 0, uniforms.as_bytes())?;

        self.sync.submit(&mut self.backend, self.output, self.extent, self.scene.bindings())?;
        let presented = self.target.present(self.output, self.extent, frame.frame_number)?;
        self.sync.handle_present(presented);
        self.sync.advance();

        let report = FrameReport {
            frame_number: frame.frame_number,
            slot: frame.slot,
            resolve,
            accumulated_frames: self.accumulated_frames,
            refreshed,
            presented,
        };
        self.accumulated_frames = self.accumulated_frames.saturating_add(1);
        self.last_camera = Some(*camera);
        Ok(report)
    }

    /// Recreate the output image at the target's current extent
    fn refresh_surface(&mut self) -> RenderResult<()> {
        self.sync.wait_all(&mut self.backend)?;

        let extent = self.target.extent();
        let output = self.backend.create_output_image(extent.0, extent.1)?;
        self.backend.destroy_output_image(self.output);
        self.output = output;
        self.extent = extent;
        self.target.surface_recreated(output, extent);
        self.accumulated_frames = 0;
        log::info!("Output surface recreated at {}x{}", extent.0, extent.1);
        Ok(())
    }

    /// Replace the render features
    ///
    /// A path-depth change or an explicit refresh request recreates the
    /// surface on the next frame; any change restarts accumulation.
    pub fn set_features(&mut self, features: RenderFeatures) {
        if self.features.requires_refresh(&features) {
            self.sync.mark_needs_refresh("render features changed");
        }
        let features = RenderFeatures {
            refresh_requested: false,
            ..features
        };
        if features != self.features {
            self.accumulated_frames = 0;
        }
        self.features = features;
    }

    /// Request a surface refresh on the next frame
    pub fn request_refresh(&mut self) {
        self.sync.mark_needs_refresh("requested by caller");
    }

    /// Wait for the device, then free every resource
    pub fn shutdown(&mut self) -> RenderResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.sync.wait_all(&mut self.backend)?;
        self.scene.shutdown(&mut self.backend);
        self.backend.destroy_output_image(self.output);
        self.sync.destroy(&mut self.backend);
        self.shut_down = true;
        log::info!("Renderer shut down");
        Ok(())
    }

    /// Scene (read-only)
    pub fn scene(&self) -> &SceneResourceManager {
        &self.scene
    }

    /// Scene API
    pub fn scene_mut(&mut self) -> &mut SceneResourceManager {
        &mut self.scene
    }

    /// Device backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Device backend (mutable)
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Presentation target
    pub fn target(&self) -> &P {
        &self.target
    }

    /// Presentation target (mutable)
    pub fn target_mut(&mut self) -> &mut P {
        &mut self.target
    }

    /// Active render features
    pub fn features(&self) -> &RenderFeatures {
        &self.features
    }

    /// Current output image
    pub fn output(&self) -> ImageHandle {
        self.output
    }

    /// Current output extent
    pub fn output_extent(&self) -> (u32, u32) {
        self.extent
    }

    /// Frame synchronizer
    pub fn frame_sync(&self) -> &FrameSynchronizer {
        &self.sync
    }
}

impl<B: DeviceBackend, P: PresentationTarget> Drop for Renderer<B, P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Renderer shutdown during drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::SceneBuildMode;
    use crate::device::{DeviceOp, HeadlessBackend, StructureLevel};
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::presentation::OffscreenTarget;
    use crate::scene::{GeometryFlags, Material, MeshData, PointLight};

    fn renderer() -> Renderer<HeadlessBackend, OffscreenTarget> {
        let config = RendererConfig::default().with_output_extent(32, 16);
        Renderer::new(&config, HeadlessBackend::new(), OffscreenTarget::new(32, 16)).unwrap()
    }

    fn camera() -> Camera {
        Camera::look_at(Vec3::new(0.0, 2.0, 8.0), Vec3::zeros(), 60.0)
    }

    #[test]
    fn test_empty_scene_renders() {
        let mut renderer = renderer();
        let report = renderer.render_frame(&camera()).unwrap();

        assert_eq!(report.frame_number, 0);
        assert_eq!(report.resolve.scene_mode, Some(SceneBuildMode::FullBuild));
        assert_eq!(report.presented, PresentOutcome::Presented);
        assert!(renderer.scene().bindings().is_traceable());
    }

    #[test]
    fn test_scene_edits_between_frames_never_touch_in_flight_resources() {
        let mut renderer = renderer();
        let camera = camera();
        renderer.render_frame(&camera).unwrap();

        let scene = renderer.scene_mut();
        let cube = scene.submit_geometry(MeshData::cube(Material::diffuse(0.8, 0.2, 0.2)), GeometryFlags::OPAQUE).unwrap();
        let floor = scene.submit_geometry(MeshData::plane(10.0, Material::default()), GeometryFlags::OPAQUE).unwrap();
        let spinning = scene.submit_instance(cube, Mat4::identity()).unwrap();
        scene.submit_instance(floor, Mat4::identity()).unwrap();
        renderer.render_frame(&camera).unwrap();

        for step in 0..4 {
            let transform = Mat4::new_rotation(Vec3::new(0.0, 0.3 * step as f32, 0.0));
            renderer.scene_mut().set_instance_transform(spinning, transform).unwrap();
            let report = renderer.render_frame(&camera).unwrap();
            assert_eq!(report.resolve.scene_mode, Some(SceneBuildMode::Refit));
        }

        renderer.scene_mut().remove_geometry(cube).unwrap();
        renderer.render_frame(&camera).unwrap();
        renderer.scene_mut().remove_geometry(floor).unwrap();
        renderer.render_frame(&camera).unwrap();
        renderer.render_frame(&camera).unwrap();

        assert!(renderer.backend().hazards().is_empty(), "{:?}", renderer.backend().hazards());
        assert!(renderer.backend().frames_in_flight() <= 2);
    }

    #[test]
    fn test_static_scene_accumulates() {
        let mut renderer = renderer();
        let camera = camera();
        let counts: Vec<_> = (0..4)
            .map(|_| renderer.render_frame(&camera).unwrap().accumulated_frames)
            .collect();
        assert_eq!(counts, vec![0, 1, 2, 3]);

        let moved = Camera::look_at(Vec3::new(1.0, 2.0, 8.0), Vec3::zeros(), 60.0);
        assert_eq!(renderer.render_frame(&moved).unwrap().accumulated_frames, 0);

        renderer
            .scene_mut()
            .add_point_light(PointLight {
                position: Vec3::new(0.0, 4.0, 0.0),
                color: Vec3::new(1.0, 1.0, 1.0),
                intensity: 2.0,
                radius: 0.1,
            })
            .unwrap();
        renderer.render_frame(&moved).unwrap();
        assert_eq!(renderer.render_frame(&moved).unwrap().accumulated_frames, 1);
    }

    #[test]
    fn test_static_scene_skips_resolution() {
        let mut renderer = renderer();
        let camera = camera();
        renderer.render_frame(&camera).unwrap();

        let report = renderer.render_frame(&camera).unwrap();
        assert!(!report.resolve.changed_scene());
        assert_eq!(
            renderer.backend().count_ops(|op| matches!(op, DeviceOp::WaitSignal { .. })),
            0
        );
    }

    #[test]
    fn test_stale_surface_is_refreshed_next_frame() {
        let mut renderer = renderer();
        let camera = camera();
        renderer.render_frame(&camera).unwrap();

        renderer.target_mut().resize(64, 32);
        let stale = renderer.render_frame(&camera).unwrap();
        assert_eq!(stale.presented, PresentOutcome::Stale);

        let refreshed = renderer.render_frame(&camera).unwrap();
        assert!(refreshed.refreshed);
        assert_eq!(refreshed.presented, PresentOutcome::Presented);
        assert_eq!(refreshed.accumulated_frames, 0);
        assert_eq!(renderer.output_extent(), (64, 32));
        assert_eq!(renderer.target().recreations(), 1);
        assert!(renderer.backend().hazards().is_empty());
    }

    #[test]
    fn test_path_depth_change_requests_refresh() {
        let mut renderer = renderer();
        let camera = camera();
        renderer.render_frame(&camera).unwrap();

        let mut features = *renderer.features();
        features.samples_per_pixel = 4;
        renderer.set_features(features);
        assert!(!renderer.render_frame(&camera).unwrap().refreshed);

        features.max_path_depth = 8;
        renderer.set_features(features);
        assert!(renderer.render_frame(&camera).unwrap().refreshed);
    }

    #[test]
    fn test_device_failure_aborts_frame() {
        let mut renderer = renderer();
        renderer.backend_mut().fail_next("build_structures");

        match renderer.render_frame(&camera()) {
            Err(RenderError::Device(_)) => {}
            other => panic!("Expected device error, got {:?}", other.map(|r| r.frame_number)),
        }
    }

    #[test]
    fn test_shutdown_releases_all_device_resources() {
        let mut renderer = renderer();
        let camera = camera();
        let scene = renderer.scene_mut();
        let cube = scene.submit_geometry(MeshData::cube(Material::default()), GeometryFlags::OPAQUE).unwrap();
        scene.submit_instance(cube, Mat4::identity()).unwrap();
        renderer.render_frame(&camera).unwrap();
        renderer.render_frame(&camera).unwrap();

        renderer.shutdown().unwrap();

        let backend = renderer.backend();
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_structures(StructureLevel::PerObject), 0);
        assert_eq!(backend.live_structures(StructureLevel::Scene), 0);
        assert!(backend.hazards().is_empty());
        assert!(matches!(renderer.render_frame(&camera), Err(RenderError::ShutDown)));
    }
}
